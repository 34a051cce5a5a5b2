use super::adjacencylist::AdjacencyListStorage;
use super::linear::LinearStorage;
use super::prepost::PrePostOrderStorage;
use super::{EdgeContainer, GraphStatistics, ReadableGraphStorage};
use crate::annostorage::inmemory::AnnoStorage;
use crate::errors::Result;
use crate::types::{Annotation, Component, ComponentType, Edge, NodeID};
use rustc_hash::FxHashMap;

/// The names used by [`GraphStorageRegistry::name_for`]/`create_by_name` and
/// persisted as the `implementation` marker file next to a saved component
/// (§6 "persisted state layout").
pub const IMPL_ADJACENCYLIST: &str = "fallback";
pub const IMPL_LINEAR_P8: &str = "linearP8";
pub const IMPL_LINEAR_P16: &str = "linearP16";
pub const IMPL_LINEAR_P32: &str = "linear";
pub const IMPL_PREPOST_O16_L8: &str = "prepostorderO16L8";
pub const IMPL_PREPOST_O16_L32: &str = "prepostorderO16L32";
pub const IMPL_PREPOST_O32_L8: &str = "prepostorderO32L8";
pub const IMPL_PREPOST_O32_L32: &str = "prepostorder";

/// Tagged union over the concrete storage implementations. Modelled as an
/// enum (not a trait object) so the hot-path `next`/`is_connected` calls stay
/// inlinable, per the design notes on polymorphism over storages (spec.md §9).
pub enum GraphStorage {
    AdjacencyList(AdjacencyListStorage),
    LinearP8(LinearStorage<u8>),
    LinearP16(LinearStorage<u16>),
    LinearP32(LinearStorage<u32>),
    PrePostO16L8(PrePostOrderStorage<u16, i8>),
    PrePostO16L32(PrePostOrderStorage<u16, i32>),
    PrePostO32L8(PrePostOrderStorage<u32, i8>),
    PrePostO32L32(PrePostOrderStorage<u32, i32>),
}

macro_rules! dispatch {
    ($self:expr, $inner:ident => $body:expr) => {
        match $self {
            GraphStorage::AdjacencyList($inner) => $body,
            GraphStorage::LinearP8($inner) => $body,
            GraphStorage::LinearP16($inner) => $body,
            GraphStorage::LinearP32($inner) => $body,
            GraphStorage::PrePostO16L8($inner) => $body,
            GraphStorage::PrePostO16L32($inner) => $body,
            GraphStorage::PrePostO32L8($inner) => $body,
            GraphStorage::PrePostO32L32($inner) => $body,
        }
    };
}

impl GraphStorage {
    pub fn implementation_name(&self) -> &'static str {
        match self {
            GraphStorage::AdjacencyList(_) => IMPL_ADJACENCYLIST,
            GraphStorage::LinearP8(_) => IMPL_LINEAR_P8,
            GraphStorage::LinearP16(_) => IMPL_LINEAR_P16,
            GraphStorage::LinearP32(_) => IMPL_LINEAR_P32,
            GraphStorage::PrePostO16L8(_) => IMPL_PREPOST_O16_L8,
            GraphStorage::PrePostO16L32(_) => IMPL_PREPOST_O16_L32,
            GraphStorage::PrePostO32L8(_) => IMPL_PREPOST_O32_L8,
            GraphStorage::PrePostO32L32(_) => IMPL_PREPOST_O32_L32,
        }
    }
}

impl EdgeContainer for GraphStorage {
    fn get_outgoing_edges<'a>(&'a self, node: NodeID) -> Box<dyn Iterator<Item = NodeID> + 'a> {
        dispatch!(self, s => s.get_outgoing_edges(node))
    }

    fn source_nodes<'a>(&'a self) -> Box<dyn Iterator<Item = NodeID> + 'a> {
        dispatch!(self, s => s.source_nodes())
    }
}

impl ReadableGraphStorage for GraphStorage {
    fn is_connected(&self, edge: &Edge, min_distance: usize, max_distance: usize) -> bool {
        dispatch!(self, s => s.is_connected(edge, min_distance, max_distance))
    }

    fn find_connected<'a>(
        &'a self,
        source: NodeID,
        min_distance: usize,
        max_distance: usize,
    ) -> Box<dyn Iterator<Item = NodeID> + 'a> {
        dispatch!(self, s => s.find_connected(source, min_distance, max_distance))
    }

    fn distance(&self, edge: &Edge) -> Option<usize> {
        dispatch!(self, s => s.distance(edge))
    }

    fn get_edge_annotations(&self, edge: &Edge) -> Vec<Annotation> {
        dispatch!(self, s => s.get_edge_annotations(edge))
    }

    fn edge_annos(&self) -> &AnnoStorage<Edge> {
        dispatch!(self, s => s.edge_annos())
    }

    fn num_edges(&self) -> usize {
        dispatch!(self, s => s.num_edges())
    }

    fn stats(&self) -> Option<&GraphStatistics> {
        dispatch!(self, s => s.stats())
    }

    fn estimate_memory_size(&self) -> usize {
        dispatch!(self, s => s.estimate_memory_size())
    }

    fn save_to(&self, writer: &mut dyn std::io::Write) -> Result<()> {
        dispatch!(self, s => s.save_to(writer))
    }
}

/// Picks and builds the optimised storage implementation for a freshly built
/// component, honouring any per-component override the caller registered,
/// falling back to the statistics-driven heuristics of §4.3.4.
#[derive(Default)]
pub struct GraphStorageRegistry {
    component_to_impl: FxHashMap<Component, &'static str>,
}

impl GraphStorageRegistry {
    pub fn new() -> GraphStorageRegistry {
        GraphStorageRegistry::default()
    }

    /// Force every component matching `ctype` (optionally narrowed by
    /// `layer`/`name`) to use a specific implementation, bypassing the
    /// heuristics (§4.3.4 rule 1). Matching is most-specific-wins at lookup
    /// time, mirroring the source's three-tier fallback.
    pub fn set_implementation(
        &mut self,
        impl_name: &'static str,
        ctype: ComponentType,
        layer: impl Into<String>,
        name: impl Into<String>,
    ) {
        self.component_to_impl.insert(
            Component::new(ctype, layer, name),
            impl_name,
        );
    }

    fn impl_by_registry(&self, component: &Component) -> Option<&'static str> {
        if let Some(i) = self.component_to_impl.get(component) {
            return Some(i);
        }
        let without_name = Component::new(component.ctype.clone(), component.layer.clone(), "");
        if let Some(i) = self.component_to_impl.get(&without_name) {
            return Some(i);
        }
        let only_type = Component::new(component.ctype.clone(), "", "");
        self.component_to_impl.get(&only_type).copied()
    }

    fn impl_by_heuristics(stats: &GraphStatistics) -> &'static str {
        if !stats.valid {
            return IMPL_ADJACENCYLIST;
        }
        if stats.max_depth <= 1 {
            return IMPL_ADJACENCYLIST;
        }
        if stats.rooted_tree {
            if stats.max_fan_out <= 1 {
                return smallest_linear_impl(stats.max_depth);
            }
            return smallest_prepost_impl(stats.nodes, stats.max_depth);
        }
        if !stats.cyclic && stats.dfs_visit_ratio <= 1.03 {
            return smallest_prepost_impl(stats.nodes, stats.max_depth);
        }
        IMPL_ADJACENCYLIST
    }

    /// The implementation name that should be used for `component`, given its
    /// source-graph statistics (§4.3.4).
    pub fn optimized_impl(&self, component: &Component, stats: &GraphStatistics) -> &'static str {
        let impl_name = self
            .impl_by_registry(component)
            .unwrap_or_else(|| Self::impl_by_heuristics(stats));
        log::debug!("component {} will use storage implementation {}", component, impl_name);
        impl_name
    }

    /// Build the named implementation from `source`. Falls back to the
    /// adjacency list (never fails) if the chosen implementation's
    /// preconditions are not actually met by `source` (a defensive guard
    /// against a forced override that doesn't fit the data).
    pub fn create_from(&self, impl_name: &str, source: &dyn ReadableGraphStorage) -> GraphStorage {
        let built = match impl_name {
            IMPL_LINEAR_P8 => LinearStorage::<u8>::try_from_source(source).map(GraphStorage::LinearP8),
            IMPL_LINEAR_P16 => LinearStorage::<u16>::try_from_source(source).map(GraphStorage::LinearP16),
            IMPL_LINEAR_P32 => LinearStorage::<u32>::try_from_source(source).map(GraphStorage::LinearP32),
            IMPL_PREPOST_O16_L8 => {
                PrePostOrderStorage::<u16, i8>::try_from_source(source).map(GraphStorage::PrePostO16L8)
            }
            IMPL_PREPOST_O16_L32 => {
                PrePostOrderStorage::<u16, i32>::try_from_source(source).map(GraphStorage::PrePostO16L32)
            }
            IMPL_PREPOST_O32_L8 => {
                PrePostOrderStorage::<u32, i8>::try_from_source(source).map(GraphStorage::PrePostO32L8)
            }
            IMPL_PREPOST_O32_L32 => {
                PrePostOrderStorage::<u32, i32>::try_from_source(source).map(GraphStorage::PrePostO32L32)
            }
            _ => return GraphStorage::AdjacencyList(AdjacencyListStorage::copy_from(source)),
        };
        built.unwrap_or_else(|_| GraphStorage::AdjacencyList(AdjacencyListStorage::copy_from(source)))
    }

    /// Convenience wrapper: pick the implementation by statistics/override
    /// and build it in one step.
    pub fn create_optimized(
        &self,
        component: &Component,
        source: &dyn ReadableGraphStorage,
    ) -> GraphStorage {
        let stats = source.stats().cloned().unwrap_or_default();
        let impl_name = self.optimized_impl(component, &stats);
        self.create_from(impl_name, source)
    }
}

/// Deserialise a [`GraphStorage`] previously written by [`ReadableGraphStorage::save_to`],
/// dispatching on the `implementation` marker name that is persisted
/// alongside it (§6 "persisted state layout").
pub fn load_by_name(impl_name: &str, reader: &mut dyn std::io::Read) -> Result<GraphStorage> {
    Ok(match impl_name {
        IMPL_LINEAR_P8 => GraphStorage::LinearP8(bincode::deserialize_from(reader)?),
        IMPL_LINEAR_P16 => GraphStorage::LinearP16(bincode::deserialize_from(reader)?),
        IMPL_LINEAR_P32 => GraphStorage::LinearP32(bincode::deserialize_from(reader)?),
        IMPL_PREPOST_O16_L8 => GraphStorage::PrePostO16L8(bincode::deserialize_from(reader)?),
        IMPL_PREPOST_O16_L32 => GraphStorage::PrePostO16L32(bincode::deserialize_from(reader)?),
        IMPL_PREPOST_O32_L8 => GraphStorage::PrePostO32L8(bincode::deserialize_from(reader)?),
        IMPL_PREPOST_O32_L32 => GraphStorage::PrePostO32L32(bincode::deserialize_from(reader)?),
        _ => GraphStorage::AdjacencyList(bincode::deserialize_from(reader)?),
    })
}

fn smallest_linear_impl(max_depth: usize) -> &'static str {
    if max_depth < u8::MAX as usize {
        IMPL_LINEAR_P8
    } else if max_depth < u16::MAX as usize {
        IMPL_LINEAR_P16
    } else {
        IMPL_LINEAR_P32
    }
}

fn smallest_prepost_impl(nodes: usize, max_depth: usize) -> &'static str {
    let order_fits_16 = nodes * 2 < u16::MAX as usize;
    let level_fits_8 = max_depth < i8::MAX as usize;
    match (order_fits_16, level_fits_8) {
        (true, true) => IMPL_PREPOST_O16_L8,
        (true, false) => IMPL_PREPOST_O16_L32,
        (false, true) => IMPL_PREPOST_O32_L8,
        (false, false) => IMPL_PREPOST_O32_L32,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::WriteableGraphStorage;

    fn edge(s: NodeID, t: NodeID) -> Edge {
        Edge {
            source: s,
            target: t,
        }
    }

    #[test]
    fn shallow_graph_picks_adjacency_list() {
        let mut gs = AdjacencyListStorage::new();
        gs.add_edge(edge(1, 2));
        gs.calculate_statistics();
        let registry = GraphStorageRegistry::new();
        let component = Component::new(ComponentType::Dominance, "", "");
        let chosen = registry.optimized_impl(&component, gs.stats().unwrap());
        assert_eq!(chosen, IMPL_ADJACENCYLIST);
    }

    #[test]
    fn chain_shaped_tree_picks_linear() {
        let mut gs = AdjacencyListStorage::new();
        gs.add_edge(edge(1, 2));
        gs.add_edge(edge(2, 3));
        gs.add_edge(edge(3, 4));
        gs.calculate_statistics();
        let registry = GraphStorageRegistry::new();
        let component = Component::new(ComponentType::Ordering, "", "");
        let chosen = registry.optimized_impl(&component, gs.stats().unwrap());
        assert_eq!(chosen, IMPL_LINEAR_P8);

        let built = registry.create_from(chosen, &gs);
        assert!(matches!(built, GraphStorage::LinearP8(_)));
        assert_eq!(built.distance(&edge(1, 4)), Some(3));
    }

    #[test]
    fn branching_tree_picks_prepost() {
        let mut gs = AdjacencyListStorage::new();
        gs.add_edge(edge(1, 2));
        gs.add_edge(edge(1, 3));
        gs.add_edge(edge(2, 4));
        gs.calculate_statistics();
        let registry = GraphStorageRegistry::new();
        let component = Component::new(ComponentType::Dominance, "", "");
        let chosen = registry.optimized_impl(&component, gs.stats().unwrap());
        assert_eq!(chosen, IMPL_PREPOST_O16_L8);
    }

    #[test]
    fn explicit_override_wins_over_heuristics() {
        let mut gs = AdjacencyListStorage::new();
        gs.add_edge(edge(1, 2));
        gs.add_edge(edge(2, 3));
        gs.calculate_statistics();

        let mut registry = GraphStorageRegistry::new();
        registry.set_implementation(IMPL_ADJACENCYLIST, ComponentType::Ordering, "", "");
        let component = Component::new(ComponentType::Ordering, "", "");
        let chosen = registry.optimized_impl(&component, gs.stats().unwrap());
        assert_eq!(chosen, IMPL_ADJACENCYLIST);
    }
}
