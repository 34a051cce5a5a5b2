use super::{EdgeContainer, GraphStatistics, ReadableGraphStorage};
use crate::annostorage::inmemory::AnnoStorage;
use crate::annostorage::AnnotationStorage;
use crate::errors::{GraphAnnisCoreError, Result};
use crate::types::{Annotation, Edge, NodeID};
use malloc_size_of_derive::MallocSizeOf;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The integer type used to store a node's position on its chain. Picking
/// the smallest `P` that fits `max_depth` is what the registry optimises for
/// (§4.3.4 rule 3).
pub trait LinearPos:
    Copy
    + Ord
    + std::fmt::Debug
    + Default
    + Serialize
    + for<'de> Deserialize<'de>
    + malloc_size_of::MallocSizeOf
    + Send
    + Sync
    + 'static
{
    const MAX_VALUE: usize;
    fn from_usize(v: usize) -> Self;
    fn to_usize(self) -> usize;
}

macro_rules! impl_linear_pos {
    ($t:ty) => {
        impl LinearPos for $t {
            const MAX_VALUE: usize = <$t>::MAX as usize;
            fn from_usize(v: usize) -> Self {
                v as $t
            }
            fn to_usize(self) -> usize {
                self as usize
            }
        }
    };
}

impl_linear_pos!(u8);
impl_linear_pos!(u16);
impl_linear_pos!(u32);

/// A node's position on its chain: which root it belongs to, and how far
/// along the chain it sits.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, MallocSizeOf)]
pub struct RelativePosition<P: LinearPos> {
    pub root: NodeID,
    pub pos: P,
}

/// Optimised storage for chain-shaped components (every node has at most one
/// outgoing edge): part-of-speech-tagged token sequences, `ORDERING`, simple
/// `DOMINANCE` paths, etc (§4.3.2). Only constructed when the source
/// component is `rooted_tree && max_fan_out <= 1`.
#[derive(Serialize, Deserialize, Clone, Default, MallocSizeOf)]
pub struct LinearStorage<P: LinearPos> {
    node_to_pos: BTreeMap<NodeID, RelativePosition<P>>,
    chains: BTreeMap<NodeID, Vec<NodeID>>,
    edge_annos: AnnoStorage<Edge>,
    stats: Option<GraphStatistics>,
}

impl<P: LinearPos> LinearStorage<P> {
    pub fn new() -> LinearStorage<P> {
        LinearStorage::default()
    }

    /// Build from any source storage, failing if the source is not a single
    /// chain per root or its depth does not fit in `P` (§8 invariant 4).
    pub fn try_from_source(source: &dyn ReadableGraphStorage) -> Result<LinearStorage<P>> {
        let stats = source
            .stats()
            .cloned()
            .ok_or(GraphAnnisCoreError::InvalidLinearStorage)?;
        if !stats.rooted_tree || stats.max_fan_out > 1 || stats.max_depth > P::MAX_VALUE {
            return Err(GraphAnnisCoreError::InvalidLinearStorage);
        }

        let mut result = LinearStorage::new();
        result.edge_annos = AnnoStorage::new();

        let has_incoming: std::collections::HashSet<NodeID> = source
            .source_nodes()
            .flat_map(|n| source.get_outgoing_edges(n).collect::<Vec<_>>())
            .collect();
        let roots: Vec<NodeID> = source
            .source_nodes()
            .filter(|n| !has_incoming.contains(n))
            .collect();

        for root in roots {
            let mut chain = vec![root];
            let mut pos: usize = 0;
            result.node_to_pos.insert(
                root,
                RelativePosition {
                    root,
                    pos: P::from_usize(pos),
                },
            );
            let mut current = root;
            loop {
                let mut next_iter = source.get_outgoing_edges(current);
                let next = match next_iter.next() {
                    Some(n) => n,
                    None => break,
                };
                let edge = Edge {
                    source: current,
                    target: next,
                };
                for anno in source.get_edge_annotations(&edge) {
                    result.edge_annos.insert(edge, anno);
                }
                pos += 1;
                chain.push(next);
                result.node_to_pos.insert(
                    next,
                    RelativePosition {
                        root,
                        pos: P::from_usize(pos),
                    },
                );
                current = next;
            }
            result.chains.insert(root, chain);
        }

        result.stats = Some(stats);
        Ok(result)
    }
}

impl<P: LinearPos> EdgeContainer for LinearStorage<P> {
    fn get_outgoing_edges<'a>(&'a self, node: NodeID) -> Box<dyn Iterator<Item = NodeID> + 'a> {
        if let Some(rel) = self.node_to_pos.get(&node) {
            if let Some(chain) = self.chains.get(&rel.root) {
                let next_pos = rel.pos.to_usize() + 1;
                if next_pos < chain.len() {
                    return Box::new(std::iter::once(chain[next_pos]));
                }
            }
        }
        Box::new(std::iter::empty())
    }

    fn source_nodes<'a>(&'a self) -> Box<dyn Iterator<Item = NodeID> + 'a> {
        Box::new(self.node_to_pos.iter().filter_map(move |(node, rel)| {
            let chain = self.chains.get(&rel.root)?;
            if rel.pos.to_usize() + 1 < chain.len() {
                Some(*node)
            } else {
                None
            }
        }))
    }
}

impl<P: LinearPos> ReadableGraphStorage for LinearStorage<P> {
    fn is_connected(&self, edge: &Edge, min_distance: usize, max_distance: usize) -> bool {
        self.distance(edge)
            .map(|d| d >= min_distance && d <= max_distance)
            .unwrap_or(false)
    }

    fn find_connected<'a>(
        &'a self,
        source: NodeID,
        min_distance: usize,
        max_distance: usize,
    ) -> Box<dyn Iterator<Item = NodeID> + 'a> {
        let rel = match self.node_to_pos.get(&source) {
            Some(r) => *r,
            None => return Box::new(std::iter::empty()),
        };
        let chain = match self.chains.get(&rel.root) {
            Some(c) => c,
            None => return Box::new(std::iter::empty()),
        };
        let start = rel.pos.to_usize().saturating_add(min_distance.max(1));
        let end = if max_distance == usize::MAX {
            chain.len()
        } else {
            (rel.pos.to_usize() + max_distance + 1).min(chain.len())
        };
        if start >= end || start >= chain.len() {
            return Box::new(std::iter::empty());
        }
        Box::new(chain[start..end].iter().copied())
    }

    fn distance(&self, edge: &Edge) -> Option<usize> {
        if edge.source == edge.target {
            return Some(0);
        }
        let source_rel = self.node_to_pos.get(&edge.source)?;
        let target_rel = self.node_to_pos.get(&edge.target)?;
        if source_rel.root != target_rel.root {
            return None;
        }
        let (sp, tp) = (source_rel.pos.to_usize(), target_rel.pos.to_usize());
        if tp >= sp {
            Some(tp - sp)
        } else {
            None
        }
    }

    fn get_edge_annotations(&self, edge: &Edge) -> Vec<Annotation> {
        self.edge_annos.get_annotations_for_item(edge)
    }

    fn edge_annos(&self) -> &AnnoStorage<Edge> {
        &self.edge_annos
    }

    fn num_edges(&self) -> usize {
        self.node_to_pos.len().saturating_sub(self.chains.len())
    }

    fn stats(&self) -> Option<&GraphStatistics> {
        self.stats.as_ref()
    }

    fn estimate_memory_size(&self) -> usize {
        self.node_to_pos.len() * std::mem::size_of::<(NodeID, RelativePosition<P>)>()
            + self.edge_annos.len() * std::mem::size_of::<Annotation>()
    }

    fn save_to(&self, writer: &mut dyn std::io::Write) -> Result<()> {
        bincode::serialize_into(writer, self)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::adjacencylist::AdjacencyListStorage;

    fn edge(s: NodeID, t: NodeID) -> Edge {
        Edge {
            source: s,
            target: t,
        }
    }

    fn chain_source() -> AdjacencyListStorage {
        let mut gs = AdjacencyListStorage::new();
        gs.add_edge(edge(1, 2));
        gs.add_edge(edge(2, 3));
        gs.add_edge(edge(3, 4));
        gs.calculate_statistics();
        gs
    }

    #[test]
    fn builds_from_chain_shaped_source() {
        let source = chain_source();
        let linear = LinearStorage::<u8>::try_from_source(&source).unwrap();
        assert_eq!(linear.distance(&edge(1, 4)), Some(3));
        assert_eq!(linear.distance(&edge(4, 1)), None);
        let reachable: Vec<_> = linear.find_connected(1, 1, 2).collect();
        assert_eq!(reachable, vec![2, 3]);
    }

    #[test]
    fn rejects_non_chain_source() {
        let mut gs = AdjacencyListStorage::new();
        gs.add_edge(edge(1, 2));
        gs.add_edge(edge(1, 3));
        gs.calculate_statistics();
        assert!(LinearStorage::<u8>::try_from_source(&gs).is_err());
    }
}
