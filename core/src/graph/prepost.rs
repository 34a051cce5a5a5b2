use super::dfs::CycleSafeDfs;
use super::{EdgeContainer, GraphStatistics, ReadableGraphStorage};
use crate::annostorage::inmemory::AnnoStorage;
use crate::annostorage::AnnotationStorage;
use crate::errors::{GraphAnnisCoreError, Result};
use crate::types::{Annotation, Edge, NodeID};
use malloc_size_of_derive::MallocSizeOf;
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The integer type used for pre/post order numbers.
pub trait OrderPos:
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

macro_rules! impl_order_pos {
    ($t:ty) => {
        impl OrderPos for $t {
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
impl_order_pos!(u16);
impl_order_pos!(u32);

/// The integer type used for tree level (depth). Signed because the source's
/// `PrePost` struct stores a signed level; only its absolute difference is
/// ever used.
pub trait LevelPos:
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
    fn abs_diff(self, other: Self) -> usize;
}

macro_rules! impl_level_pos {
    ($t:ty) => {
        impl LevelPos for $t {
            const MAX_VALUE: usize = <$t>::MAX as usize;
            fn from_usize(v: usize) -> Self {
                v as $t
            }
            fn abs_diff(self, other: Self) -> usize {
                (self as i64 - other as i64).unsigned_abs() as usize
            }
        }
    };
}
impl_level_pos!(i8);
impl_level_pos!(i32);

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, MallocSizeOf)]
pub struct PrePost<O: OrderPos, L: LevelPos> {
    pub pre: O,
    pub post: O,
    pub level: L,
}

/// Optimised storage for tree-like components (§4.3.3): records, for every
/// node reachable from every root, a `(pre, post, level)` triple. A node may
/// carry several triples if reachable from more than one root (a DAG that is
/// still acyclic and "tree-like enough", per the registry's
/// `dfs_visit_ratio <= 1.03` rule).
#[derive(Serialize, Deserialize, Clone, Default, MallocSizeOf)]
pub struct PrePostOrderStorage<O: OrderPos, L: LevelPos> {
    node_to_order: BTreeMap<NodeID, Vec<PrePost<O, L>>>,
    order_to_node: BTreeMap<PrePost<O, L>, NodeID>,
    edge_annos: AnnoStorage<Edge>,
    stats: Option<GraphStatistics>,
}

impl<O: OrderPos, L: LevelPos> PrePostOrderStorage<O, L> {
    pub fn new() -> PrePostOrderStorage<O, L> {
        PrePostOrderStorage::default()
    }

    /// Build from any acyclic source storage. Fails if `nodes` or
    /// `max_depth` do not fit `O`/`L`, or if the source turns out to be
    /// cyclic after all (the registry should never select this path for a
    /// cyclic component, but building defensively avoids an infinite DFS).
    pub fn try_from_source(source: &dyn ReadableGraphStorage) -> Result<PrePostOrderStorage<O, L>> {
        let stats = source
            .stats()
            .cloned()
            .ok_or(GraphAnnisCoreError::UnsuitableSourceGraph)?;
        if stats.cyclic || stats.max_depth > L::MAX_VALUE || stats.nodes * 2 > O::MAX_VALUE {
            return Err(GraphAnnisCoreError::UnsuitableSourceGraph);
        }

        let mut result = PrePostOrderStorage::new();

        let has_incoming: FxHashSet<NodeID> = source
            .source_nodes()
            .flat_map(|n| source.get_outgoing_edges(n).collect::<Vec<_>>())
            .collect();
        let roots: Vec<NodeID> = source
            .source_nodes()
            .filter(|n| !has_incoming.contains(n))
            .collect();

        let mut current_order: usize = 0;
        for &root in &roots {
            // `(node, pre, level)` for every currently open path element.
            let mut stack: Vec<(NodeID, usize, usize)> = Vec::new();
            let mut dfs = CycleSafeDfs::new(source, root, 1, usize::MAX);
            let mut last_distance = 0usize;

            let enter = |node: NodeID,
                         level: usize,
                         order: &mut usize,
                         stack: &mut Vec<(NodeID, usize, usize)>| {
                stack.push((node, *order, level));
                *order += 1;
            };

            enter(root, 0, &mut current_order, &mut stack);

            for step in &mut dfs {
                if step.distance > last_distance {
                    enter(step.node, step.distance, &mut current_order, &mut stack);
                } else {
                    while stack.len() > step.distance {
                        let (node, pre, level) = stack.pop().unwrap();
                        let post = current_order;
                        current_order += 1;
                        let entry = PrePost {
                            pre: O::from_usize(pre),
                            post: O::from_usize(post),
                            level: L::from_usize(level),
                        };
                        result.node_to_order.entry(node).or_insert_with(Vec::new).push(entry);
                        result.order_to_node.insert(entry, node);
                    }
                    enter(step.node, step.distance, &mut current_order, &mut stack);
                }
                last_distance = step.distance;
            }
            while let Some((node, pre, level)) = stack.pop() {
                let post = current_order;
                current_order += 1;
                let entry = PrePost {
                    pre: O::from_usize(pre),
                    post: O::from_usize(post),
                    level: L::from_usize(level),
                };
                result.node_to_order.entry(node).or_insert_with(Vec::new).push(entry);
                result.order_to_node.insert(entry, node);
            }
        }

        for from in source.source_nodes().collect::<Vec<_>>() {
            for next in source.get_outgoing_edges(from).collect::<Vec<_>>() {
                let edge = Edge {
                    source: from,
                    target: next,
                };
                for anno in source.get_edge_annotations(&edge) {
                    result.edge_annos.insert(edge, anno);
                }
            }
        }

        result.stats = Some(stats);
        Ok(result)
    }
}

impl<O: OrderPos, L: LevelPos> EdgeContainer for PrePostOrderStorage<O, L> {
    fn get_outgoing_edges<'a>(&'a self, node: NodeID) -> Box<dyn Iterator<Item = NodeID> + 'a> {
        Box::new(self.find_connected(node, 1, 1))
    }

    fn source_nodes<'a>(&'a self) -> Box<dyn Iterator<Item = NodeID> + 'a> {
        Box::new(self.node_to_order.keys().copied())
    }
}

impl<O: OrderPos, L: LevelPos> ReadableGraphStorage for PrePostOrderStorage<O, L> {
    fn is_connected(&self, edge: &Edge, min_distance: usize, max_distance: usize) -> bool {
        let source_orders = match self.node_to_order.get(&edge.source) {
            Some(o) => o,
            None => return false,
        };
        let target_orders = match self.node_to_order.get(&edge.target) {
            Some(o) => o,
            None => return false,
        };
        for s in source_orders {
            for t in target_orders {
                if s.pre <= t.pre && t.post <= s.post {
                    let diff = s.level.abs_diff(t.level);
                    if diff >= min_distance && diff <= max_distance {
                        return true;
                    }
                }
            }
        }
        false
    }

    fn find_connected<'a>(
        &'a self,
        source: NodeID,
        min_distance: usize,
        max_distance: usize,
    ) -> Box<dyn Iterator<Item = NodeID> + 'a> {
        let source_orders = match self.node_to_order.get(&source) {
            Some(o) => o.clone(),
            None => return Box::new(std::iter::empty()),
        };
        let mut seen = FxHashSet::default();
        let mut result = Vec::new();
        for s in source_orders {
            let lo = PrePost {
                pre: s.pre,
                post: O::from_usize(0),
                level: L::from_usize(0),
            };
            let hi = PrePost {
                pre: s.post,
                post: O::from_usize(O::MAX_VALUE),
                level: L::from_usize(L::MAX_VALUE),
            };
            for (candidate, &node) in self.order_to_node.range(lo..=hi) {
                if candidate.post > s.post {
                    continue;
                }
                let diff = s.level.abs_diff(candidate.level);
                if diff >= min_distance && diff <= max_distance && node != source && seen.insert(node) {
                    result.push(node);
                }
            }
        }
        Box::new(result.into_iter())
    }

    fn distance(&self, edge: &Edge) -> Option<usize> {
        if edge.source == edge.target {
            return Some(0);
        }
        let source_orders = self.node_to_order.get(&edge.source)?;
        let target_orders = self.node_to_order.get(&edge.target)?;
        let mut min_level: Option<usize> = None;
        for s in source_orders {
            for t in target_orders {
                if s.pre <= t.pre && t.post <= s.post {
                    let diff = s.level.abs_diff(t.level);
                    min_level = Some(min_level.map_or(diff, |m: usize| m.min(diff)));
                }
            }
        }
        min_level
    }

    fn get_edge_annotations(&self, edge: &Edge) -> Vec<Annotation> {
        self.edge_annos.get_annotations_for_item(edge)
    }

    fn edge_annos(&self) -> &AnnoStorage<Edge> {
        &self.edge_annos
    }

    fn num_edges(&self) -> usize {
        self.node_to_order
            .keys()
            .map(|&n| self.find_connected(n, 1, 1).count())
            .sum()
    }

    fn stats(&self) -> Option<&GraphStatistics> {
        self.stats.as_ref()
    }

    fn estimate_memory_size(&self) -> usize {
        self.order_to_node.len() * std::mem::size_of::<(PrePost<O, L>, NodeID)>()
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

    fn tree_source() -> AdjacencyListStorage {
        let mut gs = AdjacencyListStorage::new();
        gs.add_edge(edge(1, 2));
        gs.add_edge(edge(1, 3));
        gs.add_edge(edge(2, 4));
        gs.calculate_statistics();
        gs
    }

    #[test]
    fn agrees_with_adjacency_list_within_max_depth() {
        let source = tree_source();
        let prepost = PrePostOrderStorage::<u32, i32>::try_from_source(&source).unwrap();

        for &(s, t) in &[(1u32, 2u32), (1, 3), (1, 4), (2, 4)] {
            assert_eq!(
                source.is_connected(&edge(s, t), 1, 10),
                prepost.is_connected(&edge(s, t), 1, 10),
                "mismatch for {}->{}",
                s,
                t
            );
        }
        assert!(!prepost.is_connected(&edge(3, 4), 1, 10));
        assert!(!prepost.is_connected(&edge(4, 1), 1, 10));
    }

    #[test]
    fn distance_matches_tree_depth() {
        let source = tree_source();
        let prepost = PrePostOrderStorage::<u32, i32>::try_from_source(&source).unwrap();
        assert_eq!(prepost.distance(&edge(1, 4)), Some(2));
        assert_eq!(prepost.distance(&edge(4, 1)), None);
    }
}
