use super::{EdgeContainer, GraphStatistics, ReadableGraphStorage, WriteableGraphStorage};
use crate::annostorage::inmemory::AnnoStorage;
use crate::annostorage::AnnotationStorage;
use crate::errors::Result;
use crate::types::{Annotation, Edge, NodeID};
use malloc_size_of_derive::MallocSizeOf;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};

/// The fallback graph storage: a plain adjacency list. Always valid, used for
/// cyclic components and shallow components (`max_depth <= 1`) where a more
/// specialised storage buys nothing (§4.3.1, §4.3.4 rule 2/6).
#[derive(Serialize, Deserialize, Clone, Default, MallocSizeOf)]
pub struct AdjacencyListStorage {
    /// Outgoing edges per source node, each target list kept sorted and
    /// deduplicated.
    edges: BTreeMap<NodeID, Vec<NodeID>>,
    edge_annos: AnnoStorage<Edge>,
    num_edges: usize,
    stats: Option<GraphStatistics>,
}

impl AdjacencyListStorage {
    pub fn new() -> AdjacencyListStorage {
        AdjacencyListStorage::default()
    }

    /// Build a fresh adjacency-list storage holding the same edges and edge
    /// annotations as `source`; the staging step every optimised storage
    /// starts from (§4.3's "derived during corpus build").
    pub fn copy_from(source: &dyn ReadableGraphStorage) -> AdjacencyListStorage {
        let mut target = AdjacencyListStorage::new();
        super::copy_edges(source, &mut target);
        target
    }

    fn bfs_distance(&self, edge: &Edge, max_distance: usize) -> Option<usize> {
        if edge.source == edge.target {
            return Some(0);
        }
        let mut visited = std::collections::HashSet::new();
        visited.insert(edge.source);
        let mut queue: VecDeque<(NodeID, usize)> = VecDeque::new();
        queue.push_back((edge.source, 0));
        while let Some((node, dist)) = queue.pop_front() {
            if dist >= max_distance {
                continue;
            }
            for next in self.get_outgoing_edges(node) {
                if next == edge.target {
                    return Some(dist + 1);
                }
                if visited.insert(next) {
                    queue.push_back((next, dist + 1));
                }
            }
        }
        None
    }
}

impl EdgeContainer for AdjacencyListStorage {
    fn get_outgoing_edges<'a>(&'a self, node: NodeID) -> Box<dyn Iterator<Item = NodeID> + 'a> {
        match self.edges.get(&node) {
            Some(targets) => Box::new(targets.iter().copied()),
            None => Box::new(std::iter::empty()),
        }
    }

    fn source_nodes<'a>(&'a self) -> Box<dyn Iterator<Item = NodeID> + 'a> {
        Box::new(self.edges.keys().copied())
    }
}

/// BFS-based reachability iterator used by [`AdjacencyListStorage::find_connected`].
/// Expands level by level so distance bounds can be enforced without walking
/// past `max_distance`.
struct BfsReachable<'a> {
    gs: &'a AdjacencyListStorage,
    queue: VecDeque<(NodeID, usize)>,
    visited: std::collections::HashSet<NodeID>,
    min_distance: usize,
    max_distance: usize,
}

impl<'a> Iterator for BfsReachable<'a> {
    type Item = NodeID;

    fn next(&mut self) -> Option<NodeID> {
        while let Some((node, dist)) = self.queue.pop_front() {
            if dist < self.max_distance {
                for next in self.gs.get_outgoing_edges(node) {
                    if self.visited.insert(next) {
                        self.queue.push_back((next, dist + 1));
                    }
                }
            }
            if dist >= self.min_distance && dist > 0 {
                return Some(node);
            }
        }
        None
    }
}

impl ReadableGraphStorage for AdjacencyListStorage {
    fn is_connected(&self, edge: &Edge, min_distance: usize, max_distance: usize) -> bool {
        match self.bfs_distance(edge, max_distance) {
            Some(d) => d >= min_distance && d <= max_distance,
            None => false,
        }
    }

    fn find_connected<'a>(
        &'a self,
        source: NodeID,
        min_distance: usize,
        max_distance: usize,
    ) -> Box<dyn Iterator<Item = NodeID> + 'a> {
        let mut visited = std::collections::HashSet::new();
        visited.insert(source);
        Box::new(BfsReachable {
            gs: self,
            queue: VecDeque::from([(source, 0)]),
            visited,
            min_distance,
            max_distance,
        })
    }

    fn distance(&self, edge: &Edge) -> Option<usize> {
        self.bfs_distance(edge, usize::MAX)
    }

    fn get_edge_annotations(&self, edge: &Edge) -> Vec<Annotation> {
        self.edge_annos.get_annotations_for_item(edge)
    }

    fn edge_annos(&self) -> &AnnoStorage<Edge> {
        &self.edge_annos
    }

    fn num_edges(&self) -> usize {
        self.num_edges
    }

    fn stats(&self) -> Option<&GraphStatistics> {
        self.stats.as_ref()
    }

    fn estimate_memory_size(&self) -> usize {
        let edge_bytes: usize = self
            .edges
            .values()
            .map(|v| v.len() * std::mem::size_of::<NodeID>())
            .sum();
        edge_bytes
            + self.edges.len() * std::mem::size_of::<NodeID>()
            + self.edge_annos.len() * std::mem::size_of::<Annotation>()
    }

    fn save_to(&self, writer: &mut dyn std::io::Write) -> Result<()> {
        bincode::serialize_into(writer, self)?;
        Ok(())
    }
}

impl WriteableGraphStorage for AdjacencyListStorage {
    fn add_edge(&mut self, edge: Edge) {
        let targets = self.edges.entry(edge.source).or_insert_with(Vec::new);
        if let Err(idx) = targets.binary_search(&edge.target) {
            targets.insert(idx, edge.target);
            self.num_edges += 1;
        }
        self.edges.entry(edge.target).or_insert_with(Vec::new);
    }

    fn add_edge_annotation(&mut self, edge: Edge, anno: Annotation) {
        self.edge_annos.insert(edge, anno);
    }

    fn clear(&mut self) {
        self.edges.clear();
        self.edge_annos.clear();
        self.num_edges = 0;
        self.stats = None;
    }

    fn calculate_statistics(&mut self) {
        let roots: Vec<NodeID> = {
            let targets: std::collections::HashSet<NodeID> =
                self.edges.values().flatten().copied().collect();
            self.edges
                .keys()
                .copied()
                .filter(|n| !targets.contains(n) && !self.edges[n].is_empty())
                .collect()
        };

        let mut max_fan_out = 0usize;
        let mut fan_outs: Vec<usize> = Vec::new();
        let mut num_source_nodes = 0usize;
        for targets in self.edges.values() {
            if !targets.is_empty() {
                num_source_nodes += 1;
                max_fan_out = max_fan_out.max(targets.len());
                fan_outs.push(targets.len());
            }
        }
        fan_outs.sort_unstable();
        let fan_out_99_percentile = if fan_outs.is_empty() {
            0
        } else {
            let idx = ((fan_outs.len() as f64) * 0.99).floor() as usize;
            fan_outs[idx.min(fan_outs.len() - 1)]
        };
        let avg_fan_out = if num_source_nodes == 0 {
            0.0
        } else {
            fan_outs.iter().sum::<usize>() as f64 / num_source_nodes as f64
        };

        let mut max_depth = 0usize;
        let mut cyclic = false;
        let mut visited_total = 0usize;
        for &root in &roots {
            let mut dfs = super::dfs::CycleSafeDfs::new(self, root, 0, usize::MAX);
            for step in &mut dfs {
                max_depth = max_depth.max(step.distance);
                visited_total += 1;
            }
            if dfs.cyclic() {
                cyclic = true;
            }
        }
        // any source node not reachable from a detected root indicates a
        // cycle with no in-degree-0 entry point.
        if !cyclic && visited_total < num_source_nodes {
            cyclic = true;
        }

        let nodes = self.edges.len();
        let dfs_visit_ratio = if nodes == 0 {
            1.0
        } else {
            visited_total as f64 / nodes as f64
        };

        let mut in_degree: std::collections::HashMap<NodeID, usize> =
            std::collections::HashMap::new();
        for targets in self.edges.values() {
            for t in targets {
                *in_degree.entry(*t).or_insert(0) += 1;
            }
        }
        let rooted_tree =
            !cyclic && roots.len() == 1 && in_degree.values().all(|&d| d <= 1);

        self.stats = Some(GraphStatistics {
            valid: true,
            cyclic,
            rooted_tree,
            nodes,
            avg_fan_out,
            fan_out_99_percentile,
            max_fan_out,
            max_depth,
            dfs_visit_ratio,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edge(s: NodeID, t: NodeID) -> Edge {
        Edge {
            source: s,
            target: t,
        }
    }

    #[test]
    fn direct_edge_is_connected_at_distance_one() {
        let mut gs = AdjacencyListStorage::new();
        gs.add_edge(edge(1, 2));
        assert!(gs.is_connected(&edge(1, 2), 1, 1));
        assert_eq!(gs.distance(&edge(1, 2)), Some(1));
    }

    #[test]
    fn transitive_reachability_respects_bounds() {
        let mut gs = AdjacencyListStorage::new();
        gs.add_edge(edge(1, 2));
        gs.add_edge(edge(2, 3));
        gs.add_edge(edge(3, 4));

        assert!(!gs.is_connected(&edge(1, 4), 1, 2));
        assert!(gs.is_connected(&edge(1, 4), 3, 3));
        assert_eq!(gs.distance(&edge(1, 4)), Some(3));
        assert_eq!(gs.distance(&edge(4, 1)), None);

        let reachable: Vec<_> = gs.find_connected(1, 1, 2).collect();
        assert_eq!(reachable, vec![2, 3]);
    }

    #[test]
    fn unreachable_edge_has_no_distance() {
        let gs = AdjacencyListStorage::new();
        assert_eq!(gs.distance(&edge(1, 2)), None);
        assert!(!gs.is_connected(&edge(1, 2), 1, 1));
    }

    #[test]
    fn statistics_detect_cycle_and_depth() {
        let mut gs = AdjacencyListStorage::new();
        gs.add_edge(edge(1, 2));
        gs.add_edge(edge(2, 3));
        gs.calculate_statistics();
        let stats = gs.stats().unwrap();
        assert!(!stats.cyclic);
        assert_eq!(stats.max_depth, 2);

        let mut cyclic_gs = AdjacencyListStorage::new();
        cyclic_gs.add_edge(edge(1, 2));
        cyclic_gs.add_edge(edge(2, 1));
        cyclic_gs.calculate_statistics();
        assert!(cyclic_gs.stats().unwrap().cyclic);
    }
}
