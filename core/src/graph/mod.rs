use crate::annostorage::inmemory::AnnoStorage;
use crate::annostorage::AnnotationStorage;
use crate::errors::Result;
use crate::types::{Annotation, Edge, NodeID};
use malloc_size_of_derive::MallocSizeOf;
use serde::{Deserialize, Serialize};

pub mod adjacencylist;
pub mod dfs;
pub mod linear;
pub mod prepost;
pub mod registry;

/// Per-component statistics used both for serialisation and by the graph
/// storage registry's implementation-selection heuristics (§4.3.4).
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, MallocSizeOf)]
pub struct GraphStatistics {
    /// Whether the other fields were computed (a freshly constructed, empty
    /// storage has `valid = false`).
    pub valid: bool,
    pub cyclic: bool,
    pub rooted_tree: bool,
    pub nodes: usize,
    pub avg_fan_out: f64,
    pub fan_out_99_percentile: usize,
    pub max_fan_out: usize,
    pub max_depth: usize,
    /// Ratio of DFS-visited nodes to real nodes; >1 indicates a DAG with
    /// shared descendants that a tree-shaped storage would visit twice.
    pub dfs_visit_ratio: f64,
}

/// Everything that can enumerate outgoing edges for a node; the minimal
/// capability both join executors and the DFS helper need.
pub trait EdgeContainer: Sync + Send {
    fn get_outgoing_edges<'a>(&'a self, node: NodeID) -> Box<dyn Iterator<Item = NodeID> + 'a>;

    /// Every node that is the source of at least one edge in this container.
    fn source_nodes<'a>(&'a self) -> Box<dyn Iterator<Item = NodeID> + 'a>;
}

/// The read-only capability set shared by every graph storage implementation
/// (§4.3). A graph storage belongs to exactly one [`crate::types::Component`].
pub trait ReadableGraphStorage: EdgeContainer {
    fn is_connected(&self, edge: &Edge, min_distance: usize, max_distance: usize) -> bool;

    /// Lazily enumerate every node reachable from `source` within
    /// `[min_distance, max_distance]` steps. Not restartable once exhausted.
    fn find_connected<'a>(
        &'a self,
        source: NodeID,
        min_distance: usize,
        max_distance: usize,
    ) -> Box<dyn Iterator<Item = NodeID> + 'a>;

    /// Shortest distance between `edge.source` and `edge.target`, `None` if
    /// unreachable (the spec's `-1` sentinel).
    fn distance(&self, edge: &Edge) -> Option<usize>;

    fn get_edge_annotations(&self, edge: &Edge) -> Vec<Annotation>;

    fn edge_annos(&self) -> &AnnoStorage<Edge>;

    fn num_edges(&self) -> usize;

    fn num_edge_annotations(&self) -> usize {
        self.edge_annos().len()
    }

    fn stats(&self) -> Option<&GraphStatistics>;

    fn estimate_memory_size(&self) -> usize;

    fn save_to(&self, writer: &mut dyn std::io::Write) -> Result<()>;
}

/// Mutable capability set used while a component is being built from a source
/// graph (outside this crate's scope in production, but part of the §4.3
/// capability list and needed by `copy_from`/statistics calculation below).
pub trait WriteableGraphStorage: ReadableGraphStorage {
    fn add_edge(&mut self, edge: Edge);
    fn add_edge_annotation(&mut self, edge: Edge, anno: Annotation);
    fn clear(&mut self);
    fn calculate_statistics(&mut self);
}

/// Copy every edge and edge annotation of `source` into `target`, the common
/// first step of building any optimised storage from the adjacency-list
/// staging graph produced during import.
pub fn copy_edges(
    source: &dyn ReadableGraphStorage,
    target: &mut dyn WriteableGraphStorage,
) {
    target.clear();
    for from in source.source_nodes().collect::<Vec<_>>() {
        for to in source.get_outgoing_edges(from).collect::<Vec<_>>() {
            let edge = Edge {
                source: from,
                target: to,
            };
            target.add_edge(edge);
            for anno in source.get_edge_annotations(&edge) {
                target.add_edge_annotation(edge, anno);
            }
        }
    }
}
