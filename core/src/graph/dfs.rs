use super::ReadableGraphStorage;
use crate::types::NodeID;
use rustc_hash::FxHashSet;

/// One step of a depth-first traversal: the visited node, its distance from
/// the start node, and whether entering it closed a cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DfsStep {
    pub node: NodeID,
    pub distance: usize,
    pub cyclic: bool,
}

/// A depth-first traversal over any [`ReadableGraphStorage`] that never
/// diverges on a cyclic graph: a node already on the current path is reported
/// once (with `cyclic = true`) and not expanded further.
///
/// Mirrors the source's `CycleSafeDFS`: cycle detection is a flag on the
/// yielded step rather than an exception, so callers that don't care about
/// cycles (e.g. pre/post-order construction, which requires acyclic input)
/// can simply check the flag instead of handling a thrown error.
pub struct CycleSafeDfs<'a> {
    gs: &'a dyn ReadableGraphStorage,
    min_distance: usize,
    max_distance: usize,
    /// `(node, distance)` entries still to visit.
    stack: Vec<(NodeID, usize)>,
    /// Nodes currently on the path from the root to the top of `stack`,
    /// keyed by the distance at which they were entered so we can pop them
    /// again once the traversal backs out past that depth.
    path: Vec<NodeID>,
    cycle_detected: bool,
}

impl<'a> CycleSafeDfs<'a> {
    pub fn new(
        gs: &'a dyn ReadableGraphStorage,
        start_node: NodeID,
        min_distance: usize,
        max_distance: usize,
    ) -> CycleSafeDfs<'a> {
        CycleSafeDfs {
            gs,
            min_distance,
            max_distance,
            stack: vec![(start_node, 0)],
            path: Vec::new(),
            cycle_detected: false,
        }
    }

    /// Whether any cycle was encountered so far.
    pub fn cyclic(&self) -> bool {
        self.cycle_detected
    }

    fn enter_node(&mut self, node: NodeID, distance: usize) -> bool {
        self.path.truncate(distance);
        if self.path.contains(&node) {
            self.cycle_detected = true;
            return false;
        }
        self.path.push(node);
        true
    }
}

impl<'a> Iterator for CycleSafeDfs<'a> {
    type Item = DfsStep;

    fn next(&mut self) -> Option<DfsStep> {
        while let Some((node, distance)) = self.stack.pop() {
            let entered = self.enter_node(node, distance);
            if !entered {
                continue;
            }

            if distance + 1 <= self.max_distance {
                let mut children: Vec<NodeID> = self.gs.get_outgoing_edges(node).collect();
                children.reverse();
                for child in children {
                    self.stack.push((child, distance + 1));
                }
            }

            if distance >= self.min_distance {
                return Some(DfsStep {
                    node,
                    distance,
                    cyclic: false,
                });
            }
        }
        None
    }
}

/// A DFS that visits every reachable node at most once overall (not just
/// once per path), used where only set-membership matters (e.g. overlap's
/// covered-token collection).
pub struct UniqueDfs<'a> {
    inner: CycleSafeDfs<'a>,
    visited: FxHashSet<NodeID>,
}

impl<'a> UniqueDfs<'a> {
    pub fn new(
        gs: &'a dyn ReadableGraphStorage,
        start_node: NodeID,
        min_distance: usize,
        max_distance: usize,
    ) -> UniqueDfs<'a> {
        UniqueDfs {
            inner: CycleSafeDfs::new(gs, start_node, min_distance, max_distance),
            visited: FxHashSet::default(),
        }
    }
}

impl<'a> Iterator for UniqueDfs<'a> {
    type Item = DfsStep;

    fn next(&mut self) -> Option<DfsStep> {
        for step in self.inner.by_ref() {
            if self.visited.insert(step.node) {
                return Some(step);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::adjacencylist::AdjacencyListStorage;
    use crate::graph::WriteableGraphStorage;
    use crate::types::Edge;

    fn edge(s: NodeID, t: NodeID) -> Edge {
        Edge {
            source: s,
            target: t,
        }
    }

    #[test]
    fn visits_tree_in_preorder_with_distance() {
        let mut gs = AdjacencyListStorage::new();
        gs.add_edge(edge(1, 2));
        gs.add_edge(edge(1, 3));
        gs.add_edge(edge(2, 4));

        let steps: Vec<_> = CycleSafeDfs::new(&gs, 1, 0, usize::MAX)
            .map(|s| (s.node, s.distance))
            .collect();
        assert_eq!(steps, vec![(1, 0), (2, 1), (4, 2), (3, 1)]);
    }

    #[test]
    fn detects_cycle_without_diverging() {
        let mut gs = AdjacencyListStorage::new();
        gs.add_edge(edge(1, 2));
        gs.add_edge(edge(2, 1));

        let mut dfs = CycleSafeDfs::new(&gs, 1, 0, usize::MAX);
        let steps: Vec<_> = (&mut dfs).take(5).collect();
        assert!(dfs.cyclic());
        assert!(steps.len() <= 3);
    }
}
