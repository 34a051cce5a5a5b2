use crate::operator::Operator;
use graphannis_core::types::MatchGroup;
use rustc_hash::FxHashMap;
use std::fmt;

/// The accumulated cost of one execution node (spec.md §4.5 "cost model").
/// `output` feeds both the operand-switch heuristic and the parent join's own
/// cost; `intermediate_sum` is the number compared across candidate plans.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CostEstimate {
    pub output: usize,
    pub processed_in_step: usize,
    pub intermediate_sum: usize,
}

/// A node of the planner's decision tree, kept alongside the executing
/// iterator purely for cost bookkeeping and diagnostics; it carries no
/// behaviour of its own.
#[derive(Debug, Clone)]
pub struct Desc {
    pub component_nr: usize,
    pub lhs: Option<Box<Desc>>,
    pub rhs: Option<Box<Desc>>,
    /// Maps a tuple position in this subtree's output to the position the
    /// query originally declared the node at, so results can be reordered
    /// back into declaration order once the whole tree is built.
    pub node_pos: FxHashMap<usize, usize>,
    pub impl_description: String,
    pub query_fragment: String,
    pub cost: Option<CostEstimate>,
}

impl Desc {
    pub fn debug_string(&self, indent: &str) -> String {
        let cost = self
            .cost
            .as_ref()
            .map(|c| format!(" cost={}", c.intermediate_sum))
            .unwrap_or_default();
        let mut s = format!("{}{} [{}]{}\n", indent, self.query_fragment, self.impl_description, cost);
        let child_indent = format!("{}  ", indent);
        if let Some(lhs) = &self.lhs {
            s.push_str(&lhs.debug_string(&child_indent));
        }
        if let Some(rhs) = &self.rhs {
            s.push_str(&rhs.debug_string(&child_indent));
        }
        s
    }
}

/// Every plan-tree vertex produces [`MatchGroup`] tuples and can report the
/// cost-model description that built it (`None` for an ad-hoc/test node).
pub trait ExecutionNode: Iterator<Item = MatchGroup> {
    fn get_desc(&self) -> Option<&Desc> {
        None
    }

    /// `Some` only for a leaf that seeds a per-tuple lookup directly off a
    /// node predicate (used by `create_join` to recognise an index-joinable
    /// operand without downcasting).
    fn as_nodesearch(&self) -> Option<&dyn NodeSearch> {
        None
    }
}

/// The capability a base (node-predicate) execution leaf exposes to the
/// planner so a seed-index join can re-run the node predicate per
/// candidate instead of consuming the leaf's own iterator (spec.md §4.6
/// "seed-index" executor).
pub trait NodeSearch {
    fn node_search_desc(&self) -> &NodeSearchDesc;
}

/// Everything a seed-index join needs to test whether a specific node
/// satisfies the RHS (or LHS, after an operand swap) node predicate, without
/// re-running a full annotation-index scan.
#[derive(Debug, Clone)]
pub struct NodeSearchDesc {
    pub qname: Option<(Option<u32>, u32)>,
    pub constraint: NodeConstraint,
}

#[derive(Debug, Clone)]
pub enum NodeConstraint {
    Any,
    ExactValue(Option<u32>),
    ValueIn(std::collections::HashSet<u32>),
}

pub(crate) struct EmptyResultSet;

impl Iterator for EmptyResultSet {
    type Item = MatchGroup;
    fn next(&mut self) -> Option<MatchGroup> {
        None
    }
}

impl ExecutionNode for EmptyResultSet {}

/// The step cost formulas of spec.md §4.5: a join's own processing cost plus
/// the accumulated cost of everything under it.
pub fn calculate_outputsize(op: &dyn Operator, num_tuples: usize) -> usize {
    use crate::operator::EstimationType;
    let output = match op.estimation_type() {
        EstimationType::Selectivity(selectivity) => {
            let sel = match op.edge_anno_selectivity() {
                Some(edge_sel) => selectivity * edge_sel,
                None => selectivity,
            };
            (num_tuples as f64 * sel).round() as usize
        }
        EstimationType::Max => num_tuples,
        EstimationType::Min => 1,
    };
    output.max(1)
}

impl fmt::Display for Desc {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.debug_string(""))
    }
}
