use crate::corpus::Corpus;
use graphannis_core::types::{Component, Match};
use serde_derive::Deserialize;
use std::fmt;

pub mod edge_op;
pub mod identical_coverage;
pub mod identical_node;
pub mod inclusion;
pub mod overlap;
pub mod precedence;

pub use edge_op::{DominanceSpec, PartOfSubCorpusSpec, PointingSpec};
pub use identical_coverage::IdenticalCoverageSpec;
pub use identical_node::IdenticalNodeSpec;
pub use inclusion::InclusionSpec;
pub use overlap::OverlapSpec;
pub use precedence::PrecedenceSpec;

/// How confident an [`Operator`] is about the number of matches
/// `retrieve_matches` will produce for one left-hand-side match, used by the
/// planner's cost model (§4.4).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EstimationType {
    /// Fraction of all nodes expected to match.
    Selectivity(f64),
    /// Expect close to all nodes to match (e.g. a cyclic graph component).
    Max,
    /// Expect close to none to match.
    Min,
}

impl EstimationType {
    pub fn as_selectivity(&self) -> f64 {
        match self {
            EstimationType::Selectivity(s) => *s,
            EstimationType::Max => 1.0,
            EstimationType::Min => 0.0001,
        }
    }
}

/// A binary relation between two query nodes (`Precedence`, `Dominance`, ...),
/// already bound to a concrete corpus's graph storages (§4.2). `retrieve_matches`
/// drives an index join's probe side; `filter_match` re-checks a candidate pair
/// produced by some other join strategy (a nested loop, or the probe side of
/// the *other* operand).
pub trait Operator: fmt::Display + Sync + Send {
    fn retrieve_matches<'a>(&'a self, lhs: &Match) -> Box<dyn Iterator<Item = Match> + 'a>;

    fn filter_match(&self, lhs: &Match, rhs: &Match) -> bool;

    /// Whether a node may be related to itself (e.g. `_=_`, `_o_`).
    fn is_reflexive(&self) -> bool {
        true
    }

    /// Whether swapping operands yields the same result set (only a
    /// commutative operator is a candidate for operand-switch avoidance of
    /// nested loops, §4.5 step 2).
    fn is_commutative(&self) -> bool {
        false
    }

    /// An operator computing the reverse relation, if the planner can build
    /// one without changing the cost profile (§4.5 step 2). `None` disables
    /// the operand switch for this operator.
    fn get_inverse_operator(&self) -> Option<Box<dyn Operator>> {
        None
    }

    fn estimation_type(&self) -> EstimationType {
        EstimationType::Selectivity(0.1)
    }

    /// Additional selectivity contributed by a required edge annotation
    /// predicate, `None` if the operator carries none.
    fn edge_anno_selectivity(&self) -> Option<f64> {
        None
    }
}

/// How to match an annotation value on an edge (spec.md §2 "edge annotation
/// predicate"). Kept at the string level; an operator resolves these against
/// a corpus's interned strings when it is built, degrading to "never matches"
/// for a value that was never interned (the engine-wide predicate-failure
/// policy, spec.md §7).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeAnnoSearchSpec {
    ExactValue {
        ns: Option<String>,
        name: String,
        val: Option<String>,
    },
    NotExactValue {
        ns: Option<String>,
        name: String,
        val: String,
    },
    RegexValue {
        ns: Option<String>,
        name: String,
        val: String,
    },
    NotRegexValue {
        ns: Option<String>,
        name: String,
        val: String,
    },
}

impl fmt::Display for EdgeAnnoSearchSpec {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            EdgeAnnoSearchSpec::ExactValue { name, val: Some(val), .. } => write!(f, "{}=\"{}\"", name, val),
            EdgeAnnoSearchSpec::ExactValue { name, val: None, .. } => write!(f, "{}", name),
            EdgeAnnoSearchSpec::NotExactValue { name, val, .. } => write!(f, "{}!=\"{}\"", name, val),
            EdgeAnnoSearchSpec::RegexValue { name, val, .. } => write!(f, "{}=/{}/", name, val),
            EdgeAnnoSearchSpec::NotRegexValue { name, val, .. } => write!(f, "{}!=/{}/", name, val),
        }
    }
}

/// The planner-facing description of an operator: the components it needs
/// loaded and a factory for the bound [`Operator`] (§4.2 "operator binding").
pub trait OperatorSpec: fmt::Debug {
    fn necessary_components(&self, corpus: &Corpus) -> Vec<Component>;

    fn create_operator(&self, corpus: &Corpus) -> Option<Box<dyn Operator>>;

    fn get_edge_anno_spec(&self) -> Option<EdgeAnnoSearchSpec> {
        None
    }
}
