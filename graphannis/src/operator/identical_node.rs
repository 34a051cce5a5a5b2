use super::{EstimationType, Operator, OperatorSpec};
use crate::corpus::Corpus;
use graphannis_core::types::{Annotation, Component, Match};
use std::fmt;

/// `_ident_` — LHS and RHS refer to the same node (spec.md §4.4, node-id
/// equality only; resolved Open Question: annotation identity is irrelevant
/// here, only the node itself is compared).
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub struct IdenticalNodeSpec;

impl OperatorSpec for IdenticalNodeSpec {
    fn necessary_components(&self, _corpus: &Corpus) -> Vec<Component> {
        vec![]
    }

    fn create_operator(&self, _corpus: &Corpus) -> Option<Box<dyn Operator>> {
        Some(Box::new(IdenticalNode))
    }
}

#[derive(Clone, Debug)]
pub struct IdenticalNode;

impl fmt::Display for IdenticalNode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "_ident_")
    }
}

impl Operator for IdenticalNode {
    fn retrieve_matches<'a>(&'a self, lhs: &Match) -> Box<dyn Iterator<Item = Match> + 'a> {
        Box::new(std::iter::once(Match::new(lhs.node, Annotation::default())))
    }

    fn filter_match(&self, lhs: &Match, rhs: &Match) -> bool {
        lhs.node == rhs.node
    }

    fn is_commutative(&self) -> bool {
        true
    }

    fn get_inverse_operator(&self) -> Option<Box<dyn Operator>> {
        Some(Box::new(IdenticalNode))
    }

    fn estimation_type(&self) -> EstimationType {
        EstimationType::Min
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_the_same_node_matches() {
        let op = IdenticalNode;
        let a = Match::new(1, Annotation::default());
        let b = Match::new(2, Annotation::default());
        assert!(op.filter_match(&a, &a));
        assert!(!op.filter_match(&a, &b));
    }

    #[test]
    fn retrieve_matches_yields_the_lhs_node_itself() {
        let op = IdenticalNode;
        let lhs = Match::new(7, Annotation::default());
        let result: Vec<Match> = op.retrieve_matches(&lhs).collect();
        assert_eq!(result, vec![Match::new(7, Annotation::default())]);
    }
}
