use super::{EstimationType, Operator, OperatorSpec};
use crate::corpus::Corpus;
use crate::util::token_helper::{self, TokenHelper};
use graphannis_core::graph::registry::GraphStorage;
use graphannis_core::graph::{EdgeContainer, ReadableGraphStorage};
use graphannis_core::types::{
    Annotation, Component, ComponentType, Match, ANNIS_NS, INVERSE_COVERAGE_COMPONENT, ORDERING_COMPONENT,
};
use std::fmt;
use std::sync::Arc;

/// `_=_` — LHS and RHS cover exactly the same token span (spec.md §4.4).
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub struct IdenticalCoverageSpec;

impl OperatorSpec for IdenticalCoverageSpec {
    fn necessary_components(&self, _corpus: &Corpus) -> Vec<Component> {
        let mut v = vec![INVERSE_COVERAGE_COMPONENT.clone(), ORDERING_COMPONENT.clone()];
        v.extend(token_helper::necessary_components());
        v
    }

    fn create_operator(&self, corpus: &Corpus) -> Option<Box<dyn Operator>> {
        IdenticalCoverage::new(corpus).map(|op| Box::new(op) as Box<dyn Operator>)
    }
}

pub struct IdenticalCoverage {
    gs_inverse_cov: Arc<GraphStorage>,
    gs_order: Arc<GraphStorage>,
    tok_helper: TokenHelper,
}

impl IdenticalCoverage {
    pub fn new(corpus: &Corpus) -> Option<IdenticalCoverage> {
        let gs_inverse_cov = corpus.get_graphstorage(&INVERSE_COVERAGE_COMPONENT)?;
        let gs_order = corpus.get_graphstorage(&ORDERING_COMPONENT)?;
        let tok_helper = TokenHelper::new(corpus)?;
        Some(IdenticalCoverage {
            gs_inverse_cov,
            gs_order,
            tok_helper,
        })
    }
}

impl fmt::Display for IdenticalCoverage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "_=_")
    }
}

impl Operator for IdenticalCoverage {
    fn retrieve_matches<'a>(&'a self, lhs: &Match) -> Box<dyn Iterator<Item = Match> + 'a> {
        let n_left = self.tok_helper.left_token_for(lhs.node);
        let n_right = self.tok_helper.right_token_for(lhs.node);
        let mut result = Vec::new();
        if let (Some(n_left), Some(n_right)) = (n_left, n_right) {
            if n_left == n_right {
                result.push(Match::new(n_left, Annotation::default()));
            }
            for c in self.gs_inverse_cov.get_outgoing_edges(n_left) {
                if self.tok_helper.right_token_for(c) == Some(n_right) {
                    result.push(Match::new(c, Annotation::default()));
                }
            }
        }
        Box::new(result.into_iter())
    }

    fn filter_match(&self, lhs: &Match, rhs: &Match) -> bool {
        let start_lhs = self.tok_helper.left_token_for(lhs.node);
        let end_lhs = self.tok_helper.right_token_for(lhs.node);
        let start_rhs = self.tok_helper.left_token_for(rhs.node);
        let end_rhs = self.tok_helper.right_token_for(rhs.node);
        match (start_lhs, end_lhs, start_rhs, end_rhs) {
            (Some(sl), Some(el), Some(sr), Some(er)) => sl == sr && el == er,
            _ => false,
        }
    }

    fn is_reflexive(&self) -> bool {
        false
    }

    fn is_commutative(&self) -> bool {
        true
    }

    fn get_inverse_operator(&self) -> Option<Box<dyn Operator>> {
        Some(Box::new(IdenticalCoverage {
            gs_inverse_cov: self.gs_inverse_cov.clone(),
            gs_order: self.gs_order.clone(),
            tok_helper: self.tok_helper.clone(),
        }))
    }

    fn estimation_type(&self) -> EstimationType {
        match self.gs_order.stats() {
            // two nodes are assumed identical-coverage with probability 1/num_of_token;
            // the right anchor is not independent of the left one, so a single factor
            // covers both sides rather than squaring it.
            Some(stats) if stats.nodes > 0 => EstimationType::Selectivity(1.0 / stats.nodes as f64),
            _ => EstimationType::Selectivity(0.1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use graphannis_core::graph::WriteableGraphStorage;
    use graphannis_core::graph::adjacencylist::AdjacencyListStorage;
    use graphannis_core::types::Edge;

    const S1: NodeID = 4;
    const T1: NodeID = 5;

    /// `S1` and `T1` both span exactly `tok1..tok2`; `tok3` is left out of
    /// both, so the pair is identical-coverage but neither includes `tok3`.
    fn build_corpus() -> Corpus {
        let mut corpus = Corpus::new();

        let mut ordering = AdjacencyListStorage::new();
        ordering.add_edge(Edge { source: 1, target: 2 });
        ordering.add_edge(Edge { source: 2, target: 3 });
        ordering.calculate_statistics();
        corpus.insert_graphstorage(Component::new(ComponentType::Ordering, ANNIS_NS, ""), GraphStorage::AdjacencyList(ordering));

        let mut left = AdjacencyListStorage::new();
        let mut right = AdjacencyListStorage::new();
        for t in [1u32, 2, 3] {
            left.add_edge(Edge { source: t, target: t });
            right.add_edge(Edge { source: t, target: t });
        }
        for parent in [S1, T1] {
            left.add_edge(Edge { source: parent, target: 1 });
            right.add_edge(Edge { source: parent, target: 2 });
        }
        left.calculate_statistics();
        right.calculate_statistics();
        corpus.insert_graphstorage(Component::new(ComponentType::LeftToken, ANNIS_NS, ""), GraphStorage::AdjacencyList(left));
        corpus.insert_graphstorage(Component::new(ComponentType::RightToken, ANNIS_NS, ""), GraphStorage::AdjacencyList(right));

        let mut inv_cov = AdjacencyListStorage::new();
        for parent in [S1, T1] {
            inv_cov.add_edge(Edge { source: 1, target: parent });
            inv_cov.add_edge(Edge { source: 2, target: parent });
        }
        inv_cov.calculate_statistics();
        corpus.insert_graphstorage(Component::new(ComponentType::InverseCoverage, ANNIS_NS, ""), GraphStorage::AdjacencyList(inv_cov));

        corpus
    }

    #[test]
    fn spans_with_the_same_anchors_are_identical_coverage() {
        let corpus = build_corpus();
        let op = IdenticalCoverage::new(&corpus).unwrap();
        assert!(op.filter_match(&Match::new(S1, Annotation::default()), &Match::new(T1, Annotation::default())));
    }

    #[test]
    fn a_token_is_never_identical_coverage_with_a_wider_span() {
        let corpus = build_corpus();
        let op = IdenticalCoverage::new(&corpus).unwrap();
        assert!(!op.filter_match(&Match::new(1, Annotation::default()), &Match::new(S1, Annotation::default())));
    }
}
