use super::{EstimationType, Operator, OperatorSpec};
use crate::corpus::Corpus;
use crate::util::token_helper::{self, TokenHelper};
use graphannis_core::graph::registry::GraphStorage;
use graphannis_core::graph::{EdgeContainer, ReadableGraphStorage};
use graphannis_core::types::{
    Annotation, Component, ComponentType, Edge, Match, NodeID, ANNIS_NS, COVERAGE_COMPONENT,
    INVERSE_COVERAGE_COMPONENT, ORDERING_COMPONENT,
};
use rustc_hash::FxHashSet;
use std::fmt;
use std::sync::Arc;

/// `_o_` — LHS and RHS share at least one covered token (spec.md §4.4).
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub struct OverlapSpec;

impl OperatorSpec for OverlapSpec {
    fn necessary_components(&self, _corpus: &Corpus) -> Vec<Component> {
        let mut v = vec![
            ORDERING_COMPONENT.clone(),
            COVERAGE_COMPONENT.clone(),
            INVERSE_COVERAGE_COMPONENT.clone(),
        ];
        v.extend(token_helper::necessary_components());
        v
    }

    fn create_operator(&self, corpus: &Corpus) -> Option<Box<dyn Operator>> {
        Overlap::new(corpus).map(|op| Box::new(op) as Box<dyn Operator>)
    }
}

pub struct Overlap {
    gs_order: Arc<GraphStorage>,
    gs_cov: Arc<GraphStorage>,
    gs_inverse_cov: Arc<GraphStorage>,
    tok_helper: TokenHelper,
}

impl Overlap {
    pub fn new(corpus: &Corpus) -> Option<Overlap> {
        let gs_order = corpus.get_graphstorage(&ORDERING_COMPONENT)?;
        let gs_cov = corpus.get_graphstorage(&COVERAGE_COMPONENT)?;
        let gs_inverse_cov = corpus.get_graphstorage(&INVERSE_COVERAGE_COMPONENT)?;
        let tok_helper = TokenHelper::new(corpus)?;
        Some(Overlap {
            gs_order,
            gs_cov,
            gs_inverse_cov,
            tok_helper,
        })
    }
}

impl fmt::Display for Overlap {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "_o_")
    }
}

impl Operator for Overlap {
    fn retrieve_matches<'a>(&'a self, lhs: &Match) -> Box<dyn Iterator<Item = Match> + 'a> {
        let mut result: FxHashSet<NodeID> = FxHashSet::default();

        let covered: Box<dyn Iterator<Item = NodeID>> = if self.tok_helper.covers_nothing(lhs.node) {
            Box::new(std::iter::once(lhs.node))
        } else {
            Box::new(self.gs_cov.find_connected(lhs.node, 1, 1))
        };

        for t in covered {
            for n in self.gs_inverse_cov.get_outgoing_edges(t) {
                result.insert(n);
            }
            result.insert(t);
        }

        Box::new(result.into_iter().map(|n| Match::new(n, Annotation::default())))
    }

    fn filter_match(&self, lhs: &Match, rhs: &Match) -> bool {
        if let (Some(start_lhs), Some(end_lhs), Some(start_rhs), Some(end_rhs)) = (
            self.tok_helper.left_token_for(lhs.node),
            self.tok_helper.right_token_for(lhs.node),
            self.tok_helper.left_token_for(rhs.node),
            self.tok_helper.right_token_for(rhs.node),
        ) {
            let forward = Edge { source: start_lhs, target: end_rhs };
            let backward = Edge { source: start_rhs, target: end_lhs };
            return self.gs_order.distance(&forward).is_some() && self.gs_order.distance(&backward).is_some();
        }
        false
    }

    fn is_reflexive(&self) -> bool {
        false
    }

    fn is_commutative(&self) -> bool {
        true
    }

    fn get_inverse_operator(&self) -> Option<Box<dyn Operator>> {
        Some(Box::new(Overlap {
            gs_order: self.gs_order.clone(),
            gs_cov: self.gs_cov.clone(),
            gs_inverse_cov: self.gs_inverse_cov.clone(),
            tok_helper: self.tok_helper.clone(),
        }))
    }

    fn estimation_type(&self) -> EstimationType {
        if let (Some(stats_cov), Some(stats_inv_cov), Some(stats_order)) =
            (self.gs_cov.stats(), self.gs_inverse_cov.stats(), self.gs_order.stats())
        {
            let num_of_token = stats_order.nodes.max(1) as f64;
            if stats_cov.nodes == 0 {
                return EstimationType::Selectivity(1.0 / num_of_token);
            }
            let covered_token_per_node = stats_cov.fan_out_99_percentile as f64;
            // the missing "inverse fan-out" statistic of the coverage component is
            // recovered from the InverseCoverage component's own fan-out, which is
            // exactly that quantity under a different name.
            let aligned_non_token = covered_token_per_node * stats_inv_cov.fan_out_99_percentile as f64;
            let sum_included = covered_token_per_node + aligned_non_token;
            return EstimationType::Selectivity(sum_included / (stats_cov.nodes as f64));
        }
        EstimationType::Selectivity(0.1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use graphannis_core::graph::WriteableGraphStorage;
    use graphannis_core::graph::adjacencylist::AdjacencyListStorage;

    const S1: NodeID = 4;
    const NORM1: NodeID = 5;

    /// `S1` spans `tok1..tok3`, `NORM1` spans only `tok2`: they overlap on
    /// `tok2` even though `NORM1` does not include `S1` (spec.md §4.4 `_o_`).
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
        left.add_edge(Edge { source: S1, target: 1 });
        right.add_edge(Edge { source: S1, target: 3 });
        left.add_edge(Edge { source: NORM1, target: 2 });
        right.add_edge(Edge { source: NORM1, target: 2 });
        left.calculate_statistics();
        right.calculate_statistics();
        corpus.insert_graphstorage(Component::new(ComponentType::LeftToken, ANNIS_NS, ""), GraphStorage::AdjacencyList(left));
        corpus.insert_graphstorage(Component::new(ComponentType::RightToken, ANNIS_NS, ""), GraphStorage::AdjacencyList(right));

        let mut cov = AdjacencyListStorage::new();
        let mut inv_cov = AdjacencyListStorage::new();
        for (parent, t) in [(S1, 1u32), (S1, 2), (S1, 3), (NORM1, 2)] {
            cov.add_edge(Edge { source: parent, target: t });
            inv_cov.add_edge(Edge { source: t, target: parent });
        }
        cov.calculate_statistics();
        inv_cov.calculate_statistics();
        corpus.insert_graphstorage(Component::new(ComponentType::Coverage, ANNIS_NS, ""), GraphStorage::AdjacencyList(cov));
        corpus.insert_graphstorage(Component::new(ComponentType::InverseCoverage, ANNIS_NS, ""), GraphStorage::AdjacencyList(inv_cov));

        corpus
    }

    #[test]
    fn spans_sharing_a_token_overlap() {
        let corpus = build_corpus();
        let op = Overlap::new(&corpus).unwrap();
        assert!(op.filter_match(&Match::new(S1, Annotation::default()), &Match::new(NORM1, Annotation::default())));
    }

    #[test]
    fn retrieve_matches_from_norm_finds_the_covering_span() {
        let corpus = build_corpus();
        let op = Overlap::new(&corpus).unwrap();
        let found: Vec<NodeID> = op.retrieve_matches(&Match::new(NORM1, Annotation::default())).map(|m| m.node).collect();
        assert!(found.contains(&S1));
    }

    #[test]
    fn is_commutative_and_non_reflexive() {
        let corpus = build_corpus();
        let op = Overlap::new(&corpus).unwrap();
        assert!(op.is_commutative());
        assert!(!op.is_reflexive());
    }
}
