use super::{EstimationType, Operator, OperatorSpec};
use crate::corpus::Corpus;
use crate::util::token_helper::{self, TokenHelper};
use graphannis_core::graph::registry::GraphStorage;
use graphannis_core::graph::{EdgeContainer, ReadableGraphStorage};
use graphannis_core::types::{
    Annotation, Component, ComponentType, Edge, Match, NodeID, ANNIS_NS, COVERAGE_COMPONENT,
    LEFT_TOKEN_COMPONENT, ORDERING_COMPONENT,
};
use rustc_hash::FxHashMap;
use std::fmt;
use std::sync::Arc;

/// `_i_` — RHS' left/right anchors both fall inside LHS' token span
/// (spec.md §4.4).
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub struct InclusionSpec;

impl OperatorSpec for InclusionSpec {
    fn necessary_components(&self, _corpus: &Corpus) -> Vec<Component> {
        let mut v = vec![
            ORDERING_COMPONENT.clone(),
            COVERAGE_COMPONENT.clone(),
            LEFT_TOKEN_COMPONENT.clone(),
        ];
        v.extend(token_helper::necessary_components());
        v
    }

    fn create_operator(&self, corpus: &Corpus) -> Option<Box<dyn Operator>> {
        Inclusion::new(corpus).map(|op| Box::new(op) as Box<dyn Operator>)
    }
}

pub struct Inclusion {
    gs_order: Arc<GraphStorage>,
    gs_cov: Arc<GraphStorage>,
    tok_helper: TokenHelper,
    /// `token -> every node whose left anchor is that token`, see the same
    /// construction in [`super::precedence::Precedence`].
    left_aligned: FxHashMap<NodeID, Vec<NodeID>>,
}

impl Inclusion {
    pub fn new(corpus: &Corpus) -> Option<Inclusion> {
        let gs_order = corpus.get_graphstorage(&ORDERING_COMPONENT)?;
        let gs_cov = corpus.get_graphstorage(&COVERAGE_COMPONENT)?;
        let gs_left = corpus.get_graphstorage(&LEFT_TOKEN_COMPONENT)?;
        let tok_helper = TokenHelper::new(corpus)?;

        let mut left_aligned: FxHashMap<NodeID, Vec<NodeID>> = FxHashMap::default();
        for source in gs_left.source_nodes() {
            if let Some(anchor) = gs_left.get_outgoing_edges(source).next() {
                left_aligned.entry(anchor).or_default().push(source);
            }
        }

        Some(Inclusion {
            gs_order,
            gs_cov,
            tok_helper,
            left_aligned,
        })
    }
}

impl fmt::Display for Inclusion {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "_i_")
    }
}

impl Operator for Inclusion {
    fn retrieve_matches<'a>(&'a self, lhs: &Match) -> Box<dyn Iterator<Item = Match> + 'a> {
        let (lt, rt) = match (
            self.tok_helper.left_token_for(lhs.node),
            self.tok_helper.right_token_for(lhs.node),
        ) {
            (Some(lt), Some(rt)) => (lt, rt),
            _ => return Box::new(std::iter::empty()),
        };
        let span = self.gs_order.distance(&Edge { source: lt, target: rt }).unwrap_or(0);

        let mut result = Vec::new();
        for included_tok in self.gs_order.find_connected(lt, 0, span) {
            result.push(included_tok);
            if let Some(aligned) = self.left_aligned.get(&included_tok) {
                for &candidate in aligned {
                    if let Some(end) = self.tok_helper.right_token_for(candidate) {
                        let edge = Edge { source: end, target: rt };
                        if self.gs_order.is_connected(&edge, 0, span) {
                            result.push(candidate);
                        }
                    }
                }
            }
        }
        Box::new(result.into_iter().map(|n| Match::new(n, Annotation::default())))
    }

    fn filter_match(&self, lhs: &Match, rhs: &Match) -> bool {
        let (lt, rt) = match (
            self.tok_helper.left_token_for(lhs.node),
            self.tok_helper.right_token_for(lhs.node),
        ) {
            (Some(lt), Some(rt)) => (lt, rt),
            _ => return false,
        };
        let (rlt, rrt) = match (
            self.tok_helper.left_token_for(rhs.node),
            self.tok_helper.right_token_for(rhs.node),
        ) {
            (Some(a), Some(b)) => (a, b),
            _ => return false,
        };
        let span = self.gs_order.distance(&Edge { source: lt, target: rt }).unwrap_or(0);
        self.gs_order.is_connected(&Edge { source: lt, target: rlt }, 0, span)
            && self.gs_order.is_connected(&Edge { source: rrt, target: rt }, 0, span)
    }

    fn is_reflexive(&self) -> bool {
        false
    }

    fn estimation_type(&self) -> EstimationType {
        match (self.gs_cov.stats(), self.gs_order.stats()) {
            (Some(stats_cov), Some(stats_order)) if stats_order.nodes > 0 => {
                let num_of_token = stats_order.nodes as f64;
                if stats_cov.nodes == 0 {
                    EstimationType::Selectivity(1.0 / num_of_token)
                } else {
                    EstimationType::Selectivity((stats_cov.avg_fan_out / num_of_token).min(1.0))
                }
            }
            _ => EstimationType::Selectivity(0.1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use graphannis_core::graph::WriteableGraphStorage;
    use graphannis_core::graph::adjacencylist::AdjacencyListStorage;

    const S1: NodeID = 4;
    const NORM1: NodeID = 5;

    /// `tok1 "the" -> tok2 "Bilharziose" -> tok3 "."`, `S1` spans all three,
    /// `NORM1` spans only `tok2` (spec.md §8 scenario 6, minus the `cat`/`norm`
    /// annotations which the operator itself does not consult).
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
        cov.add_edge(Edge { source: S1, target: 1 });
        cov.add_edge(Edge { source: S1, target: 2 });
        cov.add_edge(Edge { source: S1, target: 3 });
        cov.add_edge(Edge { source: NORM1, target: 2 });
        cov.calculate_statistics();
        corpus.insert_graphstorage(Component::new(ComponentType::Coverage, ANNIS_NS, ""), GraphStorage::AdjacencyList(cov));

        corpus
    }

    #[test]
    fn span_fully_inside_outer_span_is_included() {
        let corpus = build_corpus();
        let op = Inclusion::new(&corpus).unwrap();
        assert!(op.filter_match(&Match::new(S1, Annotation::default()), &Match::new(NORM1, Annotation::default())));
    }

    #[test]
    fn removing_coverage_edge_yields_no_match_without_crashing() {
        let mut corpus = build_corpus();
        // drop NORM1's coverage entirely, as spec.md §8 scenario 6's "removing the
        // COVERAGE edge makes it 0" does
        let mut empty_left = AdjacencyListStorage::new();
        let mut empty_right = AdjacencyListStorage::new();
        for t in [1u32, 2, 3] {
            empty_left.add_edge(Edge { source: t, target: t });
            empty_right.add_edge(Edge { source: t, target: t });
        }
        empty_left.calculate_statistics();
        empty_right.calculate_statistics();
        corpus.insert_graphstorage(Component::new(ComponentType::LeftToken, ANNIS_NS, ""), GraphStorage::AdjacencyList(empty_left));
        corpus.insert_graphstorage(Component::new(ComponentType::RightToken, ANNIS_NS, ""), GraphStorage::AdjacencyList(empty_right));

        let op = Inclusion::new(&corpus).unwrap();
        // NORM1's anchor now falls back to itself, which is not on the Ordering chain.
        assert!(!op.filter_match(&Match::new(S1, Annotation::default()), &Match::new(NORM1, Annotation::default())));
    }

    #[test]
    fn is_not_reflexive() {
        let corpus = build_corpus();
        let op = Inclusion::new(&corpus).unwrap();
        assert!(!op.is_reflexive());
    }
}
