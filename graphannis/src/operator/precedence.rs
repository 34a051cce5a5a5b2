use super::{EstimationType, Operator, OperatorSpec};
use crate::corpus::Corpus;
use crate::util::token_helper::{self, TokenHelper};
use crate::util::RangeSpec;
use graphannis_core::graph::registry::GraphStorage;
use graphannis_core::graph::{EdgeContainer, ReadableGraphStorage};
use graphannis_core::types::{
    Annotation, Component, ComponentType, Edge, Match, NodeID, ANNIS_NS, LEFT_TOKEN_COMPONENT,
};
use rustc_hash::FxHashMap;
use std::fmt;
use std::sync::Arc;

/// `. min,max` — LHS' right anchor token, stepped `[min,max]` along the
/// Ordering component, must equal RHS' left anchor token (spec.md §4.4,
/// directional only).
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub struct PrecedenceSpec {
    pub segmentation: Option<String>,
    pub dist: RangeSpec,
}

impl OperatorSpec for PrecedenceSpec {
    fn necessary_components(&self, _corpus: &Corpus) -> Vec<Component> {
        let mut v = vec![order_component(&self.segmentation), LEFT_TOKEN_COMPONENT.clone()];
        v.extend(token_helper::necessary_components());
        v
    }

    fn create_operator(&self, corpus: &Corpus) -> Option<Box<dyn Operator>> {
        Precedence::new(corpus, self.clone()).map(|op| Box::new(op) as Box<dyn Operator>)
    }
}

fn order_component(segmentation: &Option<String>) -> Component {
    Component::new(ComponentType::Ordering, ANNIS_NS, segmentation.clone().unwrap_or_default())
}

pub struct Precedence {
    gs_order: Arc<GraphStorage>,
    tok_helper: TokenHelper,
    spec: PrecedenceSpec,
    /// `token -> every node whose left anchor is that token`, built once at
    /// bind time since graph storages only expose forward (node -> anchor)
    /// edges, not an ingoing-edge lookup (core::graph has no inverse API).
    left_aligned: FxHashMap<NodeID, Vec<NodeID>>,
}

impl Precedence {
    pub fn new(corpus: &Corpus, spec: PrecedenceSpec) -> Option<Precedence> {
        let gs_order = corpus.get_graphstorage(&order_component(&spec.segmentation))?;
        let gs_left = corpus.get_graphstorage(&LEFT_TOKEN_COMPONENT)?;
        let tok_helper = TokenHelper::new(corpus)?;

        let mut left_aligned: FxHashMap<NodeID, Vec<NodeID>> = FxHashMap::default();
        for source in gs_left.source_nodes() {
            if let Some(anchor) = gs_left.get_outgoing_edges(source).next() {
                left_aligned.entry(anchor).or_default().push(source);
            }
        }

        Some(Precedence {
            gs_order,
            tok_helper,
            spec,
            left_aligned,
        })
    }
}

impl fmt::Display for PrecedenceSpec {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.dist)
    }
}

impl fmt::Display for Precedence {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, ".{}", self.spec.dist)
    }
}

impl Operator for Precedence {
    fn retrieve_matches<'a>(&'a self, lhs: &Match) -> Box<dyn Iterator<Item = Match> + 'a> {
        let start = match self.tok_helper.right_token_for(lhs.node) {
            Some(t) => t,
            None => return Box::new(std::iter::empty()),
        };
        let (min, max) = (self.spec.dist.min_dist(), self.spec.dist.max_dist());
        let left_aligned = &self.left_aligned;
        let it = self.gs_order.find_connected(start, min, max).flat_map(move |t| {
            std::iter::once(t).chain(left_aligned.get(&t).into_iter().flatten().copied())
        });
        Box::new(it.map(|n| Match::new(n, Annotation::default())))
    }

    fn filter_match(&self, lhs: &Match, rhs: &Match) -> bool {
        let start = self.tok_helper.right_token_for(lhs.node);
        let end = self.tok_helper.left_token_for(rhs.node);
        match (start, end) {
            (Some(start), Some(end)) => {
                let edge = Edge { source: start, target: end };
                self.gs_order.is_connected(&edge, self.spec.dist.min_dist(), self.spec.dist.max_dist())
            }
            _ => false,
        }
    }

    fn is_reflexive(&self) -> bool {
        false
    }

    fn estimation_type(&self) -> EstimationType {
        match self.gs_order.stats() {
            Some(stats) if stats.avg_fan_out > 0.0 => {
                let (min, max) = (self.spec.dist.min_dist(), self.spec.dist.max_dist().min(stats.max_depth));
                let span = (max.saturating_sub(min) + 1) as f64;
                EstimationType::Selectivity((span / stats.avg_fan_out).min(1.0))
            }
            _ => EstimationType::Selectivity(0.1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::Corpus;
    use graphannis_core::graph::registry::GraphStorage;
    use graphannis_core::graph::WriteableGraphStorage;
    use graphannis_core::graph::adjacencylist::AdjacencyListStorage;
    use graphannis_core::types::{AnnoKey, Annotation as CoreAnnotation, Edge, TOK};

    #[test]
    fn display_matches_operator_syntax() {
        let spec = PrecedenceSpec {
            segmentation: None,
            dist: RangeSpec::bounded(2, 10),
        };
        assert_eq!(format!("{}", spec), "2,10");
    }

    /// `tok1 -> tok2 -> tok3`, three token-anchored-to-itself nodes, the
    /// fixture spec.md §8 scenario 5 runs `tok .2,10 tok` against.
    fn three_token_chain() -> Corpus {
        let mut corpus = Corpus::new();
        let tok_key = AnnoKey { name: corpus.strings.add(TOK), ns: corpus.strings.add(ANNIS_NS) };
        for (n, text) in [(1u32, "the"), (2, "Bilharziose"), (3, ".")] {
            let v = corpus.strings.add(text);
            corpus.node_annos.insert(n, CoreAnnotation { key: tok_key, val: v });
        }

        let mut ordering = AdjacencyListStorage::new();
        ordering.add_edge(Edge { source: 1, target: 2 });
        ordering.add_edge(Edge { source: 2, target: 3 });
        ordering.calculate_statistics();
        corpus.insert_graphstorage(Component::new(ComponentType::Ordering, ANNIS_NS, ""), GraphStorage::AdjacencyList(ordering));

        let mut anchors = AdjacencyListStorage::new();
        for t in [1u32, 2, 3] {
            anchors.add_edge(Edge { source: t, target: t });
        }
        anchors.calculate_statistics();
        corpus.insert_graphstorage(Component::new(ComponentType::LeftToken, ANNIS_NS, ""), GraphStorage::AdjacencyList(anchors.clone()));
        corpus.insert_graphstorage(Component::new(ComponentType::RightToken, ANNIS_NS, ""), GraphStorage::AdjacencyList(anchors));
        corpus.insert_graphstorage(Component::new(ComponentType::Coverage, ANNIS_NS, ""), GraphStorage::AdjacencyList(AdjacencyListStorage::new()));
        corpus
    }

    #[test]
    fn pairwise_distances_within_two_to_ten_match_scenario_five() {
        let corpus = three_token_chain();
        let op = Precedence::new(
            &corpus,
            PrecedenceSpec { segmentation: None, dist: RangeSpec::bounded(2, 10) },
        )
        .unwrap();

        // pairwise distances among {1,2,3} are {1,1,2}; only (1,3) at distance 2 qualifies.
        let mut matching_pairs = 0;
        for lhs in [1u32, 2, 3] {
            for rhs in [1u32, 2, 3] {
                if op.filter_match(&Match::new(lhs, Annotation::default()), &Match::new(rhs, Annotation::default())) {
                    matching_pairs += 1;
                }
            }
        }
        assert_eq!(matching_pairs, 1);
    }

    #[test]
    fn retrieve_matches_is_empty_past_chain_end() {
        let corpus = three_token_chain();
        let op = Precedence::new(&corpus, PrecedenceSpec { segmentation: None, dist: RangeSpec::bounded(1, 1) }).unwrap();
        let matches: Vec<_> = op.retrieve_matches(&Match::new(3, Annotation::default())).collect();
        assert!(matches.is_empty());
    }
}
