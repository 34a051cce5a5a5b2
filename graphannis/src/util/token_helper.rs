use crate::corpus::Corpus;
use graphannis_core::graph::registry::GraphStorage;
use graphannis_core::graph::ReadableGraphStorage;
use graphannis_core::types::{
    AnnoKey, Component, ComponentType, NodeID, ANNIS_NS, COVERAGE_COMPONENT, LEFT_TOKEN_COMPONENT,
    RIGHT_TOKEN_COMPONENT, TOK,
};
use std::sync::Arc;

/// Resolves the left-/right-most covered token for any node, and whether a
/// node is itself a token. Grounded on the `LeftToken`/`RightToken`/`Coverage`
/// components maintained alongside every corpus (spec.md §2 "derived
/// components").
#[derive(Clone)]
pub struct TokenHelper {
    left_edges: Arc<GraphStorage>,
    right_edges: Arc<GraphStorage>,
    cov_edges: Arc<GraphStorage>,
    tok_key: AnnoKey,
}

pub fn necessary_components() -> Vec<Component> {
    vec![
        LEFT_TOKEN_COMPONENT.clone(),
        RIGHT_TOKEN_COMPONENT.clone(),
        COVERAGE_COMPONENT.clone(),
    ]
}

impl TokenHelper {
    pub fn new(corpus: &Corpus) -> Option<TokenHelper> {
        let left_edges = corpus.get_graphstorage(&LEFT_TOKEN_COMPONENT)?;
        let right_edges = corpus.get_graphstorage(&RIGHT_TOKEN_COMPONENT)?;
        let cov_edges = corpus.get_graphstorage(&COVERAGE_COMPONENT)?;
        let tok_key = AnnoKey {
            name: corpus.strings.find_id(TOK)?,
            ns: corpus.strings.find_id(ANNIS_NS)?,
        };
        Some(TokenHelper {
            left_edges,
            right_edges,
            cov_edges,
            tok_key,
        })
    }

    /// A node is a token iff it carries the `tok` annotation and covers no
    /// other node (a structural node with a `tok` value would be unusual, but
    /// the coverage check keeps this robust against such data).
    pub fn is_token(&self, corpus: &Corpus, node: NodeID) -> bool {
        corpus
            .node_annos
            .get_value_for_item(&node, &self.tok_key)
            .is_some()
            && self.covers_nothing(node)
    }

    /// Whether `node` has no outgoing Coverage edge. Every token satisfies
    /// this; it is also the only part of [`is_token`](Self::is_token) an
    /// operator bound without a live `Corpus` handle can still check.
    pub fn covers_nothing(&self, node: NodeID) -> bool {
        self.cov_edges.get_outgoing_edges(node).next().is_none()
    }

    pub fn left_token_for(&self, node: NodeID) -> Option<NodeID> {
        self.left_edges.get_outgoing_edges(node).next().or(Some(node))
    }

    pub fn right_token_for(&self, node: NodeID) -> Option<NodeID> {
        self.right_edges.get_outgoing_edges(node).next().or(Some(node))
    }

    pub fn covered_token(&self, node: NodeID) -> Vec<NodeID> {
        self.cov_edges.find_connected(node, 1, 1).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn necessary_components_cover_token_anchors() {
        let comps = necessary_components();
        assert!(comps.iter().any(|c| c.ctype == ComponentType::LeftToken));
        assert!(comps.iter().any(|c| c.ctype == ComponentType::RightToken));
        assert!(comps.iter().any(|c| c.ctype == ComponentType::Coverage));
    }
}
