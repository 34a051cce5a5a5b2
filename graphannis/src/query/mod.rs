pub mod conjunction;

use crate::exec::nodesearch::NodeSearchSpec;
use crate::operator::EdgeAnnoSearchSpec;
use crate::util::RangeSpec;
use rustc_hash::FxHashMap;
use serde_derive::Deserialize;

/// How an annotation or span-text value predicate is matched (spec.md §6
/// `NodeSpec`). A `Regex` value with no meta-characters that compiles
/// successfully is promoted to `Exact` by [`conjunction::Conjunction`]
/// (spec.md §6 "promoted to exact-equal").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValueMatching {
    ExactEqual,
    RegexpEqual,
}

/// One `(ns?, name, value?, matching)` annotation predicate of a `NodeSpec`'s
/// `annotations` list.
#[derive(Debug, Clone, Deserialize)]
pub struct AnnotationSearch {
    pub ns: Option<String>,
    pub name: String,
    pub value: Option<String>,
    pub matching: ValueMatching,
}

/// A query node's predicate, the natural `serde::Deserialize` target of the
/// JSON intermediate form (spec.md §6; no parser ships in this crate, only
/// the shape it would deserialise into).
///
/// `annotations` with more than one entry is a conjunction of predicates on
/// the same node: the first entry seeds the annotation-index search, the
/// rest are re-checked as an additional filter over the seeded candidates
/// (simplification — the source's `jsonqueryparser` builds a dedicated
/// multi-key index lookup instead, out of scope here).
///
/// `span_text` (a query node matching the exact text covered by a possibly
/// multi-token span) is accepted for JSON-shape fidelity but is resolved as
/// an exact `tok` annotation match, which only covers the common single-token
/// case; multi-token span-text search is not implemented (see DESIGN.md).
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum NodeSpec {
    Annotations { annotations: Vec<AnnotationSearch> },
    SpanText { span_text: String, span_text_matching: ValueMatching },
    Token { token: bool },
    Any {},
}

/// A binary relation between two query nodes (spec.md §6 `JoinSpec`).
/// `min_distance`/`max_distance` default to `1`/`1`; `0/0` on an edge
/// operator is rewritten to unbounded (§6 "min = max = 0 denotes unbounded").
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "op")]
pub enum JoinSpec {
    Precedence {
        left: usize,
        right: usize,
        segmentation: Option<String>,
        min_distance: Option<usize>,
        max_distance: Option<usize>,
    },
    Inclusion {
        left: usize,
        right: usize,
    },
    Overlap {
        left: usize,
        right: usize,
    },
    IdenticalCoverage {
        left: usize,
        right: usize,
    },
    IdenticalNode {
        left: usize,
        right: usize,
    },
    Dominance {
        left: usize,
        right: usize,
        name: Option<String>,
        min_distance: Option<usize>,
        max_distance: Option<usize>,
        edge_annotations: Option<EdgeAnnoSearchSpec>,
        force_nested_loop: Option<bool>,
    },
    Pointing {
        left: usize,
        right: usize,
        name: Option<String>,
        min_distance: Option<usize>,
        max_distance: Option<usize>,
        edge_annotations: Option<EdgeAnnoSearchSpec>,
        force_nested_loop: Option<bool>,
    },
    PartOfSubCorpus {
        left: usize,
        right: usize,
    },
}

impl JoinSpec {
    pub fn left(&self) -> usize {
        match self {
            JoinSpec::Precedence { left, .. }
            | JoinSpec::Inclusion { left, .. }
            | JoinSpec::Overlap { left, .. }
            | JoinSpec::IdenticalCoverage { left, .. }
            | JoinSpec::IdenticalNode { left, .. }
            | JoinSpec::Dominance { left, .. }
            | JoinSpec::Pointing { left, .. }
            | JoinSpec::PartOfSubCorpus { left, .. } => *left,
        }
    }

    pub fn right(&self) -> usize {
        match self {
            JoinSpec::Precedence { right, .. }
            | JoinSpec::Inclusion { right, .. }
            | JoinSpec::Overlap { right, .. }
            | JoinSpec::IdenticalCoverage { right, .. }
            | JoinSpec::IdenticalNode { right, .. }
            | JoinSpec::Dominance { right, .. }
            | JoinSpec::Pointing { right, .. }
            | JoinSpec::PartOfSubCorpus { right, .. } => *right,
        }
    }

    pub fn force_nested_loop(&self) -> bool {
        match self {
            JoinSpec::Dominance { force_nested_loop, .. } | JoinSpec::Pointing { force_nested_loop, .. } => {
                force_nested_loop.unwrap_or(false)
            }
            _ => false,
        }
    }
}

/// One query alternative: a disjoint set of nodes plus the joins connecting
/// them (spec.md §6 "a tree of alternatives; this core accepts one
/// alternative").
#[derive(Debug, Clone, Deserialize)]
pub struct Query {
    pub nodes: FxHashMap<usize, NodeSpec>,
    pub joins: Vec<JoinSpec>,
}

/// A plain `(min, max)` distance pair, defaulting to `1,1` (spec.md §6); used
/// for `Precedence`, the one operator the Open Questions note the `0,0`
/// rewrite is *not* clearly specified for.
pub(crate) fn plain_distance(min: Option<usize>, max: Option<usize>) -> RangeSpec {
    RangeSpec::bounded(min.unwrap_or(1), max.unwrap_or(1))
}

/// Rewrites a `(min, max)` edge-operator distance pair per spec.md §6: `0,0`
/// means unbounded, not "distance exactly zero". Resolved Open Question:
/// applied to `Dominance`/`Pointing` only, the two operators the source
/// clearly rewrites this way (see DESIGN.md).
pub(crate) fn edge_distance(min: Option<usize>, max: Option<usize>) -> RangeSpec {
    let min = min.unwrap_or(1);
    let max = max.unwrap_or(1);
    if min == 0 && max == 0 {
        RangeSpec::unbounded(1)
    } else {
        RangeSpec::bounded(min, max)
    }
}

pub(crate) fn node_spec_to_search_spec(spec: &NodeSpec) -> NodeSearchSpec {
    match spec {
        NodeSpec::Any {} => NodeSearchSpec::Any,
        NodeSpec::Token { token: true } => NodeSearchSpec::AnyToken,
        NodeSpec::Token { token: false } => NodeSearchSpec::Any,
        NodeSpec::SpanText { span_text, span_text_matching } => annotation_to_search_spec(&AnnotationSearch {
            ns: Some(graphannis_core::types::ANNIS_NS.to_string()),
            name: graphannis_core::types::TOK.to_string(),
            value: Some(span_text.clone()),
            matching: *span_text_matching,
        }),
        NodeSpec::Annotations { annotations } if annotations.is_empty() => NodeSearchSpec::Any,
        NodeSpec::Annotations { annotations } => annotation_to_search_spec(&annotations[0]),
    }
}

fn annotation_to_search_spec(a: &AnnotationSearch) -> NodeSearchSpec {
    match (a.matching, &a.value) {
        (ValueMatching::ExactEqual, val) => NodeSearchSpec::ExactValue {
            ns: a.ns.clone(),
            name: a.name.clone(),
            val: val.clone(),
        },
        (ValueMatching::RegexpEqual, Some(val)) => {
            if let Some(exact) = promote_regex_to_exact(val) {
                NodeSearchSpec::ExactValue {
                    ns: a.ns.clone(),
                    name: a.name.clone(),
                    val: Some(exact),
                }
            } else {
                NodeSearchSpec::RegexValue {
                    ns: a.ns.clone(),
                    name: a.name.clone(),
                    val: val.clone(),
                }
            }
        }
        (ValueMatching::RegexpEqual, None) => NodeSearchSpec::ExactValue {
            ns: a.ns.clone(),
            name: a.name.clone(),
            val: None,
        },
    }
}

/// A regex containing no meta-characters and compiling successfully is
/// equivalent to an exact match (spec.md §6); promoting it avoids the
/// narrowed-prefix-range machinery of [`crate::exec::nodesearch`] for the
/// common `="literal"` case.
fn promote_regex_to_exact(pattern: &str) -> Option<String> {
    const META: &[char] = &[
        '\\', '.', '+', '*', '?', '(', ')', '|', '[', ']', '{', '}', '^', '$',
    ];
    if pattern.chars().any(|c| META.contains(&c)) {
        return None;
    }
    if regex::Regex::new(pattern).is_err() {
        return None;
    }
    Some(pattern.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_zero_distance_means_unbounded() {
        let r = edge_distance(Some(0), Some(0));
        assert_eq!(r.min_dist(), 1);
        assert_eq!(r.max_dist(), usize::MAX);
    }

    #[test]
    fn default_distance_is_one_to_one() {
        let r = edge_distance(None, None);
        assert_eq!(r.min_dist(), 1);
        assert_eq!(r.max_dist(), 1);
    }

    #[test]
    fn literal_regex_promotes_to_exact() {
        let spec = annotation_to_search_spec(&AnnotationSearch {
            ns: None,
            name: "pos".into(),
            value: Some("NN".into()),
            matching: ValueMatching::RegexpEqual,
        });
        assert_eq!(
            spec,
            NodeSearchSpec::ExactValue { ns: None, name: "pos".into(), val: Some("NN".into()) }
        );
    }

    #[test]
    fn meta_character_regex_stays_a_regex() {
        let spec = annotation_to_search_spec(&AnnotationSearch {
            ns: None,
            name: "pos".into(),
            value: Some("NN.*".into()),
            matching: ValueMatching::RegexpEqual,
        });
        assert_eq!(
            spec,
            NodeSearchSpec::RegexValue { ns: None, name: "pos".into(), val: "NN.*".into() }
        );
    }
}
