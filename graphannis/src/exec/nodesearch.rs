use crate::corpus::Corpus;
use crate::plan::{CostEstimate, Desc, ExecutionNode, NodeConstraint, NodeSearchDesc};
use graphannis_core::annostorage::{AnnotationStorage, NodeAnnotationSearch};
use graphannis_core::types::{Annotation, AnnoKey, Match, MatchGroup, NodeID, ANNIS_NS, NODE_NAME, TOK};
use rustc_hash::FxHashMap;

/// The node predicate half of a query node (spec.md §6 `NodeSpec`). `Any`
/// realises an unconstrained node; `AnyToken` realises `{ token: true }`.
/// `val: None` on `ExactValue` is a key-only presence check (`name` without
/// `="value"`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NodeSearchSpec {
    ExactValue {
        ns: Option<String>,
        name: String,
        val: Option<String>,
    },
    RegexValue {
        ns: Option<String>,
        name: String,
        val: String,
    },
    AnyToken,
    Any,
}

impl std::fmt::Display for NodeSearchSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            NodeSearchSpec::ExactValue { name, val: Some(v), .. } => write!(f, "{}=\"{}\"", name, v),
            NodeSearchSpec::ExactValue { name, val: None, .. } => write!(f, "{}", name),
            NodeSearchSpec::RegexValue { name, val, .. } => write!(f, "{}=/{}/", name, val),
            NodeSearchSpec::AnyToken => write!(f, "tok"),
            NodeSearchSpec::Any => write!(f, "node"),
        }
    }
}

impl NodeSearchSpec {
    fn key_parts(&self, corpus: &Corpus) -> Option<(Option<u32>, u32)> {
        let (ns, name) = match self {
            NodeSearchSpec::ExactValue { ns, name, .. } => (ns.as_deref(), name.as_str()),
            NodeSearchSpec::RegexValue { ns, name, .. } => (ns.as_deref(), name.as_str()),
            NodeSearchSpec::AnyToken => (Some(ANNIS_NS), TOK),
            NodeSearchSpec::Any => (Some(ANNIS_NS), NODE_NAME),
        };
        let name_id = corpus.strings.find_id(name)?;
        let ns_id = match ns {
            Some(ns) => Some(corpus.strings.find_id(ns)?),
            None => None,
        };
        Some((ns_id, name_id))
    }

    /// The per-candidate re-check descriptor a seed-index join uses instead
    /// of re-running a full annotation-index scan (spec.md §4.6 "seed-index").
    pub fn node_search_desc(&self, corpus: &Corpus) -> NodeSearchDesc {
        let qname = self.key_parts(corpus);
        let constraint = match (self, qname) {
            (_, None) => NodeConstraint::ValueIn(Default::default()),
            (NodeSearchSpec::ExactValue { val: None, .. }, Some(_)) => NodeConstraint::Any,
            (NodeSearchSpec::ExactValue { val: Some(v), .. }, Some(_)) => {
                NodeConstraint::ExactValue(corpus.strings.find_id(v))
            }
            (NodeSearchSpec::RegexValue { val, .. }, Some(_)) => {
                NodeConstraint::ValueIn(corpus.strings.find_regex(val).into_iter().collect())
            }
            (NodeSearchSpec::AnyToken, Some(_)) => NodeConstraint::Any,
            (NodeSearchSpec::Any, Some(_)) => NodeConstraint::Any,
        };
        NodeSearchDesc { qname, constraint }
    }

    /// Every annotation of `node` that satisfies this predicate (spec.md §4.6
    /// seed-index `match_generator`). An unconstrained node search never
    /// fails this check; it reports a wildcard annotation since there is no
    /// specific key/value the match is "about".
    pub fn matches(&self, corpus: &Corpus, node: NodeID) -> Vec<Annotation> {
        let desc = self.node_search_desc(corpus);
        let (ns, name) = match desc.qname {
            Some(q) => q,
            None => return Vec::new(),
        };
        match desc.constraint {
            NodeConstraint::Any if matches!(self, NodeSearchSpec::Any) => {
                if corpus.node_annos.get_annotations_for_item(&node).is_empty() {
                    Vec::new()
                } else {
                    vec![Annotation::default()]
                }
            }
            NodeConstraint::Any => match_key_presence(corpus, node, ns, name),
            NodeConstraint::ExactValue(Some(val)) => {
                match_key_value(corpus, node, ns, name, |v| v == val)
            }
            NodeConstraint::ExactValue(None) => Vec::new(),
            NodeConstraint::ValueIn(ref set) => {
                match_key_value(corpus, node, ns, name, |v| set.contains(&v))
            }
        }
    }

    fn guess_count(&self, corpus: &Corpus) -> usize {
        let (ns, name) = match self.key_parts(corpus) {
            Some(q) => q,
            None => return 0,
        };
        match self {
            NodeSearchSpec::ExactValue { val: None, .. }
            | NodeSearchSpec::AnyToken
            | NodeSearchSpec::Any => corpus.node_annos.num_of_annotations(ns, name),
            NodeSearchSpec::ExactValue { val: Some(v), .. } => {
                corpus.node_annos.guess_max_count(ns, name, v, v)
            }
            NodeSearchSpec::RegexValue { val, .. } => {
                corpus.node_annos.guess_max_count_regex(ns, name, val)
            }
        }
    }
}

fn match_key_presence(corpus: &Corpus, node: NodeID, ns: Option<u32>, name: u32) -> Vec<Annotation> {
    corpus
        .node_annos
        .get_annotations_for_item(&node)
        .into_iter()
        .filter(|a| a.key.name == name && ns.map_or(true, |n| a.key.ns == n))
        .collect()
}

fn match_key_value(
    corpus: &Corpus,
    node: NodeID,
    ns: Option<u32>,
    name: u32,
    accept: impl Fn(u32) -> bool,
) -> Vec<Annotation> {
    match ns {
        Some(ns) => {
            let key = AnnoKey { name, ns };
            match corpus.node_annos.get_value_for_item(&node, &key) {
                Some(val) if accept(val) => vec![Annotation { key, val }],
                _ => Vec::new(),
            }
        }
        None => corpus
            .node_annos
            .get_annotations_for_item(&node)
            .into_iter()
            .filter(|a| a.key.name == name && accept(a.val))
            .collect(),
    }
}

/// A base execution leaf: the lazily-evaluated annotation-index search for
/// one query node (spec.md §3 "leaves are node specs materialised as
/// annotation-search iterators").
pub struct NodeSearch<'a> {
    it: Box<dyn Iterator<Item = Match> + 'a>,
    desc: Desc,
    search_desc: NodeSearchDesc,
}

impl<'a> NodeSearch<'a> {
    pub fn new(corpus: &'a Corpus, node_nr: usize, spec: &NodeSearchSpec) -> NodeSearch<'a> {
        let search_desc = spec.node_search_desc(corpus);
        let it: Box<dyn Iterator<Item = Match> + 'a> = match (spec, search_desc.qname) {
            (_, None) => Box::new(std::iter::empty()),
            (NodeSearchSpec::RegexValue { val, .. }, Some((ns, name))) => {
                corpus.node_annos.regex_anno_search(&corpus.strings, ns, name, val)
            }
            (_, Some((ns, name))) => {
                let val = match &search_desc.constraint {
                    NodeConstraint::ExactValue(v) => *v,
                    _ => None,
                };
                corpus.node_annos.exact_anno_search(ns, name, val)
            }
        };

        let output = spec.guess_count(corpus).max(1);
        let mut node_pos = FxHashMap::default();
        node_pos.insert(0, node_nr);
        let desc = Desc {
            component_nr: node_nr,
            lhs: None,
            rhs: None,
            node_pos,
            impl_description: "base".to_string(),
            query_fragment: format!("#{} {}", node_nr, spec),
            cost: Some(CostEstimate {
                output,
                processed_in_step: output,
                intermediate_sum: output,
            }),
        };

        NodeSearch { it, desc, search_desc }
    }
}

impl<'a> Iterator for NodeSearch<'a> {
    type Item = MatchGroup;

    fn next(&mut self) -> Option<MatchGroup> {
        self.it.next().map(|m| vec![m])
    }
}

impl<'a> ExecutionNode for NodeSearch<'a> {
    fn get_desc(&self) -> Option<&Desc> {
        Some(&self.desc)
    }

    fn as_nodesearch(&self) -> Option<&dyn crate::plan::NodeSearch> {
        Some(self)
    }
}

impl<'a> crate::plan::NodeSearch for NodeSearch<'a> {
    fn node_search_desc(&self) -> &NodeSearchDesc {
        &self.search_desc
    }
}
