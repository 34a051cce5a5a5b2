use super::{EdgeAnnoSearchSpec, EstimationType, Operator, OperatorSpec};
use crate::corpus::Corpus;
use crate::util::RangeSpec;
use graphannis_core::graph::registry::GraphStorage;
use graphannis_core::graph::ReadableGraphStorage;
use graphannis_core::types::{Annotation, Component, ComponentType, Edge, Match, NodeID, ANNIS_NS};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// Shared implementation behind every component-based binary operator
/// (`Dominance`, `Pointing`, `PartOfSubCorpus`): a list of components is
/// loaded once at bind time, then `find_connected`/`is_connected` are
/// delegated to each of them in turn, deduplicating across components in the
/// (rare) case a query spans several same-type components (§4.2).
#[derive(Clone, Debug)]
pub struct BaseEdgeOpSpec {
    pub components: Vec<Component>,
    pub dist: RangeSpec,
    pub edge_anno: Option<EdgeAnnoSearchSpec>,
    pub is_reflexive: bool,
    pub op_str: &'static str,
}

pub struct BaseEdgeOp {
    gs: Vec<Arc<GraphStorage>>,
    spec: BaseEdgeOpSpec,
    anno_filter: AnnoFilter,
    inverse: bool,
}

impl BaseEdgeOp {
    pub fn new(corpus: &Corpus, spec: BaseEdgeOpSpec) -> Option<BaseEdgeOp> {
        let mut gs = Vec::new();
        for c in &spec.components {
            gs.push(corpus.get_graphstorage(c)?);
        }
        let anno_filter = AnnoFilter::resolve(corpus, &spec.edge_anno);
        Some(BaseEdgeOp {
            gs,
            spec,
            anno_filter,
            inverse: false,
        })
    }
}

/// `edge_anno`, resolved once against a corpus's interned strings at bind
/// time rather than re-resolved on every candidate edge.
#[derive(Clone)]
enum AnnoFilter {
    Any,
    /// The predicate names a namespace/name/value that was never interned,
    /// so it can never match (the engine-wide degrade-to-empty policy).
    Never,
    Exact { name: u32, ns: Option<u32>, val: Option<u32> },
    NotExact { name: u32, ns: Option<u32>, val: u32 },
    Regex { name: u32, ns: Option<u32>, matching: HashSet<u32> },
    NotRegex { name: u32, ns: Option<u32>, matching: HashSet<u32> },
}

impl AnnoFilter {
    fn resolve(corpus: &Corpus, spec: &Option<EdgeAnnoSearchSpec>) -> AnnoFilter {
        let spec = match spec {
            Some(s) => s,
            None => return AnnoFilter::Any,
        };
        match spec {
            EdgeAnnoSearchSpec::ExactValue { ns, name, val } => {
                let name = match resolve(corpus, name) {
                    Some(n) => n,
                    None => return AnnoFilter::Never,
                };
                let ns = match ns.as_deref() {
                    Some(n) => match resolve(corpus, n) {
                        Some(id) => Some(id),
                        None => return AnnoFilter::Never,
                    },
                    None => None,
                };
                let val = match val {
                    Some(v) => match resolve(corpus, v) {
                        Some(id) => Some(id),
                        None => return AnnoFilter::Never,
                    },
                    None => None,
                };
                AnnoFilter::Exact { name, ns, val }
            }
            EdgeAnnoSearchSpec::NotExactValue { ns, name, val } => {
                let name = match resolve(corpus, name) {
                    Some(n) => n,
                    None => return AnnoFilter::Never,
                };
                let ns = ns.as_deref().and_then(|n| resolve(corpus, n));
                let val = match resolve(corpus, val) {
                    Some(v) => v,
                    // an uninterned value is never equal to any real value,
                    // so the "not equal" predicate is trivially satisfied
                    None => return AnnoFilter::Exact { name, ns, val: None },
                };
                AnnoFilter::NotExact { name, ns, val }
            }
            EdgeAnnoSearchSpec::RegexValue { ns, name, val } => {
                let name = match resolve(corpus, name) {
                    Some(n) => n,
                    None => return AnnoFilter::Never,
                };
                let ns = ns.as_deref().and_then(|n| resolve(corpus, n));
                AnnoFilter::Regex { name, ns, matching: corpus.strings.find_regex(val) }
            }
            EdgeAnnoSearchSpec::NotRegexValue { ns, name, val } => {
                let name = match resolve(corpus, name) {
                    Some(n) => n,
                    None => return AnnoFilter::Never,
                };
                let ns = ns.as_deref().and_then(|n| resolve(corpus, n));
                AnnoFilter::NotRegex { name, ns, matching: corpus.strings.find_regex(val) }
            }
        }
    }

    fn matches(&self, annos: &[Annotation]) -> bool {
        match self {
            AnnoFilter::Any => true,
            AnnoFilter::Never => false,
            AnnoFilter::Exact { name, ns, val } => annos.iter().any(|a| {
                a.key.name == *name && ns.map_or(true, |n| a.key.ns == n) && val.map_or(true, |v| a.val == v)
            }),
            AnnoFilter::NotExact { name, ns, val } => annos.iter().any(|a| {
                a.key.name == *name && ns.map_or(true, |n| a.key.ns == n) && a.val != *val
            }),
            AnnoFilter::Regex { name, ns, matching } => annos.iter().any(|a| {
                a.key.name == *name && ns.map_or(true, |n| a.key.ns == n) && matching.contains(&a.val)
            }),
            AnnoFilter::NotRegex { name, ns, matching } => annos.iter().any(|a| {
                a.key.name == *name && ns.map_or(true, |n| a.key.ns == n) && !matching.contains(&a.val)
            }),
        }
    }
}

impl OperatorSpec for BaseEdgeOpSpec {
    fn necessary_components(&self, _corpus: &Corpus) -> Vec<Component> {
        self.components.clone()
    }

    fn create_operator(&self, corpus: &Corpus) -> Option<Box<dyn Operator>> {
        BaseEdgeOp::new(corpus, self.clone()).map(|op| Box::new(op) as Box<dyn Operator>)
    }

    fn get_edge_anno_spec(&self) -> Option<EdgeAnnoSearchSpec> {
        self.edge_anno.clone()
    }
}

fn resolve(corpus: &Corpus, s: &str) -> Option<u32> {
    corpus.strings.find_id(s)
}

impl fmt::Display for BaseEdgeOp {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let anno_frag = match &self.spec.edge_anno {
            Some(a) => format!("[{}]", a),
            None => String::new(),
        };
        if self.inverse {
            write!(f, "{}{}{} (inverse)", self.spec.op_str, self.spec.dist, anno_frag)
        } else {
            write!(f, "{}{}{}", self.spec.op_str, self.spec.dist, anno_frag)
        }
    }
}

impl Operator for BaseEdgeOp {
    fn retrieve_matches<'a>(&'a self, lhs: &Match) -> Box<dyn Iterator<Item = Match> + 'a> {
        let (min, max) = (self.spec.dist.min_dist(), self.spec.dist.max_dist());
        let lhs_node = lhs.node;
        let mut seen = HashSet::new();
        let mut result: Vec<NodeID> = Vec::new();
        for g in &self.gs {
            let candidates: Vec<NodeID> = if self.inverse {
                g.source_nodes()
                    .filter(|&s| g.is_connected(&Edge { source: s, target: lhs_node }, min, max))
                    .collect()
            } else {
                g.find_connected(lhs_node, min, max).collect()
            };
            for c in candidates {
                let edge = if self.inverse {
                    Edge { source: c, target: lhs_node }
                } else {
                    Edge { source: lhs_node, target: c }
                };
                if !seen.contains(&c) && self.anno_filter.matches(&g.get_edge_annotations(&edge)) {
                    seen.insert(c);
                    result.push(c);
                }
            }
        }
        Box::new(result.into_iter().map(|n| Match::new(n, Annotation::default())))
    }

    fn filter_match(&self, lhs: &Match, rhs: &Match) -> bool {
        for g in &self.gs {
            let edge = if self.inverse {
                Edge { source: rhs.node, target: lhs.node }
            } else {
                Edge { source: lhs.node, target: rhs.node }
            };
            if g.is_connected(&edge, self.spec.dist.min_dist(), self.spec.dist.max_dist())
                && self.anno_filter.matches(&g.get_edge_annotations(&edge))
            {
                return true;
            }
        }
        false
    }

    fn is_reflexive(&self) -> bool {
        self.spec.is_reflexive
    }

    fn get_inverse_operator(&self) -> Option<Box<dyn Operator>> {
        Some(Box::new(BaseEdgeOp {
            gs: self.gs.clone(),
            spec: self.spec.clone(),
            anno_filter: self.anno_filter.clone(),
            inverse: !self.inverse,
        }))
    }

    fn estimation_type(&self) -> EstimationType {
        if self.gs.is_empty() {
            return EstimationType::Selectivity(0.0);
        }
        let mut worst: f64 = 0.0;
        for g in &self.gs {
            let sel = match g.stats() {
                Some(stats) if stats.cyclic => return EstimationType::Max,
                Some(stats) => {
                    let max_dist = self.spec.dist.max_dist().min(stats.max_depth).max(1) as i32;
                    let k = stats.avg_fan_out.max(1.01);
                    ((k.powi(max_dist) - 1.0) / (k - 1.0)).max(1.0) / (stats.nodes.max(1) as f64)
                }
                None => 0.01,
            };
            worst = worst.max(sel);
        }
        EstimationType::Selectivity(worst.min(1.0))
    }

    fn edge_anno_selectivity(&self) -> Option<f64> {
        self.spec.edge_anno.as_ref()?;
        Some(0.2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::Corpus;
    use graphannis_core::graph::WriteableGraphStorage;
    use graphannis_core::graph::adjacencylist::AdjacencyListStorage;

    const S1: NodeID = 1;
    const NP1: NodeID = 2;
    const NP2: NodeID = 3;

    /// `S1 -[func=subj]-> NP1`, `S1 -[func=obj]-> NP2`, a minimal dominance
    /// fixture for edge-annotation filtering (spec.md §4.4 "edge annotation ...
    /// must match on the traversed edge").
    fn build_corpus() -> Corpus {
        let mut corpus = Corpus::new();
        let func_key = graphannis_core::types::AnnoKey { name: corpus.strings.add("func"), ns: 0 };
        let subj = corpus.strings.add("subj");
        let obj = corpus.strings.add("obj");

        let mut dom = AdjacencyListStorage::new();
        dom.add_edge(Edge { source: S1, target: NP1 });
        dom.add_edge(Edge { source: S1, target: NP2 });
        dom.add_edge_annotation(Edge { source: S1, target: NP1 }, Annotation { key: func_key, val: subj });
        dom.add_edge_annotation(Edge { source: S1, target: NP2 }, Annotation { key: func_key, val: obj });
        dom.calculate_statistics();
        corpus.insert_graphstorage(Component::new(ComponentType::Dominance, ANNIS_NS, ""), GraphStorage::AdjacencyList(dom));
        corpus
    }

    fn dominance_op(corpus: &Corpus, edge_anno: Option<EdgeAnnoSearchSpec>) -> BaseEdgeOp {
        let base = BaseEdgeOpSpec {
            op_str: ">",
            components: vec![Component::new(ComponentType::Dominance, ANNIS_NS, "")],
            dist: crate::util::RangeSpec::bounded(1, 1),
            edge_anno,
            is_reflexive: true,
        };
        BaseEdgeOp::new(corpus, base).unwrap()
    }

    #[test]
    fn unfiltered_dominance_reaches_both_children() {
        let corpus = build_corpus();
        let op = dominance_op(&corpus, None);
        let found: Vec<NodeID> = op.retrieve_matches(&Match::new(S1, Annotation::default())).map(|m| m.node).collect();
        assert_eq!(found.len(), 2);
    }

    #[test]
    fn edge_annotation_filter_keeps_only_the_matching_child() {
        let corpus = build_corpus();
        let op = dominance_op(
            &corpus,
            Some(EdgeAnnoSearchSpec::ExactValue { ns: None, name: "func".into(), val: Some("subj".into()) }),
        );
        let found: Vec<NodeID> = op.retrieve_matches(&Match::new(S1, Annotation::default())).map(|m| m.node).collect();
        assert_eq!(found, vec![NP1]);
        assert!(op.filter_match(&Match::new(S1, Annotation::default()), &Match::new(NP1, Annotation::default())));
        assert!(!op.filter_match(&Match::new(S1, Annotation::default()), &Match::new(NP2, Annotation::default())));
    }

    #[test]
    fn edge_annotation_on_an_uninterned_value_never_matches() {
        let corpus = build_corpus();
        let op = dominance_op(
            &corpus,
            Some(EdgeAnnoSearchSpec::ExactValue { ns: None, name: "func".into(), val: Some("nonexistent".into()) }),
        );
        let found: Vec<NodeID> = op.retrieve_matches(&Match::new(S1, Annotation::default())).map(|m| m.node).collect();
        assert!(found.is_empty());
    }
}

#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub struct DominanceSpec {
    pub name: String,
    pub dist: RangeSpec,
    pub edge_anno: Option<EdgeAnnoSearchSpec>,
}

impl OperatorSpec for DominanceSpec {
    fn necessary_components(&self, corpus: &Corpus) -> Vec<Component> {
        all_components_of(corpus, ComponentType::Dominance, &self.name)
    }

    fn create_operator(&self, corpus: &Corpus) -> Option<Box<dyn Operator>> {
        let base = BaseEdgeOpSpec {
            op_str: ">",
            components: all_components_of(corpus, ComponentType::Dominance, &self.name),
            dist: self.dist,
            edge_anno: self.edge_anno.clone(),
            is_reflexive: true,
        };
        base.create_operator(corpus)
    }

    fn get_edge_anno_spec(&self) -> Option<EdgeAnnoSearchSpec> {
        self.edge_anno.clone()
    }
}

#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub struct PointingSpec {
    pub name: String,
    pub dist: RangeSpec,
    pub edge_anno: Option<EdgeAnnoSearchSpec>,
}

impl OperatorSpec for PointingSpec {
    fn necessary_components(&self, corpus: &Corpus) -> Vec<Component> {
        all_components_of(corpus, ComponentType::Pointing, &self.name)
    }

    fn create_operator(&self, corpus: &Corpus) -> Option<Box<dyn Operator>> {
        let base = BaseEdgeOpSpec {
            op_str: "->",
            components: all_components_of(corpus, ComponentType::Pointing, &self.name),
            dist: self.dist,
            edge_anno: self.edge_anno.clone(),
            is_reflexive: true,
        };
        base.create_operator(corpus)
    }

    fn get_edge_anno_spec(&self) -> Option<EdgeAnnoSearchSpec> {
        self.edge_anno.clone()
    }
}

/// `@` — the containment relation between a node and the (sub-)corpus it was
/// imported from (spec.md glossary "PartOfSubCorpus").
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub struct PartOfSubCorpusSpec {
    pub dist: RangeSpec,
}

impl OperatorSpec for PartOfSubCorpusSpec {
    fn necessary_components(&self, _corpus: &Corpus) -> Vec<Component> {
        vec![Component::new(ComponentType::PartOfSubcorpus, ANNIS_NS, "")]
    }

    fn create_operator(&self, corpus: &Corpus) -> Option<Box<dyn Operator>> {
        let base = BaseEdgeOpSpec {
            op_str: "@",
            components: vec![Component::new(ComponentType::PartOfSubcorpus, ANNIS_NS, "")],
            dist: self.dist,
            edge_anno: None,
            is_reflexive: false,
        };
        base.create_operator(corpus)
    }
}

fn all_components_of(corpus: &Corpus, ctype: ComponentType, name: &str) -> Vec<Component> {
    corpus
        .all_components()
        .into_iter()
        .filter(|c| c.ctype == ctype && (name.is_empty() || c.name == name))
        .collect()
}
