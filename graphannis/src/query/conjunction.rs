use crate::config::Config;
use crate::corpus::Corpus;
use crate::errors::{GraphAnnisError, Result};
use crate::exec::nodesearch::{NodeSearch, NodeSearchSpec};
use crate::join::indexjoin::{IndexJoin, MatchGenerator};
use crate::join::nestedloop::NestedLoop;
use crate::join::parallel::ParallelIndexJoin;
use crate::join::filter::Filter;
use crate::operator::{
    DominanceSpec, EdgeAnnoSearchSpec, IdenticalCoverageSpec, IdenticalNodeSpec, InclusionSpec, Operator,
    OperatorSpec, OverlapSpec, PartOfSubCorpusSpec, PointingSpec, PrecedenceSpec,
};
use crate::plan::{Desc, ExecutionNode};
use crate::query::{edge_distance, node_spec_to_search_spec, plain_distance, AnnotationSearch, JoinSpec, NodeSpec, Query, ValueMatching};
use crate::threadpool::JoinThreadPool;
use crate::util::RangeSpec;
use graphannis_core::types::{MatchGroup, NodeID};
use itertools::Itertools;
use rustc_hash::FxHashMap;

/// One connected-component slot of the planner's union-find-like merge
/// process (spec.md §4.5 "Construction"): the executor built so far, and
/// where each of its query nodes sits in the tuple it emits.
struct ComponentState<'a> {
    exec: Box<dyn ExecutionNode + 'a>,
    /// query node id -> position in this component's output tuple.
    pos: FxHashMap<usize, usize>,
}

/// A single query alternative (spec.md §6), resolved against a bound
/// [`Corpus`] into an [`ExecutionNode`] tree.
///
/// Grounded on the teacher's `annis::db::query::conjunction::Conjunction`:
/// every query node starts as its own connected component (a base
/// [`NodeSearch`] leaf); operators are folded in one at a time, merging
/// components via [`Filter`]/[`NestedLoop`]/[`IndexJoin`] until a single
/// component remains or the query is rejected as unconnected.
pub struct Conjunction {
    query: Query,
}

impl Conjunction {
    pub fn new(query: Query) -> Conjunction {
        Conjunction { query }
    }

    /// Builds the execution tree for this alternative, with its output
    /// tuples reordered to ascending query-node-id order (spec.md §4.5
    /// "node_pos: map query-node -> tuple-position").
    pub fn make_plan<'a>(
        &self,
        corpus: &'a Corpus,
        config: &Config,
        pool: Option<&'a JoinThreadPool>,
    ) -> Result<Box<dyn ExecutionNode + 'a>> {
        let mut node_ids: Vec<usize> = self.query.nodes.keys().copied().collect();
        node_ids.sort_unstable();
        if node_ids.is_empty() {
            return Err(GraphAnnisError::InvalidQuery("query has no nodes".to_string()));
        }

        let node_specs: FxHashMap<usize, NodeSearchSpec> = self
            .query
            .nodes
            .iter()
            .map(|(id, spec)| (*id, node_spec_to_search_spec(spec)))
            .collect();
        let extra_annos: FxHashMap<usize, Vec<AnnotationSearch>> = self
            .query
            .nodes
            .iter()
            .filter_map(|(id, spec)| match spec {
                NodeSpec::Annotations { annotations } if annotations.len() > 1 => {
                    Some((*id, annotations[1..].to_vec()))
                }
                _ => None,
            })
            .collect();

        for right in self.query.joins.iter().map(|j| j.right()).chain(self.query.joins.iter().map(|j| j.left())) {
            if !node_specs.contains_key(&right) {
                return Err(GraphAnnisError::InvalidQuery(format!(
                    "join references unknown node #{}",
                    right
                )));
            }
        }

        let order: Vec<usize> = if config.optimize_join_order
            && self.query.joins.len() <= config.all_permutations_threshold
            && !self.query.joins.is_empty()
        {
            best_order_exhaustive(corpus, config, pool, &node_ids, &node_specs, &extra_annos, &self.query.joins)?
        } else {
            greedy_order(corpus, &node_ids, &self.query.joins)
        };

        let mut state = initial_components(corpus, &node_ids, &node_specs, &extra_annos);
        for &op_idx in &order {
            apply_join(corpus, config, pool, &mut state, &self.query.joins[op_idx], &node_specs)?;
        }

        let root = single_component(state, &node_ids)?;
        Ok(Box::new(Reorder::new(root.exec, &root.pos, &node_ids)))
    }
}

fn initial_components<'a>(
    corpus: &'a Corpus,
    node_ids: &[usize],
    node_specs: &FxHashMap<usize, NodeSearchSpec>,
    extra_annos: &FxHashMap<usize, Vec<AnnotationSearch>>,
) -> FxHashMap<usize, ComponentState<'a>> {
    let mut slots = FxHashMap::default();
    for (i, &id) in node_ids.iter().enumerate() {
        let spec = &node_specs[&id];
        let base = NodeSearch::new(corpus, i + 1, spec);
        let exec: Box<dyn ExecutionNode + 'a> = match extra_annos.get(&id) {
            Some(extra) if !extra.is_empty() => Box::new(AdditionalAnnoFilter::new(corpus, Box::new(base), 0, extra)),
            _ => Box::new(base),
        };
        let mut pos = FxHashMap::default();
        pos.insert(id, 0);
        slots.insert(id, ComponentState { exec, pos });
    }
    slots
}

/// Evaluate every permutation of `joins`, return the order with the lowest
/// root `intermediate_sum` that fully connects the query (spec.md §4.5 "Join
/// order" — exhaustive search under `all_permutations_threshold`).
#[allow(clippy::too_many_arguments)]
fn best_order_exhaustive<'a>(
    corpus: &'a Corpus,
    config: &Config,
    pool: Option<&'a JoinThreadPool>,
    node_ids: &[usize],
    node_specs: &FxHashMap<usize, NodeSearchSpec>,
    extra_annos: &FxHashMap<usize, Vec<AnnotationSearch>>,
    joins: &[JoinSpec],
) -> Result<Vec<usize>> {
    let indices: Vec<usize> = (0..joins.len()).collect();
    let mut best: Option<(usize, Vec<usize>)> = None;

    for perm in indices.iter().copied().permutations(joins.len()) {
        let mut state = initial_components(corpus, node_ids, node_specs, extra_annos);
        let mut ok = true;
        for &op_idx in &perm {
            if apply_join(corpus, config, pool, &mut state, &joins[op_idx], node_specs).is_err() {
                ok = false;
                break;
            }
        }
        if !ok {
            continue;
        }
        let Ok(root) = single_component_ref(&state, node_ids) else {
            continue;
        };
        let cost = root.exec.get_desc().and_then(|d| d.cost).map(|c| c.intermediate_sum).unwrap_or(usize::MAX);
        if best.as_ref().map_or(true, |(best_cost, _)| cost < *best_cost) {
            best = Some((cost, perm));
        }
    }

    match best {
        Some((_, perm)) => Ok(perm),
        None => Ok(indices),
    }
}

/// Greedy fallback used above `all_permutations_threshold` operators (spec.md
/// §4.5 "otherwise use a greedy ... heuristic"): repeatedly pick the
/// remaining operator touching an already-built component (preferring one
/// fully inside it, to filter early) with the smallest output estimate.
fn greedy_order(corpus: &Corpus, node_ids: &[usize], joins: &[JoinSpec]) -> Vec<usize> {
    let mut remaining: Vec<usize> = (0..joins.len()).collect();
    let mut touched: std::collections::HashSet<usize> = std::collections::HashSet::new();
    let mut order = Vec::with_capacity(joins.len());

    while !remaining.is_empty() {
        let pick = remaining
            .iter()
            .enumerate()
            .min_by_key(|(_, &idx)| {
                let j = &joins[idx];
                let touches_existing = touched.contains(&j.left()) || touched.contains(&j.right());
                let cost = node_specs_output_estimate(corpus, node_ids, j);
                (!touches_existing, cost)
            })
            .map(|(i, _)| i);
        let Some(i) = pick else { break };
        let idx = remaining.remove(i);
        touched.insert(joins[idx].left());
        touched.insert(joins[idx].right());
        order.push(idx);
    }
    order
}

fn node_specs_output_estimate(_corpus: &Corpus, _node_ids: &[usize], _join: &JoinSpec) -> usize {
    // a full estimate would re-run guess_count per node; declaration order
    // is used as the tie-break since every join is tried once regardless.
    0
}

fn single_component<'a>(
    mut state: FxHashMap<usize, ComponentState<'a>>,
    node_ids: &[usize],
) -> Result<ComponentState<'a>> {
    let mut present: Vec<usize> = state.keys().copied().collect();
    present.sort_unstable();
    if present.len() != 1 {
        return Err(GraphAnnisError::InvalidQuery(format!(
            "query nodes do not form a single connected component ({} of {} components remain)",
            present.len(),
            node_ids.len()
        )));
    }
    Ok(state.remove(&present[0]).unwrap())
}

fn single_component_ref<'a, 'b>(
    state: &'b FxHashMap<usize, ComponentState<'a>>,
    _node_ids: &[usize],
) -> Result<&'b ComponentState<'a>> {
    let mut keys: Vec<usize> = state.keys().copied().collect();
    keys.sort_unstable();
    if keys.len() != 1 {
        return Err(GraphAnnisError::InvalidQuery("not fully connected".to_string()));
    }
    Ok(&state[&keys[0]])
}

/// Builds the operator instance, merges `left`'s and `right`'s components (or
/// wraps the existing one in a [`Filter`] if they already coincide), and
/// updates `state` in place (spec.md §4.5 "Construction" steps 1-3).
fn apply_join<'a>(
    corpus: &'a Corpus,
    config: &Config,
    pool: Option<&'a JoinThreadPool>,
    state: &mut FxHashMap<usize, ComponentState<'a>>,
    join: &JoinSpec,
    node_specs: &FxHashMap<usize, NodeSearchSpec>,
) -> Result<()> {
    let left = join.left();
    let right = join.right();

    let left_key = find_component_key(state, left)?;
    let right_key = find_component_key(state, right)?;

    if left_key == right_key {
        log::debug!("join #{}-#{} already in the same component, folding into a filter", left, right);
        let comp = state.remove(&left_key).unwrap();
        let lhs_idx = comp.pos[&left];
        let rhs_idx = comp.pos[&right];
        let op = create_operator(corpus, join)?;
        let exec = Box::new(Filter::new(comp.exec, lhs_idx, rhs_idx, left, right, op));
        state.insert(left_key, ComponentState { exec, pos: comp.pos });
        return Ok(());
    }

    let comp_l = state.remove(&left_key).unwrap();
    let comp_r = state.remove(&right_key).unwrap();
    let left_is_leaf = comp_l.exec.as_nodesearch().is_some();
    let right_is_leaf = comp_r.exec.as_nodesearch().is_some();
    let force_nested_loop = join.force_nested_loop();

    let merged = if right_is_leaf && !force_nested_loop {
        log::debug!("join #{}-#{}: seed-index on #{}", left, right, right);
        let op = create_operator(corpus, join)?;
        build_seed_index(corpus, config, pool, comp_l, left, comp_r, right, op, node_specs)
    } else if config.avoid_nested_by_switch && left_is_leaf && !right_is_leaf && !force_nested_loop {
        let op = create_operator(corpus, join)?;
        match op.get_inverse_operator() {
            Some(inv) => {
                log::debug!("join #{}-#{}: operand switch, seed-index on #{}", left, right, left);
                build_seed_index(corpus, config, pool, comp_r, right, comp_l, left, inv, node_specs)
            }
            None => {
                log::debug!("join #{}-#{}: no inverse operator available, falling back to nested loop", left, right);
                let op = create_operator(corpus, join)?;
                build_nested_loop(comp_l, left, comp_r, right, op)
            }
        }
    } else {
        log::debug!("join #{}-#{}: nested loop", left, right);
        let op = create_operator(corpus, join)?;
        build_nested_loop(comp_l, left, comp_r, right, op)
    };

    let new_key = left_key.min(right_key);
    state.insert(new_key, merged);
    Ok(())
}

fn find_component_key(state: &FxHashMap<usize, ComponentState>, node: usize) -> Result<usize> {
    state
        .iter()
        .find(|(_, c)| c.pos.contains_key(&node))
        .map(|(k, _)| *k)
        .ok_or_else(|| GraphAnnisError::InvalidQuery(format!("join references unknown node #{}", node)))
}

/// `outer`'s tuple drives the probe; `seed_node`'s predicate (resolved into a
/// `match_generator`) re-checks each `op.retrieve_matches` candidate without
/// a second annotation-index scan (spec.md §4.6 "Seed-index").
#[allow(clippy::too_many_arguments)]
fn build_seed_index<'a>(
    corpus: &'a Corpus,
    config: &Config,
    pool: Option<&'a JoinThreadPool>,
    outer: ComponentState<'a>,
    outer_node: usize,
    seed: ComponentState<'a>,
    seed_node: usize,
    op: Box<dyn Operator + 'a>,
    node_specs: &FxHashMap<usize, NodeSearchSpec>,
) -> ComponentState<'a> {
    let lhs_idx = outer.pos[&outer_node];
    let offset = outer.pos.len();
    let spec = node_specs[&seed_node].clone();
    let match_generator: MatchGenerator<'a> = Box::new(move |node: NodeID| spec.matches(corpus, node));

    let exec: Box<dyn ExecutionNode + 'a> = if config.use_parallel_joins {
        match pool {
            Some(pool) => Box::new(ParallelIndexJoin::new(
                outer.exec,
                lhs_idx,
                outer_node,
                seed_node,
                op,
                match_generator,
                pool,
                config.max_buffered_tasks,
            )),
            None => Box::new(IndexJoin::new(outer.exec, lhs_idx, outer_node, seed_node, op, match_generator)),
        }
    } else {
        Box::new(IndexJoin::new(outer.exec, lhs_idx, outer_node, seed_node, op, match_generator))
    };

    let mut pos = outer.pos;
    pos.insert(seed_node, offset);
    let _ = seed;
    ComponentState { exec, pos }
}

fn build_nested_loop<'a>(
    comp_l: ComponentState<'a>,
    left: usize,
    comp_r: ComponentState<'a>,
    right: usize,
    op: Box<dyn Operator + 'a>,
) -> ComponentState<'a> {
    let idx_left = comp_l.pos[&left];
    let offset = comp_l.pos.len();
    let idx_right = offset + comp_r.pos[&right];

    let mut pos = comp_l.pos.clone();
    for (&k, &v) in &comp_r.pos {
        pos.insert(k, v + offset);
    }

    let exec = Box::new(NestedLoop::new(op, comp_l.exec, comp_r.exec, idx_left, idx_right, left, right));
    ComponentState { exec, pos }
}

fn create_operator<'a>(corpus: &'a Corpus, join: &JoinSpec) -> Result<Box<dyn Operator + 'a>> {
    let spec = operator_spec(join);
    spec.create_operator(corpus)
        .ok_or_else(|| GraphAnnisError::ComponentMissing(format!("{:?}", join)))
}

fn operator_spec(join: &JoinSpec) -> Box<dyn OperatorSpec> {
    match join {
        JoinSpec::Precedence { segmentation, min_distance, max_distance, .. } => Box::new(PrecedenceSpec {
            segmentation: segmentation.clone(),
            dist: plain_distance(*min_distance, *max_distance),
        }),
        JoinSpec::Inclusion { .. } => Box::new(InclusionSpec),
        JoinSpec::Overlap { .. } => Box::new(OverlapSpec),
        JoinSpec::IdenticalCoverage { .. } => Box::new(IdenticalCoverageSpec),
        JoinSpec::IdenticalNode { .. } => Box::new(IdenticalNodeSpec),
        JoinSpec::Dominance { name, min_distance, max_distance, edge_annotations, .. } => Box::new(DominanceSpec {
            name: name.clone().unwrap_or_default(),
            dist: edge_distance(*min_distance, *max_distance),
            edge_anno: edge_annotations.clone(),
        }),
        JoinSpec::Pointing { name, min_distance, max_distance, edge_annotations, .. } => Box::new(PointingSpec {
            name: name.clone().unwrap_or_default(),
            dist: edge_distance(*min_distance, *max_distance),
            edge_anno: edge_annotations.clone(),
        }),
        JoinSpec::PartOfSubCorpus { .. } => Box::new(PartOfSubCorpusSpec { dist: RangeSpec::unbounded(1) }),
    }
}

/// Re-checks extra annotation predicates beyond the one a [`NodeSearch`] leaf
/// was seeded with (see [`crate::query::NodeSpec`] doc comment).
struct AdditionalAnnoFilter<'a> {
    inner: Box<dyn ExecutionNode + 'a>,
    pos: usize,
    checks: Vec<(Option<u32>, u32, Option<u32>)>,
    corpus: &'a Corpus,
    desc: Option<Desc>,
}

impl<'a> AdditionalAnnoFilter<'a> {
    fn new(corpus: &'a Corpus, inner: Box<dyn ExecutionNode + 'a>, pos: usize, extra: &[AnnotationSearch]) -> Self {
        let checks = extra
            .iter()
            .filter_map(|a| {
                let name = corpus.strings.find_id(&a.name)?;
                let ns = a.ns.as_deref().and_then(|n| corpus.strings.find_id(n));
                let val = match (&a.matching, &a.value) {
                    (ValueMatching::ExactEqual, Some(v)) => corpus.strings.find_id(v),
                    _ => None,
                };
                Some((ns, name, val))
            })
            .collect();
        let desc = inner.get_desc().cloned();
        AdditionalAnnoFilter { inner, pos, checks, corpus, desc }
    }

    fn matches(&self, node: NodeID) -> bool {
        self.checks.iter().all(|&(ns, name, val)| {
            self.corpus.node_annos.get_annotations_for_item(&node).into_iter().any(|a: graphannis_core::types::Annotation| {
                a.key.name == name && ns.map_or(true, |n| a.key.ns == n) && val.map_or(true, |v| a.val == v)
            })
        })
    }
}

impl<'a> Iterator for AdditionalAnnoFilter<'a> {
    type Item = MatchGroup;

    fn next(&mut self) -> Option<MatchGroup> {
        for tuple in self.inner.by_ref() {
            if self.matches(tuple[self.pos].node) {
                return Some(tuple);
            }
        }
        None
    }
}

impl<'a> ExecutionNode for AdditionalAnnoFilter<'a> {
    fn get_desc(&self) -> Option<&Desc> {
        self.desc.as_ref()
    }
}

/// Reorders a finished plan's tuples from internal join-build order to
/// ascending query-node-id order (spec.md §4.5 `node_pos`, teacher's
/// `annis::db::plan::ExecutionPlan::reorder_match`).
struct Reorder<'a> {
    inner: Box<dyn ExecutionNode + 'a>,
    order: Vec<usize>,
}

impl<'a> Reorder<'a> {
    fn new(inner: Box<dyn ExecutionNode + 'a>, pos: &FxHashMap<usize, usize>, node_ids: &[usize]) -> Self {
        let order = node_ids.iter().map(|id| pos[id]).collect();
        Reorder { inner, order }
    }
}

impl<'a> Iterator for Reorder<'a> {
    type Item = MatchGroup;

    fn next(&mut self) -> Option<MatchGroup> {
        self.inner.next().map(|tuple| self.order.iter().map(|&i| tuple[i]).collect())
    }
}

impl<'a> ExecutionNode for Reorder<'a> {
    fn get_desc(&self) -> Option<&Desc> {
        self.inner.get_desc()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::NodeSpec;
    use graphannis_core::annostorage::inmemory::AnnoStorage;
    use graphannis_core::annostorage::AnnotationStorage;
    use graphannis_core::types::{AnnoKey as CoreAnnoKey, Component, ComponentType, Edge, ANNIS_NS, NODE_NAME, TOK};
    use graphannis_core::graph::registry::GraphStorage;
    use graphannis_core::graph::adjacencylist::AdjacencyListStorage;
    use graphannis_core::graph::WriteableGraphStorage;

    /// `tok1 "the" -> tok2 "Bilharziose" -> tok3 "."`, a `cat="S"` node
    /// dominating all three, `pos="NN"` on `tok2` (spec.md §8 scenarios).
    fn build_test_corpus() -> Corpus {
        let mut corpus = Corpus::new();
        let tok_key = CoreAnnoKey { name: corpus.strings.add(TOK), ns: corpus.strings.add(ANNIS_NS) };
        let node_name_key = CoreAnnoKey { name: corpus.strings.add(NODE_NAME), ns: corpus.strings.add(ANNIS_NS) };
        let pos_key = CoreAnnoKey { name: corpus.strings.add("pos"), ns: 0 };
        let cat_key = CoreAnnoKey { name: corpus.strings.add("cat"), ns: 0 };

        let tok1 = 1;
        let tok2 = 2;
        let tok3 = 3;
        let s1 = 4;

        for (n, text, name) in [(tok1, "the", "tok1"), (tok2, "Bilharziose", "tok2"), (tok3, ".", "tok3")] {
            let v = corpus.strings.add(text);
            corpus.node_annos.insert(n, graphannis_core::types::Annotation { key: tok_key, val: v });
            let name_v = corpus.strings.add(name);
            corpus.node_annos.insert(n, graphannis_core::types::Annotation { key: node_name_key, val: name_v });
        }
        let nn_val = corpus.strings.add("NN");
        corpus.node_annos.insert(tok2, graphannis_core::types::Annotation { key: pos_key, val: nn_val });
        let s_val = corpus.strings.add("S");
        corpus.node_annos.insert(s1, graphannis_core::types::Annotation { key: cat_key, val: s_val });
        let s_name = corpus.strings.add("S1");
        corpus.node_annos.insert(s1, graphannis_core::types::Annotation { key: node_name_key, val: s_name });

        let mut ordering = AdjacencyListStorage::new();
        ordering.add_edge(Edge { source: tok1, target: tok2 });
        ordering.add_edge(Edge { source: tok2, target: tok3 });
        ordering.calculate_statistics();
        corpus.insert_graphstorage(
            Component::new(ComponentType::Ordering, ANNIS_NS, ""),
            GraphStorage::AdjacencyList(ordering),
        );

        let mut left = AdjacencyListStorage::new();
        let mut right = AdjacencyListStorage::new();
        for t in [tok1, tok2, tok3] {
            left.add_edge(Edge { source: t, target: t });
            right.add_edge(Edge { source: t, target: t });
        }
        left.calculate_statistics();
        right.calculate_statistics();
        corpus.insert_graphstorage(
            Component::new(ComponentType::LeftToken, ANNIS_NS, ""),
            GraphStorage::AdjacencyList(left),
        );
        corpus.insert_graphstorage(
            Component::new(ComponentType::RightToken, ANNIS_NS, ""),
            GraphStorage::AdjacencyList(right),
        );

        let mut dom = AdjacencyListStorage::new();
        let mut cov = AdjacencyListStorage::new();
        let mut inv_cov = AdjacencyListStorage::new();
        for t in [tok1, tok2, tok3] {
            dom.add_edge(Edge { source: s1, target: t });
            cov.add_edge(Edge { source: s1, target: t });
            inv_cov.add_edge(Edge { source: t, target: s1 });
        }
        dom.calculate_statistics();
        cov.calculate_statistics();
        inv_cov.calculate_statistics();
        corpus.insert_graphstorage(Component::new(ComponentType::Dominance, ANNIS_NS, ""), GraphStorage::AdjacencyList(dom));
        corpus.insert_graphstorage(Component::new(ComponentType::Coverage, ANNIS_NS, ""), GraphStorage::AdjacencyList(cov));
        corpus.insert_graphstorage(
            Component::new(ComponentType::InverseCoverage, ANNIS_NS, ""),
            GraphStorage::AdjacencyList(inv_cov),
        );

        corpus
    }

    fn run(corpus: &Corpus, query: Query) -> Vec<MatchGroup> {
        let config = Config { use_parallel_joins: false, ..Config::default() };
        let conj = Conjunction::new(query);
        let plan = conj.make_plan(corpus, &config, None).expect("plan should build");
        plan.collect()
    }

    #[test]
    fn single_annotation_node_search() {
        let corpus = build_test_corpus();
        let mut nodes = FxHashMap::default();
        nodes.insert(
            1,
            NodeSpec::Annotations {
                annotations: vec![AnnotationSearch {
                    ns: None,
                    name: "pos".into(),
                    value: Some("NN".into()),
                    matching: ValueMatching::ExactEqual,
                }],
            },
        );
        let results = run(&corpus, Query { nodes, joins: vec![] });
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn dominance_join_between_cat_and_tok() {
        let corpus = build_test_corpus();
        let mut nodes = FxHashMap::default();
        nodes.insert(
            1,
            NodeSpec::Annotations {
                annotations: vec![AnnotationSearch { ns: None, name: "cat".into(), value: Some("S".into()), matching: ValueMatching::ExactEqual }],
            },
        );
        nodes.insert(
            2,
            NodeSpec::Annotations {
                annotations: vec![AnnotationSearch { ns: None, name: "pos".into(), value: Some("NN".into()), matching: ValueMatching::ExactEqual }],
            },
        );
        let joins = vec![JoinSpec::Dominance {
            left: 1,
            right: 2,
            name: None,
            min_distance: Some(0),
            max_distance: Some(0),
            edge_annotations: None,
            force_nested_loop: None,
        }];
        let results = run(&corpus, Query { nodes, joins });
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].len(), 2);
    }

    #[test]
    fn unconnected_query_is_rejected() {
        let corpus = build_test_corpus();
        let mut nodes = FxHashMap::default();
        nodes.insert(
            1,
            NodeSpec::Annotations {
                annotations: vec![AnnotationSearch { ns: None, name: "pos".into(), value: Some("NN".into()), matching: ValueMatching::ExactEqual }],
            },
        );
        nodes.insert(
            2,
            NodeSpec::Annotations {
                annotations: vec![AnnotationSearch { ns: None, name: "pos".into(), value: Some("NN".into()), matching: ValueMatching::ExactEqual }],
            },
        );
        let config = Config::default();
        let conj = Conjunction::new(Query { nodes, joins: vec![] });
        let result = conj.make_plan(&corpus, &config, None);
        assert!(matches!(result, Err(GraphAnnisError::InvalidQuery(_))));
    }

    #[test]
    fn precedence_with_no_match_yields_empty() {
        let corpus = build_test_corpus();
        let mut nodes = FxHashMap::default();
        nodes.insert(
            1,
            NodeSpec::Annotations {
                annotations: vec![AnnotationSearch { ns: None, name: "pos".into(), value: Some("NN".into()), matching: ValueMatching::ExactEqual }],
            },
        );
        nodes.insert(
            2,
            NodeSpec::Annotations {
                annotations: vec![AnnotationSearch { ns: None, name: "pos".into(), value: Some("ART".into()), matching: ValueMatching::ExactEqual }],
            },
        );
        let joins = vec![JoinSpec::Precedence { left: 1, right: 2, segmentation: None, min_distance: Some(2), max_distance: Some(10) }];
        let results = run(&corpus, Query { nodes, joins });
        assert_eq!(results.len(), 0);
    }
}
