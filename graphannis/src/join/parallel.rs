use crate::join::indexjoin::MatchGenerator;
use crate::operator::Operator;
use crate::plan::{calculate_outputsize, CostEstimate, Desc, ExecutionNode};
use crate::threadpool::JoinThreadPool;
use graphannis_core::types::{Annotation, Match, MatchGroup, NodeID};
use rayon::prelude::*;
use std::collections::VecDeque;
use std::sync::mpsc::{sync_channel, Receiver, SyncSender};
use std::sync::{Arc, Mutex};

/// The task-parallel seed-index join of spec.md §4.6: LHS tuples are drained
/// off the probe side in batches of up to `batch_size`, and every tuple in a
/// batch calls `op.retrieve_matches` plus the match generator on a worker of
/// the shared [`JoinThreadPool`] (`rayon`'s scoped `par_iter`, so borrowed
/// data from the bound query — node predicates, graph storages — never needs
/// to be `'static`). Tuples within one batch may finish in any order; batch
/// boundaries are the only serialization point, matching spec.md §5's
/// "bounded out-of-order completion" ordering guarantee.
pub struct ParallelIndexJoin<'a> {
    lhs: Box<dyn ExecutionNode + 'a>,
    lhs_idx: usize,
    op: Box<dyn Operator + 'a>,
    match_generator: MatchGenerator<'a>,
    pool: &'a JoinThreadPool,
    batch_size: usize,
    current_batch: std::vec::IntoIter<MatchGroup>,
    desc: Option<Desc>,
}

impl<'a> ParallelIndexJoin<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        lhs: Box<dyn ExecutionNode + 'a>,
        lhs_idx: usize,
        node_nr_lhs: usize,
        node_nr_rhs: usize,
        op: Box<dyn Operator + 'a>,
        match_generator: MatchGenerator<'a>,
        pool: &'a JoinThreadPool,
        batch_size: usize,
    ) -> ParallelIndexJoin<'a> {
        let desc = lhs.get_desc().map(|orig| {
            let cost = orig.cost.map(|c| {
                let output = calculate_outputsize(op.as_ref(), c.output);
                CostEstimate {
                    output,
                    processed_in_step: c.output,
                    intermediate_sum: c.intermediate_sum + c.output,
                }
            });
            Desc {
                component_nr: orig.component_nr,
                node_pos: orig.node_pos.clone(),
                impl_description: "index_join (parallel)".to_string(),
                query_fragment: format!("#{} {} #{}", node_nr_lhs, op, node_nr_rhs),
                cost,
                lhs: Some(Box::new(orig.clone())),
                rhs: None,
            }
        });

        ParallelIndexJoin {
            lhs,
            lhs_idx,
            op,
            match_generator,
            pool,
            batch_size: batch_size.max(1),
            current_batch: Vec::new().into_iter(),
            desc,
        }
    }

    fn run_batch(&mut self, batch: Vec<MatchGroup>) -> Vec<MatchGroup> {
        let op = self.op.as_ref();
        let match_generator = &self.match_generator;
        let lhs_idx = self.lhs_idx;
        let reflexive = op.is_reflexive();

        let per_tuple: Vec<Vec<MatchGroup>> = self.pool.inner().install(|| {
            batch
                .par_iter()
                .map(|tuple| {
                    let lhs_match = tuple[lhs_idx];
                    let mut out = Vec::new();
                    for candidate in op.retrieve_matches(&lhs_match) {
                        for anno in (match_generator)(candidate.node) {
                            if !reflexive
                                && lhs_match.node == candidate.node
                                && lhs_match.anno.key == anno.key
                            {
                                continue;
                            }
                            let mut result = tuple.clone();
                            result.push(Match::new(candidate.node, anno));
                            out.push(result);
                        }
                    }
                    out
                })
                .collect()
        });
        per_tuple.into_iter().flatten().collect()
    }
}

impl<'a> Iterator for ParallelIndexJoin<'a> {
    type Item = MatchGroup;

    fn next(&mut self) -> Option<MatchGroup> {
        loop {
            if let Some(next) = self.current_batch.next() {
                return Some(next);
            }

            let mut batch = Vec::with_capacity(self.batch_size);
            while batch.len() < self.batch_size {
                match self.lhs.next() {
                    Some(tuple) => batch.push(tuple),
                    None => break,
                }
            }
            if batch.is_empty() {
                return None;
            }

            let results = self.run_batch(batch);
            self.current_batch = results.into_iter();
        }
    }
}

impl<'a> ExecutionNode for ParallelIndexJoin<'a> {
    fn get_desc(&self) -> Option<&Desc> {
        self.desc.as_ref()
    }
}

/// The alternative parallel executor of spec.md §4.6 "Thread index join":
/// `num_workers` long-lived background threads pull LHS tuples from a
/// mutex-guarded queue and push result tuples onto a shared bounded MPSC
/// channel, independent of how any one caller drives the returned iterator.
/// Because the workers outlive the call that spawns them, the bound operator
/// and match generator must be `'static` (typically an `Arc`-owned operator
/// built once per query rather than borrowed from a [`crate::corpus::Corpus`]
/// reference) — unlike [`ParallelIndexJoin`], which never outlives the
/// `next()` call that uses it and can stay borrowed.
pub struct ThreadIndexJoin {
    rx: Receiver<MatchGroup>,
}

impl ThreadIndexJoin {
    pub fn new(
        lhs: Vec<MatchGroup>,
        lhs_idx: usize,
        op: Arc<dyn Operator>,
        match_generator: Arc<dyn Fn(NodeID) -> Vec<Annotation> + Send + Sync>,
        pool: &JoinThreadPool,
        num_workers: usize,
    ) -> ThreadIndexJoin {
        let (tx, rx): (SyncSender<MatchGroup>, Receiver<MatchGroup>) =
            sync_channel(lhs.len().max(1));
        let source = Arc::new(Mutex::new(VecDeque::from(lhs)));

        for _ in 0..num_workers.max(1) {
            let source = source.clone();
            let op = op.clone();
            let match_generator = match_generator.clone();
            let tx = tx.clone();
            pool.inner().spawn(move || {
                loop {
                    let tuple = {
                        let mut guard = source.lock().unwrap();
                        guard.pop_front()
                    };
                    let tuple = match tuple {
                        Some(t) => t,
                        None => break,
                    };
                    let lhs_match = tuple[lhs_idx];
                    for candidate in op.retrieve_matches(&lhs_match) {
                        for anno in (match_generator)(candidate.node) {
                            if !op.is_reflexive()
                                && lhs_match.node == candidate.node
                                && lhs_match.anno.key == anno.key
                            {
                                continue;
                            }
                            let mut result = tuple.clone();
                            result.push(Match::new(candidate.node, anno));
                            if tx.send(result).is_err() {
                                return;
                            }
                        }
                    }
                }
                // `tx`'s own clone drops here; the channel closes once every
                // worker (and the original, dropped below) has returned.
            });
        }
        drop(tx);

        ThreadIndexJoin { rx }
    }
}

impl Iterator for ThreadIndexJoin {
    type Item = MatchGroup;

    fn next(&mut self) -> Option<MatchGroup> {
        self.rx.recv().ok()
    }
}

impl ExecutionNode for ThreadIndexJoin {
    fn get_desc(&self) -> Option<&Desc> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operator::identical_node::IdenticalNode;
    use graphannis_core::types::AnnoKey;

    #[test]
    fn thread_index_join_drains_every_tuple() {
        let pool = JoinThreadPool::new(2);
        let lhs: Vec<MatchGroup> = (0..5)
            .map(|n| vec![Match::new(n, Annotation::default())])
            .collect();
        let join = ThreadIndexJoin::new(
            lhs,
            0,
            Arc::new(IdenticalNode),
            Arc::new(|n| {
                vec![Annotation {
                    key: AnnoKey::default(),
                    val: n,
                }]
            }),
            &pool,
            3,
        );
        let mut results: Vec<MatchGroup> = join.collect();
        results.sort_by_key(|m| m[1].node);
        assert_eq!(results.len(), 5);
        for (i, m) in results.iter().enumerate() {
            assert_eq!(m[1].node, i as NodeID);
        }
    }

    #[test]
    fn parallel_index_join_matches_each_candidate() {
        let pool = JoinThreadPool::new(2);
        struct FixedLeaf {
            items: std::vec::IntoIter<MatchGroup>,
            desc: Desc,
        }
        impl Iterator for FixedLeaf {
            type Item = MatchGroup;
            fn next(&mut self) -> Option<MatchGroup> {
                self.items.next()
            }
        }
        impl ExecutionNode for FixedLeaf {
            fn get_desc(&self) -> Option<&Desc> {
                Some(&self.desc)
            }
        }

        let desc = Desc {
            component_nr: 0,
            lhs: None,
            rhs: None,
            node_pos: Default::default(),
            impl_description: "base".into(),
            query_fragment: "#1".into(),
            cost: Some(CostEstimate {
                output: 1,
                processed_in_step: 1,
                intermediate_sum: 1,
            }),
        };
        let leaf = FixedLeaf {
            items: vec![
                vec![Match::new(1, Annotation::default())],
                vec![Match::new(2, Annotation::default())],
            ]
            .into_iter(),
            desc,
        };
        let join = ParallelIndexJoin::new(
            Box::new(leaf),
            0,
            1,
            2,
            Box::new(IdenticalNode),
            Box::new(|n| {
                vec![Annotation {
                    key: AnnoKey::default(),
                    val: n,
                }]
            }),
            &pool,
            8,
        );
        let mut results: Vec<MatchGroup> = join.collect();
        results.sort_by_key(|m| m[0].node);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0][1].node, 1);
        assert_eq!(results[1][1].node, 2);
    }
}
