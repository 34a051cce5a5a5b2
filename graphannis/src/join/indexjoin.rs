use crate::operator::Operator;
use crate::plan::{calculate_outputsize, CostEstimate, Desc, ExecutionNode};
use graphannis_core::types::{Annotation, Match, MatchGroup, NodeID};

/// A function that reports every annotation of `node` satisfying the seeded
/// side's node predicate, built once from a [`crate::plan::NodeSearchDesc`]
/// (spec.md §4.6 "seed-index" `match_generator`).
pub type MatchGenerator<'a> = Box<dyn Fn(NodeID) -> Vec<Annotation> + Sync + Send + 'a>;

/// Seeds a per-LHS-tuple lookup on `op`'s graph-storage index instead of
/// scanning the RHS node's own annotation search (spec.md §4.6 "Seed-index",
/// sequential baseline used when [`crate::config::Config::use_parallel_joins`]
/// is off).
pub struct IndexJoin<'a> {
    lhs: Box<dyn ExecutionNode + 'a>,
    lhs_idx: usize,
    op: Box<dyn Operator + 'a>,
    match_generator: MatchGenerator<'a>,
    current_lhs: Option<MatchGroup>,
    rhs_candidates: std::vec::IntoIter<Match>,
    pending_annos: std::vec::IntoIter<Annotation>,
    pending_node: NodeID,
    desc: Option<Desc>,
}

impl<'a> IndexJoin<'a> {
    pub fn new(
        lhs: Box<dyn ExecutionNode + 'a>,
        lhs_idx: usize,
        node_nr_lhs: usize,
        node_nr_rhs: usize,
        op: Box<dyn Operator + 'a>,
        match_generator: MatchGenerator<'a>,
    ) -> IndexJoin<'a> {
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
                impl_description: "index_join".to_string(),
                query_fragment: format!("#{} {} #{}", node_nr_lhs, op, node_nr_rhs),
                cost,
                lhs: Some(Box::new(orig.clone())),
                rhs: None,
            }
        });

        IndexJoin {
            lhs,
            lhs_idx,
            op,
            match_generator,
            current_lhs: None,
            rhs_candidates: Vec::new().into_iter(),
            pending_annos: Vec::new().into_iter(),
            pending_node: 0,
            desc,
        }
    }

    fn emit(&self, candidate: Match) -> MatchGroup {
        let mut result = self.current_lhs.clone().unwrap();
        result.push(candidate);
        result
    }
}

impl<'a> Iterator for IndexJoin<'a> {
    type Item = MatchGroup;

    fn next(&mut self) -> Option<MatchGroup> {
        loop {
            if self.current_lhs.is_none() {
                self.current_lhs = self.lhs.next();
                let tuple = self.current_lhs.as_ref()?;
                let candidates: Vec<Match> = self.op.retrieve_matches(&tuple[self.lhs_idx]).collect();
                self.rhs_candidates = candidates.into_iter();
            }

            let lhs_match = self.current_lhs.as_ref().unwrap()[self.lhs_idx];

            loop {
                if let Some(anno) = self.pending_annos.next() {
                    if !self.op.is_reflexive()
                        && lhs_match.node == self.pending_node
                        && lhs_match.anno.key == anno.key
                    {
                        continue;
                    }
                    return Some(self.emit(Match::new(self.pending_node, anno)));
                }

                match self.rhs_candidates.next() {
                    Some(candidate) => {
                        self.pending_node = candidate.node;
                        self.pending_annos = (self.match_generator)(candidate.node).into_iter();
                    }
                    None => break,
                }
            }

            self.current_lhs = None;
        }
    }
}

impl<'a> ExecutionNode for IndexJoin<'a> {
    fn get_desc(&self) -> Option<&Desc> {
        self.desc.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operator::identical_node::IdenticalNode;

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

    #[test]
    fn joins_each_lhs_tuple_with_its_candidates() {
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
            items: vec![vec![Match::new(5, Annotation::default())]].into_iter(),
            desc,
        };
        let join = IndexJoin::new(
            Box::new(leaf),
            0,
            1,
            2,
            Box::new(IdenticalNode),
            Box::new(|n| vec![Annotation { key: Default::default(), val: n }]),
        );
        let results: Vec<MatchGroup> = join.collect();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0][1].node, 5);
    }
}
