use crate::operator::Operator;
use crate::plan::{calculate_outputsize, CostEstimate, Desc, ExecutionNode};
use graphannis_core::types::MatchGroup;

/// Re-checks an already-connected pair of tuple positions against `op`
/// without changing the tuple's shape (spec.md §4.6 "Filter").
pub struct Filter<'a> {
    inner: Box<dyn ExecutionNode + 'a>,
    lhs_idx: usize,
    rhs_idx: usize,
    op: Box<dyn Operator + 'a>,
    desc: Option<Desc>,
}

impl<'a> Filter<'a> {
    pub fn new(
        inner: Box<dyn ExecutionNode + 'a>,
        lhs_idx: usize,
        rhs_idx: usize,
        node_nr_lhs: usize,
        node_nr_rhs: usize,
        op: Box<dyn Operator + 'a>,
    ) -> Filter<'a> {
        let desc = inner.get_desc().map(|orig| {
            let cost = orig.cost.map(|c| CostEstimate {
                output: calculate_outputsize(op.as_ref(), c.output),
                processed_in_step: c.output,
                intermediate_sum: c.intermediate_sum + c.output,
            });
            Desc {
                component_nr: orig.component_nr,
                node_pos: orig.node_pos.clone(),
                impl_description: "filter".to_string(),
                query_fragment: format!("#{} {} #{}", node_nr_lhs, op, node_nr_rhs),
                cost,
                lhs: Some(Box::new(orig.clone())),
                rhs: None,
            }
        });
        Filter { inner, lhs_idx, rhs_idx, op, desc }
    }
}

impl<'a> Iterator for Filter<'a> {
    type Item = MatchGroup;

    fn next(&mut self) -> Option<MatchGroup> {
        for tuple in self.inner.by_ref() {
            if self.op.filter_match(&tuple[self.lhs_idx], &tuple[self.rhs_idx]) {
                return Some(tuple);
            }
        }
        None
    }
}

impl<'a> ExecutionNode for Filter<'a> {
    fn get_desc(&self) -> Option<&Desc> {
        self.desc.as_ref()
    }
}
