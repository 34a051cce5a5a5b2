use crate::operator::Operator;
use crate::plan::{calculate_outputsize, CostEstimate, Desc, ExecutionNode};
use graphannis_core::types::MatchGroup;

/// `outer × inner`, materialising `inner` on first use so `outer` can be
/// rewound for free (spec.md §4.6 "Nested loop"). `outer_is_left` records
/// which physical side produces the operator's LHS half of the combined
/// tuple, independent of which side is iterated as the outer loop.
pub struct NestedLoop<'a> {
    outer: Box<dyn ExecutionNode + 'a>,
    inner_source: Option<Box<dyn ExecutionNode + 'a>>,
    inner_materialized: Vec<MatchGroup>,
    outer_is_left: bool,
    current_outer: Option<MatchGroup>,
    inner_pos: usize,
    lhs_idx: usize,
    rhs_idx: usize,
    op: Box<dyn Operator + 'a>,
    desc: Option<Desc>,
}

impl<'a> NestedLoop<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        op: Box<dyn Operator + 'a>,
        exec_left: Box<dyn ExecutionNode + 'a>,
        exec_right: Box<dyn ExecutionNode + 'a>,
        idx_left: usize,
        idx_right: usize,
        node_nr_left: usize,
        node_nr_right: usize,
    ) -> NestedLoop<'a> {
        let left_desc = exec_left.get_desc().cloned();
        let right_desc = exec_right.get_desc().cloned();

        // the smaller side becomes the outer relation (spec.md §4.5 cost model)
        let left_out = left_desc.as_ref().and_then(|d| d.cost).map(|c| c.output).unwrap_or(usize::MAX);
        let right_out = right_desc.as_ref().and_then(|d| d.cost).map(|c| c.output).unwrap_or(usize::MAX);
        let outer_is_left = left_out <= right_out;

        let desc = match (&left_desc, &right_desc) {
            (Some(l), Some(r)) => {
                let cost = match (l.cost, r.cost) {
                    (Some(lc), Some(rc)) => {
                        let num_tuples = lc.output.saturating_mul(rc.output);
                        let step = lc.output.min(rc.output) + num_tuples;
                        Some(CostEstimate {
                            output: calculate_outputsize(op.as_ref(), num_tuples),
                            processed_in_step: step,
                            intermediate_sum: lc.intermediate_sum + rc.intermediate_sum + step,
                        })
                    }
                    _ => None,
                };
                Some(Desc {
                    component_nr: l.component_nr,
                    node_pos: merged_node_pos(l, r),
                    impl_description: "nested_loop".to_string(),
                    query_fragment: format!("#{} {} #{}", node_nr_left, op, node_nr_right),
                    cost,
                    lhs: Some(Box::new(l.clone())),
                    rhs: Some(Box::new(r.clone())),
                })
            }
            _ => None,
        };

        let (outer, inner_source) = if outer_is_left {
            (exec_left, exec_right)
        } else {
            (exec_right, exec_left)
        };

        NestedLoop {
            outer,
            inner_source: Some(inner_source),
            inner_materialized: Vec::new(),
            outer_is_left,
            current_outer: None,
            inner_pos: 0,
            lhs_idx: idx_left,
            rhs_idx: idx_right,
            op,
            desc,
        }
    }
}

fn merged_node_pos(l: &Desc, r: &Desc) -> rustc_hash::FxHashMap<usize, usize> {
    let offset = l.node_pos.len();
    let mut merged = l.node_pos.clone();
    for (k, v) in &r.node_pos {
        merged.insert(k + offset, *v);
    }
    merged
}

impl<'a> Iterator for NestedLoop<'a> {
    type Item = MatchGroup;

    fn next(&mut self) -> Option<MatchGroup> {
        if let Some(src) = self.inner_source.take() {
            self.inner_materialized = src.collect();
        }
        loop {
            if self.current_outer.is_none() {
                self.current_outer = self.outer.next();
                self.inner_pos = 0;
                self.current_outer.as_ref()?;
            }
            let outer_tuple = self.current_outer.as_ref().unwrap().clone();
            while self.inner_pos < self.inner_materialized.len() {
                let inner_tuple = self.inner_materialized[self.inner_pos].clone();
                self.inner_pos += 1;

                let combined = if self.outer_is_left {
                    let mut c = outer_tuple.clone();
                    c.extend(inner_tuple);
                    c
                } else {
                    let mut c = inner_tuple;
                    c.extend(outer_tuple.clone());
                    c
                };

                let lhs_m = combined[self.lhs_idx];
                let rhs_m = combined[self.rhs_idx];
                if !self.op.is_reflexive() && lhs_m.node == rhs_m.node && lhs_m.anno.key == rhs_m.anno.key {
                    continue;
                }
                if self.op.filter_match(&lhs_m, &rhs_m) {
                    return Some(combined);
                }
            }
            self.current_outer = None;
        }
    }
}

impl<'a> ExecutionNode for NestedLoop<'a> {
    fn get_desc(&self) -> Option<&Desc> {
        self.desc.as_ref()
    }
}
