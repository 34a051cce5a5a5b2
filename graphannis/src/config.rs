/// Tunable planner/executor behaviour, injected at construction rather than
/// read from globals (spec.md §9 "global mutable state" design note).
#[derive(Clone, Debug)]
pub struct Config {
    /// Use the thread-pool-backed parallel join executors instead of the
    /// sequential ones.
    pub use_parallel_joins: bool,
    /// Number of worker threads in the shared join thread pool. Defaults to
    /// the host's available parallelism.
    pub num_of_background_tasks: usize,
    /// Above this many operators, the planner switches from exhaustive
    /// permutation search to a greedy-then-improve heuristic (§4.5).
    pub all_permutations_threshold: usize,
    /// If disabled, the planner never swaps a commutative operator's operands
    /// to avoid a nested-loop join (§4.5 step 2).
    pub avoid_nested_by_switch: bool,
    /// If disabled, the planner never reorders joins to minimise cost; it
    /// executes them in declaration order.
    pub optimize_join_order: bool,
    /// Maximum number of futures a nested-loop/seed-index join keeps in
    /// flight at once (§4.6).
    pub max_buffered_tasks: usize,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            use_parallel_joins: true,
            num_of_background_tasks: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            all_permutations_threshold: 6,
            avoid_nested_by_switch: true,
            optimize_join_order: true,
            max_buffered_tasks: 128,
        }
    }
}
