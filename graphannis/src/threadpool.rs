use rayon::{ThreadPool, ThreadPoolBuilder};

/// The engine's single shared thread pool, serving every parallel join of
/// every concurrently running query (spec.md §5 "a process-wide shared
/// thread pool serves all concurrent joins and all queries"). Built once at
/// [`crate::storage::CorpusStorage`] construction from [`crate::config::Config`]
/// and handed down by reference into the planner, never rediscovered through
/// a global (spec.md §9 "global mutable state" design note).
pub struct JoinThreadPool {
    pool: ThreadPool,
}

impl JoinThreadPool {
    pub fn new(num_threads: usize) -> JoinThreadPool {
        let pool = ThreadPoolBuilder::new()
            .num_threads(num_threads.max(1))
            .thread_name(|i| format!("graphannis-join-{}", i))
            .build()
            .expect("failed to start the join thread pool");
        JoinThreadPool { pool }
    }

    pub fn inner(&self) -> &ThreadPool {
        &self.pool
    }

    pub fn num_threads(&self) -> usize {
        self.pool.current_num_threads()
    }
}
