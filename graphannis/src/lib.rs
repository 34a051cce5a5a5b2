//! Operators, query planning and join executors of the graphANNIS linguistic
//! query engine, plus the [`storage::CorpusStorage`] façade that exposes
//! `count`/`find` over a cache of loaded [`corpus::Corpus`]es (spec.md §6).
//! The low-level string pool, annotation index and graph storages live in
//! `graphannis-core`; this crate only knows "what a query is".

pub mod config;
pub mod corpus;
pub mod errors;
pub mod exec;
pub mod join;
pub mod operator;
pub mod plan;
pub mod query;
pub mod storage;
pub mod threadpool;
pub mod util;

pub use config::Config;
pub use corpus::Corpus;
pub use errors::{GraphAnnisError, Result};
pub use query::{JoinSpec, NodeSpec, Query};
pub use storage::CorpusStorage;
