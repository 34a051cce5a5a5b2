use thiserror::Error;

/// Error kinds surfaced at the query boundary (§7). Predicate-level problems
/// (unknown strings, an unparsable regex, a missing component) are *not*
/// represented here: the policy is to degrade silently to an empty iterator
/// or a zero estimate, since an intersection over candidates is allowed to be
/// empty. Only structural problems are errors.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum GraphAnnisError {
    /// The query's node/operator graph does not form a single connected
    /// component, or references an unknown node index (§4.5 planner totality,
    /// §8 scenario 4).
    #[error("query is not fully connected: {0}")]
    InvalidQuery(String),
    /// A component required to build an operator is missing from the corpus.
    #[error("component not available: {0}")]
    ComponentMissing(String),
    /// Loading or saving a corpus failed; the corpus is left in its previous
    /// state.
    #[error(transparent)]
    StorageIO(#[from] graphannis_core::errors::GraphAnnisCoreError),
    /// A storage was evicted from the cache while a query referencing it was
    /// still running.
    #[error("corpus '{0}' is no longer loaded")]
    CorpusUnavailable(String),
    /// An invariant the engine relies on was violated; in debug builds this
    /// kind of error would instead panic.
    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, GraphAnnisError>;

impl From<std::io::Error> for GraphAnnisError {
    fn from(e: std::io::Error) -> Self {
        GraphAnnisError::StorageIO(graphannis_core::errors::GraphAnnisCoreError::Io(e))
    }
}
