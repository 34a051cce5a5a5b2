use thiserror::Error;

use crate::types::Component;

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum GraphAnnisCoreError {
    #[error("could not find implementation for graph storage with name '{0}'")]
    UnknownGraphStorageImpl(String),
    #[error("can't load component with empty path")]
    EmptyComponentPath,
    #[error("component {0} is missing")]
    MissingComponent(String),
    #[error("component {0} was not loaded")]
    ComponentNotLoaded(String),
    #[error("component {0} is not writable")]
    ReadOnlyComponent(String),
    #[error("linear graph storage only valid for rooted trees with fan-out <= 1")]
    InvalidLinearStorage,
    #[error("source graph statistics do not fit the chosen storage implementation")]
    UnsuitableSourceGraph,
    #[error(transparent)]
    BincodeSerialization(#[from] bincode::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl GraphAnnisCoreError {
    pub fn missing_component(c: &Component) -> GraphAnnisCoreError {
        GraphAnnisCoreError::MissingComponent(c.to_string())
    }
}

pub type Result<T> = std::result::Result<T, GraphAnnisCoreError>;
