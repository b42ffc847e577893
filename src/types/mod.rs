#![forbid(unsafe_code)]

//! Core identifiers, mutation payloads and the crate-wide error type.

mod context;
mod edge;

use std::fmt;

pub use context::{CancelHandle, MutationContext};
pub use edge::{DirectedEdge, EdgeOp};

/// Identifier of the entity (graph node) a mutation targets.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Default)]
pub struct EntityId(pub u64);

/// Transaction start timestamp used for MVCC visibility in the storage engine.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Default)]
pub struct StartTs(pub u64);

/// Errors raised by the executor and its storage collaborators.
#[derive(thiserror::Error, Debug)]
pub enum ExecutorError {
    /// Underlying I/O failure.
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),
    /// Invalid argument with a static description.
    #[error("invalid argument: {0}")]
    Invalid(&'static str),
    /// Invalid argument with an owned description.
    #[error("invalid argument: {0}")]
    InvalidOwned(String),
    /// The causality context was cancelled.
    #[error("context cancelled")]
    Cancelled,
    /// Storage engine failure.
    #[error("storage: {0}")]
    Storage(String),
    /// Configuration could not be loaded or parsed.
    #[error("config: {0}")]
    Config(String),
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ExecutorError>;

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

impl fmt::Display for StartTs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for EntityId {
    fn from(value: u64) -> Self {
        EntityId(value)
    }
}

impl From<EntityId> for u64 {
    fn from(value: EntityId) -> Self {
        value.0
    }
}

impl From<u64> for StartTs {
    fn from(value: u64) -> Self {
        StartTs(value)
    }
}

impl From<StartTs> for u64 {
    fn from(value: StartTs) -> Self {
        value.0
    }
}
