//! Error taxonomy for the engine. One variant per failure class; nothing here
//! is retried internally, errors are always surfaced to the caller.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("shape mismatch: expected width {expected}, got {got}")]
    ShapeMismatch { expected: usize, got: usize },

    #[error("too few items: nlist {nlist} exceeds N {n}")]
    TooFewItems { nlist: usize, n: usize },

    #[error("index has not been configured yet: call configure() first")]
    NotConfigured,

    #[error("index is empty")]
    EmptyIndex,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("corrupt snapshot: {0}")]
    CorruptSnapshot(String),

    #[error("corrupt snapshot: failed to decode payload")]
    CorruptSnapshotPayload(#[from] bincode::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;
