//! Error types for the cache engine
//!
//! Provides unified error handling using thiserror.

use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for the cache engine and its worker pool.
///
/// A plain miss is never an error: reads return `Ok(None)` for it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// Empty key, zero TTL, empty pattern
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Stored value cannot be read as the requested type
    #[error("Type mismatch for key '{key}': expected {expected}, found {found}")]
    TypeMismatch {
        key: String,
        expected: &'static str,
        found: &'static str,
    },

    /// Worker pool queue is full
    #[error("Task rejected: {0}")]
    Rejected(String),

    /// Worker pool runtime could not be started
    #[error("Worker pool failed to start: {0}")]
    PoolInit(String),

    /// Worker pool no longer accepts tasks
    #[error("Worker pool is shut down")]
    PoolShutdown,

    /// An async task failed; only ever logged by the worker
    #[error("Async task failed: {0}")]
    TaskFailed(String),
}

impl CacheError {
    /// Shorthand for an `InvalidArgument` error.
    pub fn invalid(msg: impl Into<String>) -> Self {
        CacheError::InvalidArgument(msg.into())
    }
}

// == Result Type Alias ==
/// Convenience Result type for the cache engine.
pub type Result<T> = std::result::Result<T, CacheError>;
