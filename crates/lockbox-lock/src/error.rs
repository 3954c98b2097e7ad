//! Error types for lock operations.

use thiserror::Error;

/// Errors that can occur while acquiring or releasing a named lock.
#[derive(Debug, Error)]
pub enum LockError {
    /// The lock backend could not grant the lock. Retryable.
    #[error("lock '{id}' is unavailable: {reason}")]
    Unavailable { id: String, reason: String },

    /// The lock was not acquired within the allowed time. Retryable.
    #[error("timed out after {waited_ms}ms waiting for lock '{id}'")]
    Timeout { id: String, waited_ms: u64 },

    /// The calling thread tried to release a lock it does not hold.
    #[error("lock '{id}' is not held by the current thread")]
    NotOwner { id: String },
}

/// Convenience type alias for lock operations.
pub type LockResult<T> = std::result::Result<T, LockError>;
