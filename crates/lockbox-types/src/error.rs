use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid store settings: {0}")]
    InvalidSettings(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}
