//! Error types for registry operations.

use thiserror::Error;

/// Errors that can occur while registering a store.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// A live store already uses this name in the same or the parent context.
    #[error("a store named '{name}' already exists in context {}", context.as_deref().unwrap_or("<root>"))]
    DuplicateStoreName {
        name: String,
        context: Option<String>,
    },

    /// The store name cannot be registered.
    #[error("invalid store name {name:?}: {reason}")]
    InvalidStoreName { name: String, reason: String },
}

/// Convenience type alias for registry operations.
pub type Result<T> = std::result::Result<T, RegistryError>;
