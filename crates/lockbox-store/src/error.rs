use lockbox_types::TypeError;

/// Errors from partition store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The partition holds no entry for the key.
    #[error("store '{store}' has no value for key '{key}'")]
    KeyNotFound { store: String, key: String },

    /// The partition already holds an entry for the key.
    #[error("store '{store}' already contains a value for key '{key}'")]
    KeyAlreadyExists { store: String, key: String },

    /// Keys must be non-empty.
    #[error("invalid key: keys cannot be empty")]
    InvalidKey,

    /// The backing medium cannot be reached right now. Retryable.
    #[error("store '{store}' is not available: {reason}")]
    NotAvailable { store: String, reason: String },

    /// The backing medium is throttling requests. Retryable.
    #[error("store '{store}' is rate limited: {reason}")]
    RateLimited { store: String, reason: String },

    /// The partition was disposed and no longer accepts calls.
    #[error("store '{0}' is closed")]
    Closed(String),

    /// Store settings were rejected.
    #[error("invalid settings: {0}")]
    Settings(#[from] TypeError),

    /// Serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// I/O error from the underlying storage backend.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// Returns `true` for transient backend conditions worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::NotAvailable { .. } | Self::RateLimited { .. })
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
