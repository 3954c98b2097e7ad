use std::fmt;
use std::path::PathBuf;

use lockbox_lock::LockError;
use lockbox_registry::RegistryError;
use lockbox_store::StoreError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Classification of a failed operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// The key is missing or blank.
    InvalidKey,
    /// A null value was given and strict null handling was requested.
    NullValue,
    /// `fail_if_present` was set and the key is occupied.
    KeyAlreadyExists,
    /// The key is absent and there was no usable default.
    KeyNotFound,
    /// The named store was never declared.
    StoreNotFound,
    /// The store or its lock backend cannot serve the call right now.
    StoreNotAvailable,
    /// A store with the same name is live in the same or the parent context.
    DuplicateStoreName,
    /// Anything else; the source carries the cause.
    Any,
}

impl ErrorKind {
    /// Stable identifier, e.g. `KEY_NOT_FOUND`.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidKey => "INVALID_KEY",
            Self::NullValue => "NULL_VALUE",
            Self::KeyAlreadyExists => "KEY_ALREADY_EXISTS",
            Self::KeyNotFound => "KEY_NOT_FOUND",
            Self::StoreNotFound => "STORE_NOT_FOUND",
            Self::StoreNotAvailable => "STORE_NOT_AVAILABLE",
            Self::DuplicateStoreName => "DUPLICATE_STORE_NAME",
            Self::Any => "ANY",
        }
    }

    /// Returns `true` if retrying the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::StoreNotAvailable)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

const INVALID_KEY_MESSAGE: &str = "key cannot be null nor blank";

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The one error every façade call fails with: a kind, a message for
/// operators, and the backend error that caused it, if any.
#[derive(Debug, Error)]
#[error("{kind}: {message}")]
pub struct OperationError {
    kind: ErrorKind,
    message: String,
    #[source]
    source: Option<BoxError>,
}

impl OperationError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    /// Attach the underlying cause.
    pub fn with_source(mut self, source: impl Into<BoxError>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }

    pub(crate) fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub(crate) fn invalid_key() -> Self {
        Self::new(ErrorKind::InvalidKey, INVALID_KEY_MESSAGE)
    }

    pub(crate) fn null_value() -> Self {
        Self::new(
            ErrorKind::NullValue,
            "a null value was provided; provide a value or set fail_on_null_value to false",
        )
    }

    pub(crate) fn store_not_found(name: &str) -> Self {
        Self::new(
            ErrorKind::StoreNotFound,
            format!("no store named '{name}' has been declared"),
        )
    }

    pub(crate) fn not_initialised(name: &str) -> Self {
        Self::new(
            ErrorKind::StoreNotAvailable,
            format!("store '{name}' is declared but not initialised"),
        )
    }

    /// Classify a backend failure raised while operating on `store`.
    pub(crate) fn from_store(err: StoreError, store: &str, key: Option<&str>) -> Self {
        let key = key.unwrap_or_default();
        let (kind, message) = match &err {
            StoreError::KeyNotFound { .. } => (
                ErrorKind::KeyNotFound,
                format!("key '{key}' does not exist in store '{store}'"),
            ),
            StoreError::KeyAlreadyExists { .. } => (
                ErrorKind::KeyAlreadyExists,
                format!("key '{key}' is already present in store '{store}'"),
            ),
            StoreError::InvalidKey => (ErrorKind::InvalidKey, INVALID_KEY_MESSAGE.to_string()),
            StoreError::NotAvailable { .. } | StoreError::Closed(_) => (
                ErrorKind::StoreNotAvailable,
                format!("store '{store}' is not available at the moment"),
            ),
            StoreError::RateLimited { .. } => (
                ErrorKind::StoreNotAvailable,
                format!("store '{store}' is rate limited; retry later"),
            ),
            StoreError::Settings(_) => (
                ErrorKind::Any,
                format!("store '{store}' has invalid settings"),
            ),
            StoreError::Serialization(_) | StoreError::Io(_) => (
                ErrorKind::Any,
                format!("found error trying to access store '{store}'"),
            ),
        };
        Self::new(kind, message).with_source(err)
    }

    pub(crate) fn from_lock(err: LockError) -> Self {
        let kind = match err {
            LockError::Unavailable { .. } | LockError::Timeout { .. } => ErrorKind::StoreNotAvailable,
            LockError::NotOwner { .. } => ErrorKind::Any,
        };
        Self::new(kind, "could not acquire the store lock").with_source(err)
    }

    pub(crate) fn from_registry(err: RegistryError) -> Self {
        let kind = match err {
            RegistryError::DuplicateStoreName { .. } => ErrorKind::DuplicateStoreName,
            RegistryError::InvalidStoreName { .. } => ErrorKind::Any,
        };
        Self::new(kind, err.to_string()).with_source(err)
    }
}

impl From<RegistryError> for OperationError {
    fn from(err: RegistryError) -> Self {
        Self::from_registry(err)
    }
}

/// Result alias for façade operations.
pub type OperationResult<T> = Result<T, OperationError>;

/// Errors while loading a [`ConnectorConfig`](crate::ConnectorConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid store declaration: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn rate_limiting_is_worded_distinctly() {
        let unavailable = OperationError::from_store(
            StoreError::NotAvailable {
                store: "s".into(),
                reason: "down".into(),
            },
            "s",
            None,
        );
        let limited = OperationError::from_store(
            StoreError::RateLimited {
                store: "s".into(),
                reason: "429".into(),
            },
            "s",
            None,
        );
        assert_eq!(unavailable.kind(), ErrorKind::StoreNotAvailable);
        assert_eq!(limited.kind(), ErrorKind::StoreNotAvailable);
        assert!(limited.message().contains("rate limited"));
        assert!(!unavailable.message().contains("rate limited"));
        assert!(limited.is_retryable());
    }

    #[test]
    fn source_is_preserved() {
        let err = OperationError::from_store(
            StoreError::Io(std::io::Error::other("disk gone")),
            "s",
            Some("k"),
        );
        assert_eq!(err.kind(), ErrorKind::Any);
        assert!(err.source().unwrap().to_string().contains("disk gone"));
    }

    #[test]
    fn key_errors_name_the_key() {
        let err = OperationError::from_store(
            StoreError::KeyNotFound {
                store: "s".into(),
                key: "k".into(),
            },
            "s",
            Some("k"),
        );
        assert_eq!(err.kind(), ErrorKind::KeyNotFound);
        assert_eq!(err.to_string(), "KEY_NOT_FOUND: key 'k' does not exist in store 's'");
    }

    #[test]
    fn lock_backend_failure_is_retryable() {
        let err = OperationError::from_lock(LockError::Unavailable {
            id: "ns_s".into(),
            reason: "partition".into(),
        });
        assert_eq!(err.kind(), ErrorKind::StoreNotAvailable);
        assert!(err.is_retryable());
    }

    #[test]
    fn registry_duplicates_keep_their_kind() {
        let err: OperationError = RegistryError::DuplicateStoreName {
            name: "s".into(),
            context: None,
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::DuplicateStoreName);
    }
}
