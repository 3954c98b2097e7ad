//! Embeddable key-value object store.
//!
//! An [`ObjectStoreConnector`] owns a set of named stores and hands out an
//! [`ObjectStoreOperations`] façade over them:
//!
//! ```no_run
//! use lockbox_ops::{ConnectorConfig, ObjectStoreConnector, StoreOptions, TypedValue};
//! use lockbox_ops::{StoreDescriptor, StoreSettings};
//!
//! # fn main() -> Result<(), lockbox_ops::OperationError> {
//! let connector = ObjectStoreConnector::new(ConnectorConfig::default())?;
//! connector.define(StoreDescriptor::top_level("sessions", StoreSettings::in_memory()))?;
//!
//! let ops = connector.operations();
//! ops.store("user-1", Some(TypedValue::text("token")), StoreOptions::default(), Some("sessions"))?;
//! assert!(ops.contains("user-1", Some("sessions"))?);
//! # Ok(())
//! # }
//! ```
//!
//! Single-key calls serialize on a per-key lock, store-wide calls on a
//! per-store lock. Every failure is an [`OperationError`] carrying one
//! [`ErrorKind`].

pub mod config;
pub mod connector;
pub mod definition;
pub mod error;
pub mod operations;

pub use config::{ConnectorConfig, ConsistencyMode, StoreDefinitionConfig, DEFAULT_NAMESPACE};
pub use connector::ObjectStoreConnector;
pub use definition::StoreDefinition;
pub use error::{ConfigError, ErrorKind, OperationError, OperationResult};
pub use operations::{ObjectStoreOperations, StoreOptions};

pub use lockbox_registry::Scope;
pub use lockbox_store::{SweepReport, DEFAULT_PARTITION};
pub use lockbox_types::{
    MediaType, NameResolution, StoreDescriptor, StoreSettings, TimeUnit, TypedValue,
};
