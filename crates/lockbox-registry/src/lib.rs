//! Registry of live lockbox stores.
//!
//! A store is registered under its name within an owning context (for
//! example an application), and the owning context may have a parent (for
//! example the domain the application is deployed into). A name may be live
//! at most once across a context and its parent.
//!
//! # Modules
//!
//! - [`error`] — Error types for registry operations
//! - [`names`] — Store name validation
//! - [`registry`] — [`StoreRegistry`] and [`Scope`]

pub mod error;
pub mod names;
pub mod registry;

pub use error::{RegistryError, Result};
pub use names::{validate_store_name, MAX_STORE_NAME_LEN};
pub use registry::{Scope, StoreRegistry};
