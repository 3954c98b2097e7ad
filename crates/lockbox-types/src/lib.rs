//! Shared vocabulary for the lockbox object store.
//!
//! Every other lockbox crate depends on `lockbox-types`.
//!
//! # Key Types
//!
//! - [`TypedValue`] — An opaque payload plus its declared [`MediaType`]
//! - [`StoreSettings`] — Persistence, capacity and TTL policy of one store
//! - [`StoreDescriptor`] — How a store is named ([`NameResolution`]) and scoped
//! - [`Timestamp`] / [`Clock`] — Wall-clock time for entry metadata

pub mod clock;
pub mod descriptor;
pub mod error;
pub mod settings;
pub mod value;

pub use clock::{Clock, ManualClock, SystemClock, Timestamp};
pub use descriptor::{NameResolution, StoreDescriptor};
pub use error::TypeError;
pub use settings::{StoreSettings, TimeUnit};
pub use value::{MediaType, TypedValue};
