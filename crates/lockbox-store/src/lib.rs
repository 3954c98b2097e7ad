//! Entry storage and eviction for lockbox.
//!
//! A store is a named partition of key/value entries. Every partition
//! implements [`PartitionStore`]; a [`StoreManager`] hands them out by name.
//!
//! # Backends
//!
//! - [`InMemoryPartition`] -- `HashMap` behind a `RwLock`, lost on drop
//! - [`PersistentPartition`] -- in-memory table plus an append-only
//!   [`Journal`] replayed on open
//!
//! # Eviction
//!
//! [`EvictionPolicy`] turns a store's `max_entries`/`entry_ttl` into an
//! [`EvictionPlan`]: expired entries first, then the oldest entries over the
//! limit. [`sweep`] applies a plan to a partition, and [`SweepScheduler`]
//! runs sweeps on a timer for every store that has a policy. Stores without
//! one never get a timer.
//!
//! # Rules
//!
//! 1. Keys are non-empty; values are never absent.
//! 2. `store` never overwrites. Overwrites use `upsert`.
//! 3. Every write stamps creation time and, under a TTL, expiry time.
//! 4. Backend failures are propagated, never swallowed.

pub mod entry;
pub mod error;
pub mod eviction;
pub mod journal;
pub mod manager;
pub mod memory;
pub mod persistent;
pub mod sweeper;
pub mod traits;

// Re-export primary types at crate root for ergonomic imports.
pub use entry::{EntryMeta, StoredEntry};
pub use error::{StoreError, StoreResult};
pub use eviction::{sweep, EvictionPlan, EvictionPolicy, SweepReport};
pub use journal::{Journal, JournalConfig, JournalRecord, SyncMode};
pub use manager::{LocalStoreManager, ManagerConfig, StoreManager, DEFAULT_PARTITION};
pub use memory::InMemoryPartition;
pub use persistent::PersistentPartition;
pub use sweeper::{SweepScheduler, SweepTask};
pub use traits::PartitionStore;
