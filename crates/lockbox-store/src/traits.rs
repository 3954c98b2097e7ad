use std::collections::BTreeMap;

use lockbox_types::TypedValue;
use tracing::debug;

use crate::entry::EntryMeta;
use crate::error::{StoreError, StoreResult};

/// One named key-value partition.
///
/// All implementations must satisfy these invariants:
/// - Keys are non-empty and unique within the partition.
/// - `store` never overwrites: an occupied key yields `KeyAlreadyExists`.
///   Overwrites go through [`PartitionStore::upsert`].
/// - Every write stamps the entry with its creation time and, when the
///   partition has a TTL, its expiration time.
/// - Listing an empty partition succeeds with an empty result.
/// - Backend failures are reported, never silently ignored.
///
/// Implementations are internally synchronised for single calls. Compound
/// sequences (check-then-act) are the caller's job, via the lock manager.
pub trait PartitionStore: Send + Sync {
    /// The partition's name.
    fn name(&self) -> &str;

    /// Whether the key holds a value. A missing key is `Ok(false)`.
    fn contains(&self, key: &str) -> StoreResult<bool>;

    /// Store a value under a free key.
    fn store(&self, key: &str, value: TypedValue) -> StoreResult<()>;

    /// Read the value for a key; `KeyNotFound` if absent.
    fn retrieve(&self, key: &str) -> StoreResult<TypedValue>;

    /// Delete a key and return its value; `KeyNotFound` if absent.
    fn remove(&self, key: &str) -> StoreResult<TypedValue>;

    /// Delete every entry.
    fn clear(&self) -> StoreResult<()>;

    /// All keys, sorted.
    fn all_keys(&self) -> StoreResult<Vec<String>>;

    /// All entries, keyed and sorted by key.
    fn retrieve_all(&self) -> StoreResult<BTreeMap<String, TypedValue>>;

    /// Creation/expiration metadata of every entry, for eviction.
    fn entry_metadata(&self) -> StoreResult<Vec<EntryMeta>>;

    /// Overwrite-or-create.
    ///
    /// The default is a remove-then-store pair for backends without an
    /// atomic primitive. It is only atomic when the caller holds an exclusive
    /// key lock. Under a lenient lock another writer can slip in between the
    /// two calls; the resulting `KeyNotFound`/`KeyAlreadyExists` are
    /// swallowed and the other writer's value wins.
    fn upsert(&self, key: &str, value: TypedValue) -> StoreResult<()> {
        let outcome = match self.remove(key) {
            Ok(_) | Err(StoreError::KeyNotFound { .. }) => self.store(key, value),
            Err(e) => Err(e),
        };
        match outcome {
            Err(StoreError::KeyAlreadyExists { .. }) | Err(StoreError::KeyNotFound { .. }) => {
                debug!(store = self.name(), key, "concurrent writer won the upsert race");
                Ok(())
            }
            other => other,
        }
    }

    /// Release any resources held by the partition. Persisted data remains.
    fn close(&self) -> StoreResult<()> {
        Ok(())
    }
}

pub(crate) fn ensure_key(key: &str) -> StoreResult<()> {
    if key.is_empty() {
        return Err(StoreError::InvalidKey);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryPartition;
    use parking_lot::Mutex;

    /// Partition that only implements the required methods, so `upsert`
    /// falls back to the trait default.
    struct PlainPartition {
        inner: InMemoryPartition,
        /// When set, the next `store` pretends a racing writer got there first.
        race_on_store: Mutex<bool>,
    }

    impl PlainPartition {
        fn new() -> Self {
            Self {
                inner: InMemoryPartition::new("plain"),
                race_on_store: Mutex::new(false),
            }
        }
    }

    impl PartitionStore for PlainPartition {
        fn name(&self) -> &str {
            self.inner.name()
        }
        fn contains(&self, key: &str) -> StoreResult<bool> {
            self.inner.contains(key)
        }
        fn store(&self, key: &str, value: TypedValue) -> StoreResult<()> {
            let mut race = self.race_on_store.lock();
            if *race {
                *race = false;
                self.inner.store(key, TypedValue::text("racer"))?;
            }
            self.inner.store(key, value)
        }
        fn retrieve(&self, key: &str) -> StoreResult<TypedValue> {
            self.inner.retrieve(key)
        }
        fn remove(&self, key: &str) -> StoreResult<TypedValue> {
            self.inner.remove(key)
        }
        fn clear(&self) -> StoreResult<()> {
            self.inner.clear()
        }
        fn all_keys(&self) -> StoreResult<Vec<String>> {
            self.inner.all_keys()
        }
        fn retrieve_all(&self) -> StoreResult<BTreeMap<String, TypedValue>> {
            self.inner.retrieve_all()
        }
        fn entry_metadata(&self) -> StoreResult<Vec<EntryMeta>> {
            self.inner.entry_metadata()
        }
    }

    #[test]
    fn default_upsert_creates_missing_key() {
        let p = PlainPartition::new();
        p.upsert("k", TypedValue::text("v1")).unwrap();
        assert_eq!(p.retrieve("k").unwrap(), TypedValue::text("v1"));
    }

    #[test]
    fn default_upsert_overwrites_existing_key() {
        let p = PlainPartition::new();
        p.store("k", TypedValue::text("v1")).unwrap();
        p.upsert("k", TypedValue::text("v2")).unwrap();
        assert_eq!(p.retrieve("k").unwrap(), TypedValue::text("v2"));
    }

    #[test]
    fn default_upsert_tolerates_racing_writer() {
        let p = PlainPartition::new();
        *p.race_on_store.lock() = true;
        p.upsert("k", TypedValue::text("mine")).unwrap();
        // The racing writer got in between remove and store and kept its value.
        assert_eq!(p.retrieve("k").unwrap(), TypedValue::text("racer"));
    }

    #[test]
    fn ensure_key_rejects_empty() {
        assert!(matches!(ensure_key(""), Err(StoreError::InvalidKey)));
        assert!(ensure_key("k").is_ok());
    }
}
