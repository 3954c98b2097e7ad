use std::collections::BTreeMap;
use std::sync::Arc;

use lockbox_store::{PartitionStore, StoreError, StoreResult, SweepReport};
use lockbox_types::TypedValue;
use tracing::debug;

use crate::config::ConsistencyMode;
use crate::connector::{sweep_under_lock, ConnectorCore, LiveStore};
use crate::error::{ErrorKind, OperationError, OperationResult};

/// Caller policy for [`ObjectStoreOperations::store`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StoreOptions {
    /// Fail with `KeyAlreadyExists` instead of overwriting (default: `false`).
    pub fail_if_present: bool,
    /// Fail with `NullValue` on a missing value instead of doing nothing
    /// (default: `true`).
    pub fail_on_null_value: bool,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            fail_if_present: false,
            fail_on_null_value: true,
        }
    }
}

impl StoreOptions {
    pub fn fail_if_present() -> Self {
        Self {
            fail_if_present: true,
            ..Self::default()
        }
    }

    pub fn lenient_nulls() -> Self {
        Self {
            fail_on_null_value: false,
            ..Self::default()
        }
    }
}

/// The public operation surface.
///
/// Every call names its store (or `None` for the default partition), takes
/// the key lock for single-key operations or the store lock for `clear` and
/// listings, and reports failures as one [`OperationError`]. Validation
/// failures are raised before any lock is taken.
#[derive(Clone)]
pub struct ObjectStoreOperations {
    core: Arc<ConnectorCore>,
}

impl ObjectStoreOperations {
    pub(crate) fn new(core: Arc<ConnectorCore>) -> Self {
        Self { core }
    }

    /// Store `value` under `key`.
    ///
    /// A `None` value is rejected with `NullValue`, or silently ignored when
    /// `fail_on_null_value` is off. An occupied key is overwritten unless
    /// `fail_if_present` is set.
    pub fn store(
        &self,
        key: &str,
        value: Option<TypedValue>,
        options: StoreOptions,
        store: Option<&str>,
    ) -> OperationResult<()> {
        let Some(value) = value else {
            if options.fail_on_null_value {
                return Err(OperationError::null_value());
            }
            debug!(key, "null value ignored");
            return Ok(());
        };
        validate_key(key)?;
        let live = self.resolve(store)?;

        self.with_key_lock(&live, key, |partition| {
            if options.fail_if_present {
                partition.store(key, value)
            } else {
                partition.upsert(key, value)
            }
        })?;
        debug!(store = %live.name, key, "stored");
        Ok(())
    }

    /// The value under `key`, or `default` if the key is absent.
    ///
    /// A default is returned as given and is not written to the store.
    pub fn retrieve(
        &self,
        key: &str,
        default: Option<TypedValue>,
        store: Option<&str>,
    ) -> OperationResult<TypedValue> {
        validate_key(key)?;
        let live = self.resolve(store)?;

        self.with_key_lock(&live, key, |partition| match (partition.retrieve(key), default) {
            (Err(StoreError::KeyNotFound { .. }), Some(default)) => {
                debug!(key, "key absent; returning default value");
                Ok(default)
            }
            (found, _) => found,
        })
        .map_err(|e| {
            if e.kind() == ErrorKind::KeyNotFound {
                e.with_message(format!(
                    "store '{}' doesn't contain any value for key '{key}' and no default value was provided",
                    live.name
                ))
            } else {
                e
            }
        })
    }

    /// Delete `key`, returning its value.
    pub fn remove(&self, key: &str, store: Option<&str>) -> OperationResult<TypedValue> {
        validate_key(key)?;
        let live = self.resolve(store)?;
        let removed = self.with_key_lock(&live, key, |partition| partition.remove(key))?;
        debug!(store = %live.name, key, "removed");
        Ok(removed)
    }

    /// Whether `key` holds a value. Absence is `Ok(false)`.
    pub fn contains(&self, key: &str, store: Option<&str>) -> OperationResult<bool> {
        validate_key(key)?;
        let live = self.resolve(store)?;
        self.with_key_lock(&live, key, |partition| partition.contains(key))
    }

    /// Delete every entry in the store.
    pub fn clear(&self, store: Option<&str>) -> OperationResult<()> {
        let live = self.resolve(store)?;
        self.with_store_lock(&live, |partition| partition.clear())?;
        debug!(store = %live.name, "cleared");
        Ok(())
    }

    /// Every key in the store, sorted. Empty for an empty store.
    pub fn retrieve_all_keys(&self, store: Option<&str>) -> OperationResult<Vec<String>> {
        let live = self.resolve(store)?;
        self.with_store_lock(&live, |partition| partition.all_keys())
    }

    /// Every entry in the store. Empty for an empty store.
    pub fn retrieve_all(
        &self,
        store: Option<&str>,
    ) -> OperationResult<BTreeMap<String, TypedValue>> {
        let live = self.resolve(store)?;
        self.with_store_lock(&live, |partition| partition.retrieve_all())
    }

    /// Run the store's eviction policy now. A store without a policy reports
    /// nothing removed.
    pub fn sweep(&self, store: Option<&str>) -> OperationResult<SweepReport> {
        let live = self.resolve(store)?;
        sweep_under_lock(
            self.core.locks.as_ref(),
            &self.core.namespace,
            self.core.lock_timeout,
            &live,
            self.core.clock.as_ref(),
        )
        .map_err(|e| OperationError::from_store(e, &live.name, None))
    }

    fn resolve(&self, store: Option<&str>) -> OperationResult<LiveStore> {
        let Some(name) = store else {
            return Ok(self.core.default_store.clone());
        };
        if let Some(live) = self.core.registry.lookup_hierarchical(name, &self.core.scope) {
            return Ok(live);
        }
        if self.core.is_declared(name) {
            Err(OperationError::not_initialised(name))
        } else {
            Err(OperationError::store_not_found(name))
        }
    }

    fn with_key_lock<T>(
        &self,
        live: &LiveStore,
        key: &str,
        op: impl FnOnce(&dyn PartitionStore) -> StoreResult<T>,
    ) -> OperationResult<T> {
        let _store_guard = match self.core.consistency {
            ConsistencyMode::StoreSerialized => Some(self.core.store_lock(live)?),
            ConsistencyMode::KeyLockOnly => None,
        };
        let _key_guard = self.core.key_lock(live, key)?;
        op(live.partition.as_ref()).map_err(|e| OperationError::from_store(e, &live.name, Some(key)))
    }

    fn with_store_lock<T>(
        &self,
        live: &LiveStore,
        op: impl FnOnce(&dyn PartitionStore) -> StoreResult<T>,
    ) -> OperationResult<T> {
        let _guard = self.core.store_lock(live)?;
        op(live.partition.as_ref()).map_err(|e| OperationError::from_store(e, &live.name, None))
    }
}

impl std::fmt::Debug for ObjectStoreOperations {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectStoreOperations")
            .field("namespace", &self.core.namespace)
            .field("scope", &self.core.scope)
            .field("consistency", &self.core.consistency)
            .finish()
    }
}

fn validate_key(key: &str) -> OperationResult<()> {
    if key.trim().is_empty() {
        return Err(OperationError::invalid_key());
    }
    Ok(())
}
