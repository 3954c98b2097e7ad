use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use lockbox_types::{Clock, StoreSettings, SystemClock};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{StoreError, StoreResult};
use crate::journal::JournalConfig;
use crate::memory::InMemoryPartition;
use crate::persistent::PersistentPartition;
use crate::traits::PartitionStore;

/// Name of the process-wide partition used when no store is referenced.
pub const DEFAULT_PARTITION: &str = "_defaultPartition";

/// Source of partitions for named stores.
///
/// A clustered deployment would back this with a replicated cache; the
/// bundled [`LocalStoreManager`] keeps everything in this process.
pub trait StoreManager: Send + Sync {
    /// Return the partition for `name`, creating it with `settings` if it
    /// does not exist yet. An existing partition is returned as-is.
    fn create_or_get_store(
        &self,
        name: &str,
        settings: &StoreSettings,
    ) -> StoreResult<Arc<dyn PartitionStore>>;

    /// The partition used when an operation names no store. Always available.
    fn default_partition(&self) -> Arc<dyn PartitionStore>;

    /// Close and forget the partition for `name`. Persisted data stays.
    /// Disposing an unknown name is a no-op.
    fn dispose_store(&self, name: &str) -> StoreResult<()>;
}

/// Settings for [`LocalStoreManager`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// Directory holding one journal per persistent store (default: `.lockbox`).
    pub data_dir: PathBuf,
    /// Whether the default partition is journal-backed (default: `false`).
    pub default_partition_persistent: bool,
    pub journal: JournalConfig,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(".lockbox"),
            default_partition_persistent: false,
            journal: JournalConfig::default(),
        }
    }
}

/// In-process store manager.
///
/// Persistent stores become [`PersistentPartition`]s journaled under
/// `data_dir`; the rest are [`InMemoryPartition`]s.
pub struct LocalStoreManager {
    config: ManagerConfig,
    clock: Arc<dyn Clock>,
    default: Arc<dyn PartitionStore>,
    partitions: Mutex<HashMap<String, Arc<dyn PartitionStore>>>,
}

impl LocalStoreManager {
    pub fn new(config: ManagerConfig) -> StoreResult<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// A manager whose partitions stamp entries using `clock`.
    pub fn with_clock(config: ManagerConfig, clock: Arc<dyn Clock>) -> StoreResult<Self> {
        let default: Arc<dyn PartitionStore> = if config.default_partition_persistent {
            Arc::new(open_persistent(&config, DEFAULT_PARTITION, &clock, None)?)
        } else {
            Arc::new(InMemoryPartition::with_clock(
                DEFAULT_PARTITION,
                None,
                Arc::clone(&clock),
            ))
        };
        debug!(
            persistent = config.default_partition_persistent,
            "default partition ready"
        );
        Ok(Self {
            config,
            clock,
            default,
            partitions: Mutex::new(HashMap::new()),
        })
    }

    /// A manager with only in-memory partitions and no data directory use.
    pub fn in_memory() -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        Self {
            config: ManagerConfig::default(),
            default: Arc::new(InMemoryPartition::with_clock(
                DEFAULT_PARTITION,
                None,
                Arc::clone(&clock),
            )),
            clock,
            partitions: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    /// Names of the live partitions, sorted. The default partition is not
    /// included.
    pub fn store_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.partitions.lock().keys().cloned().collect();
        names.sort();
        names
    }

    /// Where the journal for `name` lives.
    pub fn journal_path(&self, name: &str) -> PathBuf {
        journal_path(&self.config.data_dir, name)
    }
}

impl StoreManager for LocalStoreManager {
    fn create_or_get_store(
        &self,
        name: &str,
        settings: &StoreSettings,
    ) -> StoreResult<Arc<dyn PartitionStore>> {
        let mut partitions = self.partitions.lock();
        if let Some(existing) = partitions.get(name) {
            return Ok(Arc::clone(existing));
        }

        settings.validate()?;
        let ttl = settings.entry_ttl();
        let partition: Arc<dyn PartitionStore> = if settings.persistent {
            Arc::new(open_persistent(&self.config, name, &self.clock, ttl)?)
        } else {
            Arc::new(InMemoryPartition::with_clock(name, ttl, Arc::clone(&self.clock)))
        };
        info!(store = name, persistent = settings.persistent, "partition created");
        partitions.insert(name.to_string(), Arc::clone(&partition));
        Ok(partition)
    }

    fn default_partition(&self) -> Arc<dyn PartitionStore> {
        Arc::clone(&self.default)
    }

    fn dispose_store(&self, name: &str) -> StoreResult<()> {
        let Some(partition) = self.partitions.lock().remove(name) else {
            return Ok(());
        };
        partition.close()?;
        info!(store = name, "partition disposed");
        Ok(())
    }
}

impl Drop for LocalStoreManager {
    fn drop(&mut self) {
        for (name, partition) in self.partitions.get_mut().drain() {
            if let Err(e) = partition.close() {
                warn!(store = %name, error = %e, "failed to close partition");
            }
        }
        if let Err(e) = self.default.close() {
            warn!(error = %e, "failed to close default partition");
        }
    }
}

impl std::fmt::Debug for LocalStoreManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalStoreManager")
            .field("data_dir", &self.config.data_dir)
            .field("stores", &self.store_names())
            .finish()
    }
}

fn open_persistent(
    config: &ManagerConfig,
    name: &str,
    clock: &Arc<dyn Clock>,
    ttl: Option<std::time::Duration>,
) -> StoreResult<PersistentPartition> {
    std::fs::create_dir_all(&config.data_dir).map_err(|e| StoreError::NotAvailable {
        store: name.to_string(),
        reason: format!("cannot create {}: {e}", config.data_dir.display()),
    })?;
    let path = journal_path(&config.data_dir, name);
    PersistentPartition::open(name, &path, ttl, Arc::clone(clock), config.journal.clone())
}

fn journal_path(data_dir: &Path, name: &str) -> PathBuf {
    data_dir.join(format!("{}.journal", escape_file_name(name)))
}

/// Percent-encode everything except ASCII alphanumerics, `-` and `.`, so
/// any store name maps to one safe, distinct file name.
fn escape_file_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for byte in name.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'.' {
            out.push(byte as char);
        } else {
            out.push_str(&format!("%{byte:02X}"));
        }
    }
    out
}
