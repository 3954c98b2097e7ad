use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use lockbox_types::{Clock, TypedValue};
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::entry::EntryMeta;
use crate::error::{StoreError, StoreResult};
use crate::journal::{Journal, JournalConfig, JournalRecord};
use crate::memory::EntryTable;
use crate::traits::{ensure_key, PartitionStore};

/// Partition whose contents survive a process restart.
///
/// Entries are served from memory. Every mutation is appended to the
/// partition's [`Journal`] before it is applied, while the table's write
/// lock is held, so the journal order always matches the in-memory order.
/// Opening a partition replays its journal.
pub struct PersistentPartition {
    name: String,
    ttl: Option<Duration>,
    clock: Arc<dyn Clock>,
    table: RwLock<EntryTable>,
    journal: Journal,
    closed: AtomicBool,
}

impl PersistentPartition {
    /// Open the partition backed by the journal at `path`, replaying any
    /// records already there.
    pub fn open(
        name: impl Into<String>,
        path: &Path,
        ttl: Option<Duration>,
        clock: Arc<dyn Clock>,
        config: JournalConfig,
    ) -> StoreResult<Self> {
        let name = name.into();
        let journal = Journal::open(path, config)?;
        let mut table = EntryTable::new();
        let records = journal.recover()?;
        let replayed = records.len();
        for record in records {
            match record {
                JournalRecord::Put(entry) => {
                    table.insert(entry);
                }
                JournalRecord::Remove { key } => {
                    table.remove(&key);
                }
            }
        }
        info!(store = %name, replayed, live = table.len(), "persistent partition opened");

        Ok(Self {
            name,
            ttl,
            clock,
            table: RwLock::new(table),
            journal,
            closed: AtomicBool::new(false),
        })
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.table.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The backing journal.
    pub fn journal(&self) -> &Journal {
        &self.journal
    }

    fn ensure_open(&self) -> StoreResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StoreError::Closed(self.name.clone()));
        }
        Ok(())
    }

    fn not_found(&self, key: &str) -> StoreError {
        StoreError::KeyNotFound {
            store: self.name.clone(),
            key: key.to_string(),
        }
    }

    /// Map a failed journal write to the retryable "not available" kind.
    fn unavailable(&self, err: StoreError) -> StoreError {
        match err {
            StoreError::Io(e) => StoreError::NotAvailable {
                store: self.name.clone(),
                reason: e.to_string(),
            },
            other => other,
        }
    }

    fn maybe_compact(&self, table: &EntryTable) {
        if !self.journal.needs_compaction(table.len()) {
            return;
        }
        if let Err(e) = self.journal.rewrite(&table.snapshot()) {
            warn!(store = %self.name, error = %e, "journal compaction failed; will retry on a later write");
        }
    }

    fn write_entry(&self, key: &str, value: TypedValue, overwrite: bool) -> StoreResult<()> {
        ensure_key(key)?;
        self.ensure_open()?;
        let mut table = self.table.write();
        if !overwrite && table.contains(key) {
            return Err(StoreError::KeyAlreadyExists {
                store: self.name.clone(),
                key: key.to_string(),
            });
        }
        let entry = table.prepare(key, value, self.clock.now(), self.ttl);
        let record = JournalRecord::Put(entry);
        self.journal.append(&record).map_err(|e| self.unavailable(e))?;
        let JournalRecord::Put(entry) = record else {
            unreachable!("record was built as a put")
        };
        table.insert(entry);
        self.maybe_compact(&table);
        Ok(())
    }
}

impl PartitionStore for PersistentPartition {
    fn name(&self) -> &str {
        &self.name
    }

    fn contains(&self, key: &str) -> StoreResult<bool> {
        ensure_key(key)?;
        self.ensure_open()?;
        Ok(self.table.read().contains(key))
    }

    fn store(&self, key: &str, value: TypedValue) -> StoreResult<()> {
        self.write_entry(key, value, false)
    }

    fn retrieve(&self, key: &str) -> StoreResult<TypedValue> {
        ensure_key(key)?;
        self.ensure_open()?;
        self.table
            .read()
            .get(key)
            .map(|e| e.value.clone())
            .ok_or_else(|| self.not_found(key))
    }

    fn remove(&self, key: &str) -> StoreResult<TypedValue> {
        ensure_key(key)?;
        self.ensure_open()?;
        let mut table = self.table.write();
        if !table.contains(key) {
            return Err(self.not_found(key));
        }
        self.journal
            .append(&JournalRecord::Remove {
                key: key.to_string(),
            })
            .map_err(|e| self.unavailable(e))?;
        let removed = table.remove(key).ok_or_else(|| self.not_found(key))?;
        self.maybe_compact(&table);
        Ok(removed.value)
    }

    fn clear(&self) -> StoreResult<()> {
        self.ensure_open()?;
        let mut table = self.table.write();
        self.journal.truncate().map_err(|e| self.unavailable(e))?;
        table.clear();
        debug!(store = %self.name, "persistent partition cleared");
        Ok(())
    }

    fn all_keys(&self) -> StoreResult<Vec<String>> {
        self.ensure_open()?;
        Ok(self.table.read().keys())
    }

    fn retrieve_all(&self) -> StoreResult<BTreeMap<String, TypedValue>> {
        self.ensure_open()?;
        Ok(self.table.read().values())
    }

    fn entry_metadata(&self) -> StoreResult<Vec<EntryMeta>> {
        self.ensure_open()?;
        Ok(self.table.read().metadata())
    }

    fn upsert(&self, key: &str, value: TypedValue) -> StoreResult<()> {
        self.write_entry(key, value, true)
    }

    fn close(&self) -> StoreResult<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.journal.sync()?;
        info!(store = %self.name, "persistent partition closed");
        Ok(())
    }
}

impl std::fmt::Debug for PersistentPartition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistentPartition")
            .field("name", &self.name)
            .field("journal", &self.journal.path())
            .field("entry_count", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lockbox_types::{ManualClock, SystemClock, Timestamp};

    fn open(path: &Path) -> PersistentPartition {
        PersistentPartition::open("p", path, None, Arc::new(SystemClock), JournalConfig::default())
            .unwrap()
    }

    #[test]
    fn writes_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("p.journal");
        {
            let p = open(&path);
            p.store("a", TypedValue::text("1")).unwrap();
            p.store("b", TypedValue::text("2")).unwrap();
            p.upsert("a", TypedValue::text("1b")).unwrap();
            p.remove("b").unwrap();
            p.close().unwrap();
        }

        let p = open(&path);
        assert_eq!(p.all_keys().unwrap(), vec!["a"]);
        assert_eq!(p.retrieve("a").unwrap(), TypedValue::text("1b"));
    }

    #[test]
    fn clear_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("p.journal");
        {
            let p = open(&path);
            p.store("a", TypedValue::text("1")).unwrap();
            p.clear().unwrap();
            p.store("b", TypedValue::text("2")).unwrap();
        }
        let p = open(&path);
        assert_eq!(p.all_keys().unwrap(), vec!["b"]);
    }

    #[test]
    fn metadata_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("p.journal");
        let clock = Arc::new(ManualClock::new(Timestamp::from_millis(10_000)));
        {
            let p = PersistentPartition::open(
                "p",
                &path,
                Some(Duration::from_secs(5)),
                clock.clone(),
                JournalConfig::default(),
            )
            .unwrap();
            p.store("k", TypedValue::text("v")).unwrap();
        }
        let p = PersistentPartition::open("p", &path, None, clock, JournalConfig::default()).unwrap();
        let meta = p.entry_metadata().unwrap();
        assert_eq!(meta[0].created_at, Timestamp::from_millis(10_000));
        assert_eq!(meta[0].expires_at, Some(Timestamp::from_millis(15_000)));
    }

    #[test]
    fn sequence_continues_after_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("p.journal");
        {
            let p = open(&path);
            p.store("old", TypedValue::text("1")).unwrap();
        }
        let p = open(&path);
        p.store("new", TypedValue::text("2")).unwrap();
        let mut meta = p.entry_metadata().unwrap();
        meta.sort_by_key(EntryMeta::age_order);
        assert_eq!(meta[0].key, "old");
        assert!(meta[1].seq > meta[0].seq);
    }

    #[test]
    fn store_rejects_occupied_key() {
        let dir = tempfile::tempdir().unwrap();
        let p = open(&dir.path().join("p.journal"));
        p.store("k", TypedValue::text("1")).unwrap();
        assert!(matches!(
            p.store("k", TypedValue::text("2")),
            Err(StoreError::KeyAlreadyExists { .. })
        ));
    }

    #[test]
    fn overwrites_trigger_compaction() {
        let dir = tempfile::tempdir().unwrap();
        let config = JournalConfig {
            compaction_slack: 4,
            ..JournalConfig::default()
        };
        let p = PersistentPartition::open(
            "p",
            &dir.path().join("p.journal"),
            None,
            Arc::new(SystemClock),
            config,
        )
        .unwrap();
        for i in 0..20 {
            p.upsert("hot", TypedValue::text(i.to_string())).unwrap();
        }
        assert!(p.journal().record_count() <= 5);
        assert_eq!(p.retrieve("hot").unwrap(), TypedValue::text("19"));
    }

    #[test]
    fn closed_partition_rejects_calls() {
        let dir = tempfile::tempdir().unwrap();
        let p = open(&dir.path().join("p.journal"));
        p.close().unwrap();
        p.close().unwrap();
        assert!(matches!(p.contains("k"), Err(StoreError::Closed(_))));
        assert!(matches!(
            p.store("k", TypedValue::text("v")),
            Err(StoreError::Closed(_))
        ));
    }
}
