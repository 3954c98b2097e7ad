use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use lockbox_types::{Clock, SystemClock, Timestamp, TypedValue};
use parking_lot::RwLock;

use crate::entry::{EntryMeta, StoredEntry};
use crate::error::{StoreError, StoreResult};
use crate::traits::{ensure_key, PartitionStore};

/// The in-memory entry map shared by the volatile and journal-backed
/// partitions.
#[derive(Debug, Default)]
pub(crate) struct EntryTable {
    entries: HashMap<String, StoredEntry>,
    next_seq: u64,
}

impl EntryTable {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub(crate) fn get(&self, key: &str) -> Option<&StoredEntry> {
        self.entries.get(key)
    }

    /// Allocate an entry for `key` without inserting it.
    pub(crate) fn prepare(
        &mut self,
        key: &str,
        value: TypedValue,
        now: Timestamp,
        ttl: Option<Duration>,
    ) -> StoredEntry {
        self.next_seq += 1;
        StoredEntry::new(key, value, now, self.next_seq, ttl)
    }

    /// Insert (or replace) an entry, keeping the sequence counter ahead of
    /// every seq seen so far.
    pub(crate) fn insert(&mut self, entry: StoredEntry) -> Option<StoredEntry> {
        self.next_seq = self.next_seq.max(entry.seq);
        self.entries.insert(entry.key.clone(), entry)
    }

    pub(crate) fn remove(&mut self, key: &str) -> Option<StoredEntry> {
        self.entries.remove(key)
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }

    pub(crate) fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.entries.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub(crate) fn values(&self) -> BTreeMap<String, TypedValue> {
        self.entries
            .iter()
            .map(|(k, e)| (k.clone(), e.value.clone()))
            .collect()
    }

    pub(crate) fn metadata(&self) -> Vec<EntryMeta> {
        self.entries.values().map(StoredEntry::meta).collect()
    }

    /// Entries in creation order, for journal compaction.
    pub(crate) fn snapshot(&self) -> Vec<StoredEntry> {
        let mut entries: Vec<StoredEntry> = self.entries.values().cloned().collect();
        entries.sort_by_key(|e| (e.created_at, e.seq));
        entries
    }
}

/// Volatile partition: a `HashMap` behind a `RwLock`.
///
/// Data is lost when the partition is dropped. Values are cloned on
/// read/write.
pub struct InMemoryPartition {
    name: String,
    ttl: Option<Duration>,
    clock: Arc<dyn Clock>,
    table: RwLock<EntryTable>,
}

impl InMemoryPartition {
    /// A partition with no TTL, on the system clock.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_clock(name, None, Arc::new(SystemClock))
    }

    /// A partition stamping entries with `ttl` measured on `clock`.
    pub fn with_clock(
        name: impl Into<String>,
        ttl: Option<Duration>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            name: name.into(),
            ttl,
            clock,
            table: RwLock::new(EntryTable::new()),
        }
    }

    /// Number of entries currently stored.
    pub fn len(&self) -> usize {
        self.table.read().len()
    }

    /// Returns `true` if the partition is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn not_found(&self, key: &str) -> StoreError {
        StoreError::KeyNotFound {
            store: self.name.clone(),
            key: key.to_string(),
        }
    }
}

impl PartitionStore for InMemoryPartition {
    fn name(&self) -> &str {
        &self.name
    }

    fn contains(&self, key: &str) -> StoreResult<bool> {
        ensure_key(key)?;
        Ok(self.table.read().contains(key))
    }

    fn store(&self, key: &str, value: TypedValue) -> StoreResult<()> {
        ensure_key(key)?;
        let mut table = self.table.write();
        if table.contains(key) {
            return Err(StoreError::KeyAlreadyExists {
                store: self.name.clone(),
                key: key.to_string(),
            });
        }
        let entry = table.prepare(key, value, self.clock.now(), self.ttl);
        table.insert(entry);
        Ok(())
    }

    fn retrieve(&self, key: &str) -> StoreResult<TypedValue> {
        ensure_key(key)?;
        self.table
            .read()
            .get(key)
            .map(|e| e.value.clone())
            .ok_or_else(|| self.not_found(key))
    }

    fn remove(&self, key: &str) -> StoreResult<TypedValue> {
        ensure_key(key)?;
        self.table
            .write()
            .remove(key)
            .map(|e| e.value)
            .ok_or_else(|| self.not_found(key))
    }

    fn clear(&self) -> StoreResult<()> {
        self.table.write().clear();
        Ok(())
    }

    fn all_keys(&self) -> StoreResult<Vec<String>> {
        Ok(self.table.read().keys())
    }

    fn retrieve_all(&self) -> StoreResult<BTreeMap<String, TypedValue>> {
        Ok(self.table.read().values())
    }

    fn entry_metadata(&self) -> StoreResult<Vec<EntryMeta>> {
        Ok(self.table.read().metadata())
    }

    fn upsert(&self, key: &str, value: TypedValue) -> StoreResult<()> {
        ensure_key(key)?;
        let mut table = self.table.write();
        let entry = table.prepare(key, value, self.clock.now(), self.ttl);
        table.insert(entry);
        Ok(())
    }
}

impl std::fmt::Debug for InMemoryPartition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryPartition")
            .field("name", &self.name)
            .field("entry_count", &self.len())
            .finish()
    }
}
