use std::time::Duration;

use lockbox_types::{Timestamp, TypedValue};
use serde::{Deserialize, Serialize};

/// One key/value pair inside a partition, with the metadata eviction needs.
///
/// `seq` is a per-partition counter assigned at write time. It breaks ties
/// between entries created within the same millisecond, so "oldest first"
/// is always a total order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredEntry {
    pub key: String,
    pub value: TypedValue,
    pub created_at: Timestamp,
    pub seq: u64,
    pub expires_at: Option<Timestamp>,
}

impl StoredEntry {
    /// Build an entry written at `now`, expiring after `ttl` if one is set.
    pub fn new(
        key: impl Into<String>,
        value: TypedValue,
        now: Timestamp,
        seq: u64,
        ttl: Option<Duration>,
    ) -> Self {
        Self {
            key: key.into(),
            value,
            created_at: now,
            seq,
            expires_at: ttl.map(|ttl| now.saturating_add(ttl)),
        }
    }

    /// Returns `true` if the entry has an expiry at or before `now`.
    pub fn is_expired(&self, now: Timestamp) -> bool {
        self.expires_at.is_some_and(|at| at.has_passed(now))
    }

    /// Metadata view used by the eviction planner.
    pub fn meta(&self) -> EntryMeta {
        EntryMeta {
            key: self.key.clone(),
            created_at: self.created_at,
            seq: self.seq,
            expires_at: self.expires_at,
        }
    }
}

/// Value-free view of a [`StoredEntry`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EntryMeta {
    pub key: String,
    pub created_at: Timestamp,
    pub seq: u64,
    pub expires_at: Option<Timestamp>,
}

impl EntryMeta {
    /// Sort key for "oldest first" by creation time.
    pub fn age_order(&self) -> (Timestamp, u64) {
        (self.created_at, self.seq)
    }
}
