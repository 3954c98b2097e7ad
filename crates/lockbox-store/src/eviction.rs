use std::time::Duration;

use lockbox_types::{StoreSettings, Timestamp};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::entry::EntryMeta;
use crate::error::{StoreError, StoreResult};
use crate::traits::PartitionStore;

/// Size and age limits for one store, derived from its settings.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EvictionPolicy {
    pub max_entries: Option<usize>,
    pub entry_ttl: Option<Duration>,
}

impl EvictionPolicy {
    pub fn from_settings(settings: &StoreSettings) -> Self {
        Self {
            max_entries: settings.max_entries,
            entry_ttl: settings.entry_ttl(),
        }
    }

    /// Returns `true` if a sweep could ever remove anything.
    pub fn is_active(&self) -> bool {
        self.max_entries.is_some() || self.entry_ttl.is_some()
    }

    /// Decide which entries a sweep at `now` removes.
    ///
    /// Expired entries go first, ordered by expiry then write sequence. If
    /// the survivors still exceed `max_entries`, the oldest by creation time
    /// are added until the count fits.
    pub fn plan(&self, mut entries: Vec<EntryMeta>, now: Timestamp) -> EvictionPlan {
        let mut plan = EvictionPlan::default();
        if !self.is_active() {
            return plan;
        }

        if let Some(ttl) = self.entry_ttl {
            let deadline = |m: &EntryMeta| m.expires_at.unwrap_or(m.created_at.saturating_add(ttl));
            let (mut expired, live): (Vec<_>, Vec<_>) = entries
                .into_iter()
                .partition(|m| deadline(m).has_passed(now));
            expired.sort_by_key(|m| (deadline(m), m.seq));
            plan.expired = expired.into_iter().map(|m| m.key).collect();
            entries = live;
        } else {
            // Entries written under an earlier TTL still carry their expiry.
            let (mut expired, live): (Vec<_>, Vec<_>) = entries
                .into_iter()
                .partition(|m| m.expires_at.is_some_and(|at| at.has_passed(now)));
            expired.sort_by_key(|m| (m.expires_at, m.seq));
            plan.expired = expired.into_iter().map(|m| m.key).collect();
            entries = live;
        }

        if let Some(max) = self.max_entries {
            if entries.len() > max {
                entries.sort_by_key(EntryMeta::age_order);
                let excess = entries.len() - max;
                plan.overflow = entries.into_iter().take(excess).map(|m| m.key).collect();
            }
        }
        plan
    }
}

/// Keys chosen for removal by one sweep, in removal order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EvictionPlan {
    pub expired: Vec<String>,
    pub overflow: Vec<String>,
}

impl EvictionPlan {
    pub fn is_empty(&self) -> bool {
        self.expired.is_empty() && self.overflow.is_empty()
    }
}

/// What a sweep actually removed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    pub expired: usize,
    pub overflow: usize,
}

impl SweepReport {
    pub fn total(&self) -> usize {
        self.expired + self.overflow
    }
}

/// Run one sweep over `partition`.
///
/// The caller holds the store-level lock. Keys that vanished between
/// planning and removal are skipped; any other failure aborts the sweep and
/// is returned so the scheduler can retry on its next tick.
pub fn sweep(
    partition: &dyn PartitionStore,
    policy: &EvictionPolicy,
    now: Timestamp,
) -> StoreResult<SweepReport> {
    let mut report = SweepReport::default();
    if !policy.is_active() {
        return Ok(report);
    }

    let plan = policy.plan(partition.entry_metadata()?, now);
    if plan.is_empty() {
        return Ok(report);
    }

    for key in &plan.expired {
        if remove_if_present(partition, key)? {
            report.expired += 1;
        }
    }
    for key in &plan.overflow {
        if remove_if_present(partition, key)? {
            report.overflow += 1;
        }
    }

    debug!(
        store = partition.name(),
        expired = report.expired,
        overflow = report.overflow,
        "sweep complete"
    );
    Ok(report)
}

fn remove_if_present(partition: &dyn PartitionStore, key: &str) -> StoreResult<bool> {
    match partition.remove(key) {
        Ok(_) => Ok(true),
        Err(StoreError::KeyNotFound { .. }) => Ok(false),
        Err(e) => Err(e),
    }
}
