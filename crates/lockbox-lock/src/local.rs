use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::error::LockResult;
use crate::reentrant::ReentrantLock;
use crate::traits::{LockFactory, LockHandle};

/// In-process lock factory backed by a table of [`ReentrantLock`]s.
///
/// Without a reclaim threshold every handle lives as long as the factory,
/// which suits bounded key spaces only. With one, creating a handle once the
/// table has reached the threshold first reaps idle handles: those nobody
/// holds and nobody else references. A reaped identifier gets a fresh handle
/// on its next request, which is safe because no caller can still observe
/// the old one.
#[derive(Default)]
pub struct LocalLockFactory {
    locks: Mutex<HashMap<String, Arc<ReentrantLock>>>,
    reclaim_threshold: Option<usize>,
}

impl LocalLockFactory {
    /// A factory that never reclaims handles.
    pub fn new() -> Self {
        Self::default()
    }

    /// A factory that reaps idle handles whenever the table reaches
    /// `threshold` entries.
    pub fn with_reclaim_threshold(threshold: usize) -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
            reclaim_threshold: Some(threshold),
        }
    }

    /// Number of handles currently tracked.
    pub fn len(&self) -> usize {
        self.locks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every idle handle. Returns how many were dropped.
    pub fn reap_idle(&self) -> usize {
        let mut locks = self.locks.lock();
        reap(&mut locks, |_| true)
    }
}

/// Only the table's own reference remains and nobody holds the lock. New
/// references are only handed out under the table mutex, so an idle handle
/// cannot be revived while the caller holds it.
fn is_idle(lock: &Arc<ReentrantLock>) -> bool {
    Arc::strong_count(lock) == 1 && !lock.is_locked()
}

fn reap(locks: &mut HashMap<String, Arc<ReentrantLock>>, belongs: impl Fn(&str) -> bool) -> usize {
    let before = locks.len();
    locks.retain(|id, lock| !(belongs(id) && is_idle(lock)));
    before - locks.len()
}

impl LockFactory for LocalLockFactory {
    fn create_lock(&self, id: &str) -> LockResult<Arc<dyn LockHandle>> {
        let mut locks = self.locks.lock();
        if let Some(existing) = locks.get(id) {
            return Ok(Arc::clone(existing) as Arc<dyn LockHandle>);
        }

        if let Some(threshold) = self.reclaim_threshold {
            if locks.len() >= threshold {
                let reaped = reap(&mut locks, |_| true);
                debug!(reaped, remaining = locks.len(), "reclaimed idle lock handles");
            }
        }

        let lock = Arc::new(ReentrantLock::new(id));
        locks.insert(id.to_string(), Arc::clone(&lock));
        Ok(lock)
    }

    fn release_idle(&self, belongs: &dyn Fn(&str) -> bool) -> usize {
        let mut locks = self.locks.lock();
        reap(&mut locks, belongs)
    }
}

impl std::fmt::Debug for LocalLockFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalLockFactory")
            .field("handles", &self.len())
            .field("reclaim_threshold", &self.reclaim_threshold)
            .finish()
    }
}
