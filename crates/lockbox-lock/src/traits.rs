use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use crate::error::LockResult;

/// A named mutual-exclusion handle.
///
/// `lock` blocks until the calling thread holds the handle and may be called
/// again by the holder (reentrant). Every `lock` is paired with one `unlock`.
/// A distributed backend may fail `lock` with a retryable error instead of
/// blocking forever.
pub trait LockHandle: Send + Sync {
    /// The identifier this handle was created for.
    fn id(&self) -> &str;

    fn lock(&self) -> LockResult<()>;

    /// Like `lock`, but fail with [`LockError::Timeout`] once `timeout` has
    /// passed. Backends without timed waits block as `lock` does.
    ///
    /// [`LockError::Timeout`]: crate::LockError::Timeout
    fn lock_for(&self, timeout: Duration) -> LockResult<()> {
        let _ = timeout;
        self.lock()
    }

    fn unlock(&self) -> LockResult<()>;
}

/// Hands out lock handles by identifier.
///
/// While a handle is referenced, every `create_lock` for the same identifier
/// returns that same handle.
pub trait LockFactory: Send + Sync {
    fn create_lock(&self, id: &str) -> LockResult<Arc<dyn LockHandle>>;

    /// Drop idle handles whose identifier satisfies `belongs`. Returns how
    /// many were released. Backends that never reclaim return 0.
    fn release_idle(&self, belongs: &dyn Fn(&str) -> bool) -> usize {
        let _ = belongs;
        0
    }
}

/// Holds a lock until dropped.
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct LockGuard {
    handle: Arc<dyn LockHandle>,
}

impl LockGuard {
    /// Lock `handle` and return a guard that unlocks it on drop.
    pub fn acquire(handle: Arc<dyn LockHandle>) -> LockResult<Self> {
        handle.lock()?;
        Ok(Self { handle })
    }

    /// Lock `handle`, waiting at most `timeout`.
    pub fn acquire_for(handle: Arc<dyn LockHandle>, timeout: Duration) -> LockResult<Self> {
        handle.lock_for(timeout)?;
        Ok(Self { handle })
    }

    pub fn id(&self) -> &str {
        self.handle.id()
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Err(e) = self.handle.unlock() {
            warn!(lock = self.handle.id(), error = %e, "failed to release lock");
        }
    }
}

impl std::fmt::Debug for LockGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockGuard").field("id", &self.id()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LockError;
    use crate::reentrant::ReentrantLock;

    #[test]
    fn guard_releases_on_drop() {
        let lock = Arc::new(ReentrantLock::new("g"));
        {
            let guard = LockGuard::acquire(lock.clone()).unwrap();
            assert_eq!(guard.id(), "g");
            assert!(lock.is_held_by_current_thread());
        }
        assert!(!lock.is_locked());
    }

    #[test]
    fn guard_releases_on_early_return() {
        fn fails(lock: Arc<dyn LockHandle>) -> Result<(), &'static str> {
            let _guard = LockGuard::acquire(lock).map_err(|_| "lock")?;
            Err("backend down")
        }
        let lock = Arc::new(ReentrantLock::new("g"));
        assert!(fails(lock.clone()).is_err());
        assert!(!lock.is_locked());
    }

    #[test]
    fn timed_guard_gives_up_while_another_thread_holds() {
        let lock = Arc::new(ReentrantLock::new("g"));
        let _held = LockGuard::acquire(lock.clone()).unwrap();
        let other = lock.clone();
        let err = std::thread::spawn(move || {
            LockGuard::acquire_for(other, Duration::from_millis(20)).map(|_| ())
        })
        .join()
        .unwrap()
        .unwrap_err();
        assert!(matches!(err, LockError::Timeout { waited_ms: 20, .. }));
        assert_eq!(lock.hold_count(), 1);
    }

    #[test]
    fn nested_guards_on_one_handle() {
        let lock = Arc::new(ReentrantLock::new("g"));
        let outer = LockGuard::acquire(lock.clone()).unwrap();
        let inner = LockGuard::acquire(lock.clone()).unwrap();
        assert_eq!(lock.hold_count(), 2);
        drop(inner);
        assert!(lock.is_locked());
        drop(outer);
        assert!(!lock.is_locked());
    }
}
