use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::error::{LockError, LockResult};
use crate::traits::LockHandle;

#[derive(Debug, Default)]
struct State {
    owner: Option<ThreadId>,
    holds: usize,
}

/// A mutex that the owning thread may acquire more than once.
///
/// Each `lock` must be matched by an `unlock` from the same thread; the lock
/// is free once the hold count returns to zero. Waiters are woken one at a
/// time with no fairness guarantee.
pub struct ReentrantLock {
    id: String,
    state: Mutex<State>,
    released: Condvar,
}

impl ReentrantLock {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            state: Mutex::new(State::default()),
            released: Condvar::new(),
        }
    }

    /// Block until the current thread holds the lock.
    pub fn acquire(&self) {
        let me = thread::current().id();
        let mut state = self.state.lock();
        loop {
            if Self::try_take(&mut state, me) {
                return;
            }
            self.released.wait(&mut state);
        }
    }

    /// Take the lock only if it is free or already ours.
    pub fn try_acquire(&self) -> bool {
        let me = thread::current().id();
        Self::try_take(&mut self.state.lock(), me)
    }

    /// Wait at most `timeout` for the lock.
    pub fn try_acquire_for(&self, timeout: Duration) -> bool {
        let me = thread::current().id();
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        loop {
            if Self::try_take(&mut state, me) {
                return true;
            }
            if self.released.wait_until(&mut state, deadline).timed_out() {
                return Self::try_take(&mut state, me);
            }
        }
    }

    /// Drop one hold. Fails if the current thread is not the owner.
    pub fn release(&self) -> LockResult<()> {
        let me = thread::current().id();
        let mut state = self.state.lock();
        if state.owner != Some(me) {
            return Err(LockError::NotOwner {
                id: self.id.clone(),
            });
        }
        state.holds -= 1;
        if state.holds == 0 {
            state.owner = None;
            drop(state);
            self.released.notify_one();
        }
        Ok(())
    }

    pub fn is_held_by_current_thread(&self) -> bool {
        self.state.lock().owner == Some(thread::current().id())
    }

    pub fn is_locked(&self) -> bool {
        self.state.lock().owner.is_some()
    }

    /// How many times the owner has acquired the lock (0 when free).
    pub fn hold_count(&self) -> usize {
        self.state.lock().holds
    }

    fn try_take(state: &mut State, me: ThreadId) -> bool {
        match state.owner {
            None => {
                state.owner = Some(me);
                state.holds = 1;
                true
            }
            Some(owner) if owner == me => {
                state.holds += 1;
                true
            }
            Some(_) => false,
        }
    }
}

impl LockHandle for ReentrantLock {
    fn id(&self) -> &str {
        &self.id
    }

    fn lock(&self) -> LockResult<()> {
        self.acquire();
        Ok(())
    }

    fn lock_for(&self, timeout: Duration) -> LockResult<()> {
        if self.try_acquire_for(timeout) {
            Ok(())
        } else {
            Err(LockError::Timeout {
                id: self.id.clone(),
                waited_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            })
        }
    }

    fn unlock(&self) -> LockResult<()> {
        self.release()
    }
}

impl std::fmt::Debug for ReentrantLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("ReentrantLock")
            .field("id", &self.id)
            .field("owner", &state.owner)
            .field("holds", &state.holds)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn owner_can_reenter() {
        let lock = ReentrantLock::new("l");
        lock.acquire();
        lock.acquire();
        assert_eq!(lock.hold_count(), 2);
        assert!(lock.is_held_by_current_thread());

        lock.release().unwrap();
        assert!(lock.is_locked());
        lock.release().unwrap();
        assert!(!lock.is_locked());
    }

    #[test]
    fn other_thread_waits_for_full_release() {
        let lock = Arc::new(ReentrantLock::new("l"));
        lock.acquire();
        lock.acquire();

        let contender = Arc::clone(&lock);
        let blocked = thread::spawn(move || contender.try_acquire())
            .join()
            .unwrap();
        assert!(!blocked);

        lock.release().unwrap();
        let contender = Arc::clone(&lock);
        assert!(!thread::spawn(move || contender.try_acquire()).join().unwrap());

        lock.release().unwrap();
        let contender = Arc::clone(&lock);
        assert!(thread::spawn(move || {
            let ok = contender.try_acquire();
            contender.release().unwrap();
            ok
        })
        .join()
        .unwrap());
    }

    #[test]
    fn release_by_non_owner_fails() {
        let lock = Arc::new(ReentrantLock::new("l"));
        assert!(matches!(lock.release(), Err(LockError::NotOwner { .. })));

        lock.acquire();
        let other = Arc::clone(&lock);
        let result = thread::spawn(move || other.release()).join().unwrap();
        assert!(matches!(result, Err(LockError::NotOwner { .. })));
        lock.release().unwrap();
    }

    #[test]
    fn timed_acquire_gives_up() {
        let lock = Arc::new(ReentrantLock::new("l"));
        lock.acquire();
        let other = Arc::clone(&lock);
        let started = Instant::now();
        let got = thread::spawn(move || other.try_acquire_for(Duration::from_millis(30)))
            .join()
            .unwrap();
        assert!(!got);
        assert!(started.elapsed() >= Duration::from_millis(30));
        lock.release().unwrap();
    }

    #[test]
    fn provides_mutual_exclusion() {
        let lock = Arc::new(ReentrantLock::new("l"));
        let inside = Arc::new(AtomicUsize::new(0));
        let overlaps = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let lock = Arc::clone(&lock);
                let inside = Arc::clone(&inside);
                let overlaps = Arc::clone(&overlaps);
                thread::spawn(move || {
                    for _ in 0..200 {
                        lock.acquire();
                        if inside.fetch_add(1, Ordering::SeqCst) != 0 {
                            overlaps.fetch_add(1, Ordering::SeqCst);
                        }
                        inside.fetch_sub(1, Ordering::SeqCst);
                        lock.release().unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().expect("thread should not panic");
        }
        assert_eq!(overlaps.load(Ordering::SeqCst), 0);
        assert!(!lock.is_locked());
    }
}
