use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::{Builder, Handle, Runtime};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::error::StoreResult;
use crate::eviction::SweepReport;

/// One sweep of one store. Runs on a blocking thread, so it may take the
/// store lock and do backend I/O.
pub type SweepTask = Arc<dyn Fn() -> StoreResult<SweepReport> + Send + Sync>;

enum SchedulerRuntime {
    /// The runtime the scheduler was created on.
    Shared(Handle),
    /// A private single-worker runtime, for hosts that are not async.
    Owned(Option<Runtime>),
}

/// Periodic eviction timers, one per store with an active policy.
///
/// Each armed store gets a task that waits one interval, runs its sweep on
/// the blocking pool, and repeats until disarmed. A failed sweep is logged
/// and retried on the next tick.
pub struct SweepScheduler {
    runtime: SchedulerRuntime,
    armed: Mutex<HashMap<String, watch::Sender<bool>>>,
}

impl SweepScheduler {
    /// Use the current Tokio runtime if there is one, otherwise start a
    /// private one.
    pub fn new() -> StoreResult<Self> {
        let runtime = match Handle::try_current() {
            Ok(handle) => SchedulerRuntime::Shared(handle),
            Err(_) => {
                let rt = Builder::new_multi_thread()
                    .worker_threads(1)
                    .thread_name("lockbox-sweeper")
                    .enable_time()
                    .build()?;
                SchedulerRuntime::Owned(Some(rt))
            }
        };
        Ok(Self {
            runtime,
            armed: Mutex::new(HashMap::new()),
        })
    }

    fn handle(&self) -> Option<Handle> {
        match &self.runtime {
            SchedulerRuntime::Shared(handle) => Some(handle.clone()),
            SchedulerRuntime::Owned(rt) => rt.as_ref().map(|rt| rt.handle().clone()),
        }
    }

    /// Start sweeping `store` every `interval`.
    ///
    /// Returns `false`, arming nothing, if the store already has a timer.
    pub fn arm(&self, store: &str, interval: Duration, task: SweepTask) -> bool {
        let mut armed = self.armed.lock();
        if armed.contains_key(store) {
            debug!(store, "sweep timer already armed");
            return false;
        }
        let Some(handle) = self.handle() else {
            warn!(store, "sweep scheduler is shut down; timer not armed");
            return false;
        };

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        handle.spawn(run_sweeps(store.to_string(), interval, task, shutdown_rx));
        armed.insert(store.to_string(), shutdown_tx);
        info!(store, interval_ms = interval.as_millis() as u64, "sweep timer armed");
        true
    }

    /// Cancel the timer for `store`. Returns `false` if none was armed.
    pub fn disarm(&self, store: &str) -> bool {
        match self.armed.lock().remove(store) {
            Some(shutdown_tx) => {
                let _ = shutdown_tx.send(true);
                info!(store, "sweep timer cancelled");
                true
            }
            None => false,
        }
    }

    pub fn is_armed(&self, store: &str) -> bool {
        self.armed.lock().contains_key(store)
    }

    /// Number of stores with a live timer.
    pub fn armed_count(&self) -> usize {
        self.armed.lock().len()
    }
}

async fn run_sweeps(
    store: String,
    interval: Duration,
    task: SweepTask,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately; sweeps start one interval in.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let task = Arc::clone(&task);
                match tokio::task::spawn_blocking(move || task()).await {
                    Ok(Ok(report)) if report.total() > 0 => {
                        debug!(store = %store, expired = report.expired, overflow = report.overflow, "scheduled sweep evicted entries");
                    }
                    Ok(Ok(_)) => {}
                    Ok(Err(e)) => {
                        warn!(store = %store, error = %e, "sweep failed; retrying next tick");
                    }
                    Err(e) => {
                        warn!(store = %store, error = %e, "sweep task panicked; retrying next tick");
                    }
                }
            }
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    break;
                }
            }
        }
    }
    debug!(store = %store, "sweep timer stopped");
}

impl Drop for SweepScheduler {
    fn drop(&mut self) {
        for (_, shutdown_tx) in self.armed.get_mut().drain() {
            let _ = shutdown_tx.send(true);
        }
        if let SchedulerRuntime::Owned(rt) = &mut self.runtime {
            if let Some(rt) = rt.take() {
                rt.shutdown_background();
            }
        }
    }
}

impl std::fmt::Debug for SweepScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let owned = matches!(self.runtime, SchedulerRuntime::Owned(_));
        f.debug_struct("SweepScheduler")
            .field("owned_runtime", &owned)
            .field("armed", &self.armed_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    use crate::error::StoreError;

    fn counting_task(counter: Arc<AtomicUsize>) -> SweepTask {
        Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(SweepReport::default())
        })
    }

    #[test]
    fn armed_task_runs_periodically() {
        let scheduler = SweepScheduler::new().unwrap();
        let counter = Arc::new(AtomicUsize::new(0));
        assert!(scheduler.arm("s", Duration::from_millis(10), counting_task(counter.clone())));

        thread::sleep(Duration::from_millis(200));
        assert!(counter.load(Ordering::SeqCst) >= 2);
    }

    #[test]
    fn second_arm_is_rejected() {
        let scheduler = SweepScheduler::new().unwrap();
        let counter = Arc::new(AtomicUsize::new(0));
        assert!(scheduler.arm("s", Duration::from_secs(60), counting_task(counter.clone())));
        assert!(!scheduler.arm("s", Duration::from_secs(60), counting_task(counter)));
        assert_eq!(scheduler.armed_count(), 1);
    }

    #[test]
    fn disarm_stops_the_timer() {
        let scheduler = SweepScheduler::new().unwrap();
        let counter = Arc::new(AtomicUsize::new(0));
        scheduler.arm("s", Duration::from_millis(10), counting_task(counter.clone()));
        thread::sleep(Duration::from_millis(60));

        assert!(scheduler.disarm("s"));
        assert!(!scheduler.is_armed("s"));
        thread::sleep(Duration::from_millis(30));
        let after_disarm = counter.load(Ordering::SeqCst);
        thread::sleep(Duration::from_millis(100));
        assert_eq!(counter.load(Ordering::SeqCst), after_disarm);
        assert!(!scheduler.disarm("s"));
    }

    #[test]
    fn failing_sweep_is_retried() {
        let scheduler = SweepScheduler::new().unwrap();
        let attempts = Arc::new(AtomicUsize::new(0));
        let seen = attempts.clone();
        let task: SweepTask = Arc::new(move || {
            seen.fetch_add(1, Ordering::SeqCst);
            Err(StoreError::NotAvailable {
                store: "s".into(),
                reason: "backend down".into(),
            })
        });
        scheduler.arm("s", Duration::from_millis(10), task);
        thread::sleep(Duration::from_millis(200));
        assert!(attempts.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn uses_ambient_runtime() {
        let scheduler = SweepScheduler::new().unwrap();
        assert!(format!("{scheduler:?}").contains("owned_runtime: false"));
        let counter = Arc::new(AtomicUsize::new(0));
        scheduler.arm("s", Duration::from_millis(10), counting_task(counter.clone()));
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(counter.load(Ordering::SeqCst) >= 1);
    }
}
