//=========================================================================
// Task Registry
//=========================================================================
//
// Tracks background tasks from spawn until they are observed terminal.
//
// Tick protocol (`advance`):
//   1. snapshot `pending` into a working set (under lock)
//   2. walk the working set without the lock:
//        Created  → start on the worker pool (or cancel if signal fired)
//        terminal → record as dead
//   3. remove dead ids from `pending` (under lock)
//
// Mutating `pending` only in steps 1 and 3 keeps spawns from other
// threads safe while the walk is in progress.
//
//=========================================================================

//=== External Dependencies ===============================================

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, trace, warn};
use parking_lot::Mutex;

//=== Internal Dependencies ===============================================

use super::cancellation::{CancellationSource, CancellationToken};
use super::task::{current_task, PendingTask, TaskHandle, TaskId, TaskShared, TaskStatus};
use super::worker_pool::WorkerPool;
use crate::core::identity::ContextId;
use crate::error::{ContextError, Result, TaskError};

/// How long `wait_for_pending` spins before warning about stuck tasks.
const STALL_WARNING_AFTER: Duration = Duration::from_secs(5);

//=== TickReport ==========================================================

/// What a single `advance` call did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Tasks handed to the worker pool this tick.
    pub started: usize,
    /// Tasks removed from the pending set this tick.
    pub retired: usize,
    /// Tasks still pending after the tick.
    pub pending: usize,
}

//=== TaskRegistry ========================================================

/// Registry of spawned background tasks.
pub struct TaskRegistry {
    context: ContextId,
    pool: WorkerPool,
    cancellation: Mutex<CancellationSource>,
    pending: Mutex<PendingSet>,
}

#[derive(Default)]
struct PendingSet {
    tasks: Vec<Arc<dyn PendingTask>>,
    closed: bool,
}

impl TaskRegistry {
    //--- Construction -----------------------------------------------------

    pub(crate) fn new(context: ContextId, workers: NonZeroUsize) -> Self {
        Self {
            context,
            pool: WorkerPool::new(workers),
            cancellation: Mutex::new(CancellationSource::new()),
            pending: Mutex::new(PendingSet::default()),
        }
    }

    //--- Spawning ---------------------------------------------------------

    /// Registers a task bound to the current cancellation signal.
    ///
    /// The task does not run until the next `advance`. Fails with
    /// `CannotSpawn` once the registry is closed.
    pub(crate) fn spawn<F, T>(&self, body: F) -> Result<TaskHandle<T>>
    where
        F: FnOnce(CancellationToken) -> std::result::Result<T, TaskError> + Send + 'static,
        T: Send + 'static,
    {
        let token = self.cancellation.lock().token();
        let shared = TaskShared::new(self.context, token, Box::new(body));

        {
            let mut pending = self.pending.lock();
            if pending.closed {
                return Err(ContextError::CannotSpawn);
            }
            pending.tasks.push(Arc::clone(&shared) as Arc<dyn PendingTask>);
        }
        trace!(target: "tasks", "Spawned {}", shared.id());

        Ok(TaskHandle::new(shared))
    }

    /// Refuses further spawns. Tasks already pending are still started,
    /// waited for and retired.
    pub(crate) fn close(&self) {
        self.pending.lock().closed = true;
        debug!(target: "tasks", "Task registry closed to new spawns");
    }

    pub fn is_closed(&self) -> bool {
        self.pending.lock().closed
    }

    //--- Tick -------------------------------------------------------------

    /// Starts newly observed tasks and retires finished ones.
    pub fn advance(&self) -> TickReport {
        let updating: Vec<Arc<dyn PendingTask>> = self.pending.lock().tasks.clone();
        let cancelled = self.is_cancelled();

        let mut report = TickReport::default();
        let mut dead: Vec<TaskId> = Vec::new();

        for task in updating {
            let status = task.status();

            if status.is_terminal() {
                dead.push(task.id());
                continue;
            }

            if status != TaskStatus::Created {
                continue;
            }

            if cancelled {
                task.abort_unstarted(TaskError::Canceled);
                dead.push(task.id());
                continue;
            }

            let id = task.id();
            if let Some(job) = task.clone().take_start() {
                if self.pool.execute(job).is_err() {
                    warn!(target: "tasks", "No worker thread available for {}", id);
                    task.abort_unstarted(TaskError::Faulted("no worker thread available".into()));
                    dead.push(id);
                } else {
                    report.started += 1;
                }
            }
        }

        let mut pending = self.pending.lock();
        if !dead.is_empty() {
            let before = pending.tasks.len();
            pending.tasks.retain(|task| !dead.contains(&task.id()));
            report.retired = before - pending.tasks.len();
        }
        report.pending = pending.tasks.len();

        report
    }

    //--- Waiting ----------------------------------------------------------

    /// Blocks until the pending set is empty.
    ///
    /// With `cancel`, fires the shared signal first. Each iteration
    /// advances the registry, then runs `drain` so tasks that wait on
    /// main-thread results can make progress, then yields.
    ///
    /// A task that never finishes and never polls its token keeps this
    /// loop spinning forever; nothing is aborted.
    pub(crate) fn wait_for_pending<D>(&self, cancel: bool, mut drain: D) -> Result<()>
    where
        D: FnMut() -> Result<()>,
    {
        if let Some(id) = current_task() {
            if self.contains(id) {
                return Err(ContextError::WaitFromTask);
            }
        }

        if cancel {
            self.cancel();
        }

        let started = Instant::now();
        let mut warned = false;

        loop {
            let report = self.advance();
            if report.pending == 0 {
                break;
            }

            drain()?;

            if !warned && started.elapsed() >= STALL_WARNING_AFTER {
                warn!(
                    target: "tasks",
                    "Still waiting on {} pending task(s) after {:?}; tasks must poll their cancellation token",
                    report.pending,
                    STALL_WARNING_AFTER
                );
                warned = true;
            }

            thread::yield_now();
        }

        debug!(target: "tasks", "Pending task set drained in {:?}", started.elapsed());
        Ok(())
    }

    //--- Cancellation -----------------------------------------------------

    /// Fires the shared cancellation signal.
    pub fn cancel(&self) {
        self.cancellation.lock().cancel();
        debug!(target: "tasks", "Cancellation signal fired");
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.lock().is_cancelled()
    }

    /// Installs a fresh signal; later spawns observe the new one.
    pub(crate) fn reset_cancellation(&self) {
        *self.cancellation.lock() = CancellationSource::new();
    }

    /// Stops the worker threads once the queued jobs are done. Tasks
    /// started after this are faulted.
    pub(crate) fn shutdown(&self) {
        self.pool.close();
    }

    //--- Query API --------------------------------------------------------

    /// Number of tasks not yet retired.
    pub fn pending_count(&self) -> usize {
        self.pending.lock().tasks.len()
    }

    /// Number of worker threads currently backing the registry.
    pub fn worker_count(&self) -> usize {
        self.pool.size()
    }

    fn contains(&self, id: TaskId) -> bool {
        self.pending.lock().tasks.iter().any(|task| task.id() == id)
    }
}

//=========================================================================
// Unit Tests
//=========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn registry() -> Arc<TaskRegistry> {
        Arc::new(TaskRegistry::new(
            ContextId::next(),
            NonZeroUsize::new(2).unwrap(),
        ))
    }

    fn no_drain() -> Result<()> {
        Ok(())
    }

    //=====================================================================
    // Spawn & Tick
    //=====================================================================

    #[test]
    fn spawned_task_waits_for_a_tick() {
        let reg = registry();
        let handle = reg.spawn(|_| Ok(())).unwrap();

        assert_eq!(handle.status(), TaskStatus::Created);
        assert_eq!(reg.pending_count(), 1);

        let report = reg.advance();
        assert_eq!(report.started, 1);
        assert!(handle.wait_timeout(Duration::from_secs(5)));
    }

    #[test]
    fn finished_tasks_are_retired_on_a_later_tick() {
        let reg = registry();
        let handle = reg.spawn(|_| Ok(5)).unwrap();

        reg.advance();
        assert!(handle.wait_timeout(Duration::from_secs(5)));
        assert_eq!(reg.pending_count(), 1);

        let report = reg.advance();
        assert_eq!(report.retired, 1);
        assert_eq!(report.pending, 0);
        assert_eq!(handle.wait().unwrap(), 5);
    }

    #[test]
    fn created_tasks_are_canceled_once_signal_fired() {
        let reg = registry();
        let ran = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&ran);
        let handle = reg.spawn(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .unwrap();

        reg.cancel();
        reg.advance();

        assert_eq!(handle.status(), TaskStatus::Canceled);
        assert_eq!(ran.load(Ordering::SeqCst), 0);
        assert_eq!(reg.pending_count(), 0);
    }

    //=====================================================================
    // Waiting
    //=====================================================================

    #[test]
    fn wait_for_pending_blocks_until_body_finishes() {
        let reg = registry();
        let counter = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&counter);

        reg.spawn(move |_| {
            thread::sleep(Duration::from_millis(20));
            seen.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .unwrap();

        reg.wait_for_pending(false, no_drain).unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(reg.pending_count(), 0);
    }

    #[test]
    fn wait_with_cancel_stops_cooperative_tasks() {
        let reg = registry();
        let (started_tx, started_rx) = crossbeam_channel::bounded(1);

        let handle = reg.spawn(move |token| {
            started_tx.send(()).unwrap();
            while !token.is_cancelled() {
                thread::yield_now();
            }
            token.check()
        })
        .unwrap();

        reg.advance();
        started_rx.recv_timeout(Duration::from_secs(5)).unwrap();

        reg.wait_for_pending(true, no_drain).unwrap();
        assert_eq!(handle.status(), TaskStatus::Canceled);
    }

    #[test]
    fn wait_runs_drain_while_tasks_are_pending() {
        let reg = registry();
        let drains = AtomicUsize::new(0);
        let (release_tx, release_rx) = crossbeam_channel::bounded::<()>(1);

        reg.spawn(move |_| {
            release_rx.recv().ok();
            Ok(())
        })
        .unwrap();

        reg.wait_for_pending(false, || {
            if drains.fetch_add(1, Ordering::SeqCst) == 3 {
                release_tx.send(()).ok();
            }
            Ok(())
        })
        .unwrap();

        assert!(drains.load(Ordering::SeqCst) >= 4);
    }

    #[test]
    fn task_cannot_wait_on_its_own_registry() {
        let reg = registry();
        let inner = Arc::clone(&reg);

        let handle = reg.spawn(move |_| Ok(inner.wait_for_pending(false, || Ok(())))).unwrap();
        reg.advance();

        let outcome = handle.wait().unwrap();
        assert!(matches!(outcome, Err(ContextError::WaitFromTask)));
    }

    #[test]
    fn closed_registry_refuses_spawns_but_keeps_pending_tasks() {
        let reg = registry();
        let before = reg.spawn(|_| Ok(())).unwrap();

        reg.close();
        assert!(reg.is_closed());
        assert!(matches!(reg.spawn(|_| Ok(())), Err(ContextError::CannotSpawn)));
        assert_eq!(reg.pending_count(), 1);

        reg.wait_for_pending(false, no_drain).unwrap();
        assert_eq!(before.status(), TaskStatus::Completed);
    }

    #[test]
    fn reset_cancellation_affects_only_new_spawns() {
        let reg = registry();
        reg.cancel();
        let old = reg.spawn(|_| Ok(())).unwrap();

        reg.reset_cancellation();
        let fresh = reg.spawn(|_| Ok(())).unwrap();

        assert!(old.token().is_cancelled());
        assert!(!fresh.token().is_cancelled());
        assert!(!reg.is_cancelled());
    }
}
