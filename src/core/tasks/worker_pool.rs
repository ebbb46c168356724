//=========================================================================
// Worker Pool
//=========================================================================
//
// Growable set of background threads fed from a crossbeam job channel.
// Spawned tasks run here, never on the main thread.
//
// Architecture:
//   execute(job) ──► Sender<Job> ──► [worker-0 .. worker-N] ──► job()
//
// Sizing:
//   - `min` workers are started up front and never retire
//   - `execute` claims an idle worker; with none idle it starts another,
//     so a job blocked on a later job never starves it
//   - a worker above `min` that sees no job for `idle_timeout` exits
//
// Threads waiting on the channel always equal `idle` plus queued jobs.
//
// Closing (or dropping) the pool disconnects the channel; workers finish
// the jobs already queued, then exit. Drop also joins them.
//
//=========================================================================

//=== External Dependencies ===============================================

use std::num::NonZeroUsize;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use log::{debug, error, trace, warn};
use parking_lot::Mutex;

//=== Internal Dependencies ===============================================

use super::task::Job;
use crate::error::panic_message;

/// How long a worker above the minimum waits for a job before exiting.
const IDLE_WORKER_TIMEOUT: Duration = Duration::from_secs(10);

//=== PoolCounters ========================================================

struct PoolCounters {
    min: usize,
    idle_timeout: Duration,
    live: AtomicUsize,
    idle: AtomicUsize,
    next_index: AtomicUsize,
}

impl PoolCounters {
    fn claim_idle(&self) -> bool {
        self.idle
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .is_ok()
    }

    /// Gives up one idle slot if the pool is above its minimum.
    fn try_retire(&self) -> bool {
        let above_min = self
            .live
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| (n > self.min).then(|| n - 1))
            .is_ok();
        if !above_min {
            return false;
        }
        if self.claim_idle() {
            return true;
        }
        // Every waiting thread is spoken for by a queued job.
        self.live.fetch_add(1, Ordering::AcqRel);
        false
    }
}

//=== WorkerPool ==========================================================

/// General-purpose thread pool for background tasks.
pub(crate) struct WorkerPool {
    sender: Mutex<Option<Sender<Job>>>,
    receiver: Receiver<Job>,
    counters: Arc<PoolCounters>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    /// Starts `min` warm worker threads.
    pub(crate) fn new(min: NonZeroUsize) -> Self {
        Self::with_idle_timeout(min, IDLE_WORKER_TIMEOUT)
    }

    pub(crate) fn with_idle_timeout(min: NonZeroUsize, idle_timeout: Duration) -> Self {
        let (sender, receiver) = unbounded::<Job>();
        let pool = Self {
            sender: Mutex::new(Some(sender)),
            receiver,
            counters: Arc::new(PoolCounters {
                min: min.get(),
                idle_timeout,
                live: AtomicUsize::new(0),
                idle: AtomicUsize::new(0),
                next_index: AtomicUsize::new(0),
            }),
            workers: Mutex::new(Vec::new()),
        };

        for _ in 0..min.get() {
            if let Err(e) = pool.start_worker(true) {
                error!(target: "tasks", "Failed to start worker: {}", e);
            }
        }
        debug!(target: "tasks", "Worker pool started with {} thread(s)", pool.size());

        pool
    }

    /// Number of live worker threads.
    pub(crate) fn size(&self) -> usize {
        self.counters.live.load(Ordering::Acquire)
    }

    /// Queues `job` for execution on some worker, starting a new worker
    /// when none is idle.
    ///
    /// Returns the job back if the pool is closed or has no threads.
    pub(crate) fn execute(&self, job: Job) -> Result<(), Job> {
        let guard = self.sender.lock();
        let Some(sender) = guard.as_ref() else {
            return Err(job);
        };

        if !self.counters.claim_idle() {
            if let Err(e) = self.start_worker(false) {
                if self.size() == 0 {
                    return Err(job);
                }
                warn!(target: "tasks", "Could not grow worker pool, job will queue: {}", e);
            }
        }

        sender.send(job).map_err(|e| e.into_inner())
    }

    /// Disconnects the job channel. Workers drain what is queued and exit;
    /// later `execute` calls hand their job back.
    pub(crate) fn close(&self) {
        if self.sender.lock().take().is_some() {
            debug!(target: "tasks", "Worker pool closed");
        }
    }

    //--- Workers ----------------------------------------------------------

    /// Starts one worker. An `idle` worker is counted as available for
    /// claims; otherwise it is reserved for the job about to be sent.
    fn start_worker(&self, idle: bool) -> std::io::Result<()> {
        let counters = Arc::clone(&self.counters);
        let receiver = self.receiver.clone();
        let index = counters.next_index.fetch_add(1, Ordering::Relaxed);

        counters.live.fetch_add(1, Ordering::AcqRel);
        if idle {
            counters.idle.fetch_add(1, Ordering::AcqRel);
        }

        let spawned = thread::Builder::new()
            .name(format!("aetheric-worker-{}", index))
            .spawn({
                let counters = Arc::clone(&counters);
                move || Self::worker_loop(&receiver, &counters)
            });

        match spawned {
            Ok(handle) => {
                let mut workers = self.workers.lock();
                workers.retain(|worker| !worker.is_finished());
                workers.push(handle);
                trace!(target: "tasks", "Started worker {}", index);
                Ok(())
            }
            Err(e) => {
                counters.live.fetch_sub(1, Ordering::AcqRel);
                if idle {
                    counters.idle.fetch_sub(1, Ordering::AcqRel);
                }
                Err(e)
            }
        }
    }

    fn worker_loop(receiver: &Receiver<Job>, counters: &PoolCounters) {
        loop {
            match receiver.recv_timeout(counters.idle_timeout) {
                Ok(job) => {
                    // Jobs capture their own panics; this keeps the worker
                    // alive if one slips through anyway.
                    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(job)) {
                        warn!(target: "tasks", "Worker job panicked: {}", panic_message(payload));
                    }
                    counters.idle.fetch_add(1, Ordering::AcqRel);
                }
                Err(RecvTimeoutError::Timeout) => {
                    if counters.try_retire() {
                        trace!(target: "tasks", "Idle worker retired");
                        return;
                    }
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        counters.live.fetch_sub(1, Ordering::AcqRel);
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.sender.get_mut().take();

        let current = thread::current().id();
        for worker in self.workers.get_mut().drain(..) {
            // The last context handle may be released from inside a task.
            if worker.thread().id() == current {
                continue;
            }
            if worker.join().is_err() {
                warn!(target: "tasks", "Worker thread exited with a panic");
            }
        }
    }
}

//=========================================================================
// Unit Tests
//=========================================================================
