//=========================================================================
// Background Tasks
//=========================================================================
//
// A spawned task pairs a body with the cancellation token that was live
// when it was spawned. Tasks are created in `Created` state; the registry
// starts them on the next tick.
//
// Lifecycle:
//   Created ──tick──► Scheduled ──worker──► Running ──► Completed
//      │                                       ├──────► Canceled
//      └──(signal fired before start)──► Canceled  └──► Faulted
//
//=========================================================================

//=== External Dependencies ===============================================

use std::cell::Cell;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, trace};
use parking_lot::{Condvar, Mutex};

//=== Internal Dependencies ===============================================

use super::cancellation::CancellationToken;
use crate::core::identity::{ContextBound, ContextId};
use crate::error::{panic_message, TaskError};

//=== Identity ============================================================

/// Process-unique task identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(u64);

impl TaskId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

thread_local! {
    static CURRENT_TASK: Cell<Option<TaskId>> = const { Cell::new(None) };
}

/// The task whose body is executing on this thread, if any.
pub(crate) fn current_task() -> Option<TaskId> {
    CURRENT_TASK.with(Cell::get)
}

//=== TaskStatus ==========================================================

/// Observable state of a spawned task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskStatus {
    /// Spawned, waiting for a tick to start it.
    Created,
    /// Handed to the worker pool.
    Scheduled,
    /// Body is executing.
    Running,
    /// Body returned successfully.
    Completed,
    /// Body observed cancellation, or never started because of it.
    Canceled,
    /// Body panicked or returned an error.
    Faulted,
}

impl TaskStatus {
    /// Completed, canceled or faulted.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Canceled | Self::Faulted)
    }
}

//=== Shared State ========================================================

pub(crate) type TaskBody<T> = Box<dyn FnOnce(CancellationToken) -> Result<T, TaskError> + Send>;
pub(crate) type Job = Box<dyn FnOnce() + Send + 'static>;

struct TaskState<T> {
    status: TaskStatus,
    body: Option<TaskBody<T>>,
    outcome: Option<Result<T, TaskError>>,
}

pub(crate) struct TaskShared<T> {
    id: TaskId,
    context: ContextId,
    token: CancellationToken,
    state: Mutex<TaskState<T>>,
    finished: Condvar,
}

impl<T: Send + 'static> TaskShared<T> {
    pub(crate) fn new(context: ContextId, token: CancellationToken, body: TaskBody<T>) -> Arc<Self> {
        Arc::new(Self {
            id: TaskId::next(),
            context,
            token,
            state: Mutex::new(TaskState {
                status: TaskStatus::Created,
                body: Some(body),
                outcome: None,
            }),
            finished: Condvar::new(),
        })
    }

    fn finish(&self, outcome: Result<T, TaskError>) {
        let status = match &outcome {
            Ok(_) => TaskStatus::Completed,
            Err(TaskError::Canceled) => TaskStatus::Canceled,
            Err(_) => TaskStatus::Faulted,
        };

        {
            let mut state = self.state.lock();
            state.status = status;
            state.outcome = Some(outcome);
        }
        self.finished.notify_all();
        trace!(target: "tasks", "{} finished as {:?}", self.id, status);
    }

    fn run(&self) {
        let body = {
            let mut state = self.state.lock();
            state.status = TaskStatus::Running;
            state.body.take()
        };
        let Some(body) = body else {
            return;
        };

        let token = self.token.clone();
        CURRENT_TASK.with(|c| c.set(Some(self.id)));
        let outcome = panic::catch_unwind(AssertUnwindSafe(move || body(token)))
            .unwrap_or_else(|payload| Err(TaskError::Faulted(panic_message(payload))));
        CURRENT_TASK.with(|c| c.set(None));

        self.finish(outcome);
    }
}

//=== PendingTask =========================================================

/// Type-erased view of a task used by the registry.
pub(crate) trait PendingTask: Send + Sync {
    fn id(&self) -> TaskId;

    fn status(&self) -> TaskStatus;

    /// Moves a `Created` task to `Scheduled` and returns the job that runs
    /// it. Returns `None` if the task was already started.
    fn take_start(self: Arc<Self>) -> Option<Job>;

    /// Finishes a task that never started. Returns false if it had.
    fn abort_unstarted(&self, reason: TaskError) -> bool;
}

impl<T: Send + 'static> PendingTask for TaskShared<T> {
    fn id(&self) -> TaskId {
        self.id
    }

    fn status(&self) -> TaskStatus {
        self.state.lock().status
    }

    fn take_start(self: Arc<Self>) -> Option<Job> {
        {
            let mut state = self.state.lock();
            if state.status != TaskStatus::Created {
                return None;
            }
            state.status = TaskStatus::Scheduled;
        }
        Some(Box::new(move || self.run()))
    }

    fn abort_unstarted(&self, reason: TaskError) -> bool {
        {
            let mut state = self.state.lock();
            if !matches!(state.status, TaskStatus::Created | TaskStatus::Scheduled) {
                return false;
            }
            state.body = None;
        }
        debug!(target: "tasks", "{} finished without running: {}", self.id, reason);
        self.finish(Err(reason));
        true
    }
}

//=== TaskHandle ==========================================================

/// Handle to a spawned background task.
///
/// Waiting on a handle blocks until the task reaches a terminal state.
/// A task only starts once the context ticks (`update`) or waits for
/// pending tasks, so waiting on a fresh handle from the main thread
/// without driving either never returns.
pub struct TaskHandle<T> {
    shared: Arc<TaskShared<T>>,
}

impl<T: Send + 'static> TaskHandle<T> {
    pub(crate) fn new(shared: Arc<TaskShared<T>>) -> Self {
        Self { shared }
    }

    pub fn id(&self) -> TaskId {
        self.shared.id
    }

    pub fn status(&self) -> TaskStatus {
        self.shared.status()
    }

    /// True once the task completed, was canceled, or faulted.
    pub fn is_finished(&self) -> bool {
        self.status().is_terminal()
    }

    /// The cancellation token the task was spawned with.
    pub fn token(&self) -> &CancellationToken {
        &self.shared.token
    }

    /// Blocks until the task finishes and returns its outcome.
    pub fn wait(self) -> Result<T, TaskError> {
        let mut state = self.shared.state.lock();
        loop {
            if let Some(outcome) = state.outcome.take() {
                return outcome;
            }
            if state.status.is_terminal() {
                return Err(TaskError::OutcomeTaken);
            }
            self.shared.finished.wait(&mut state);
        }
    }

    /// Blocks for at most `timeout`; returns whether the task finished.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let mut state = self.shared.state.lock();
        self.shared
            .finished
            .wait_while_for(&mut state, |state| !state.status.is_terminal(), timeout);
        state.status.is_terminal()
    }

    /// Takes the outcome if the task has finished. A later `wait` then
    /// reports `TaskError::OutcomeTaken`.
    pub fn try_result(&mut self) -> Option<Result<T, TaskError>> {
        self.shared.state.lock().outcome.take()
    }
}

impl<T> ContextBound for TaskHandle<T> {
    fn context_id(&self) -> ContextId {
        self.shared.context
    }
}

impl<T> fmt::Debug for TaskHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHandle")
            .field("id", &self.shared.id)
            .field("context", &self.shared.context)
            .finish()
    }
}

//=========================================================================
// Unit Tests
//=========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::tasks::CancellationSource;
    use std::thread;

    fn task<T, F>(token: CancellationToken, body: F) -> Arc<TaskShared<T>>
    where
        T: Send + 'static,
        F: FnOnce(CancellationToken) -> Result<T, TaskError> + Send + 'static,
    {
        TaskShared::new(ContextId::next(), token, Box::new(body))
    }

    #[test]
    fn new_task_is_created() {
        let shared = task(CancellationToken::none(), |_| Ok(()));
        assert_eq!(shared.status(), TaskStatus::Created);
    }

    #[test]
    fn start_can_only_be_taken_once() {
        let shared = task(CancellationToken::none(), |_| Ok(1));
        let job = Arc::clone(&shared).take_start();
        assert!(job.is_some());
        assert_eq!(shared.status(), TaskStatus::Scheduled);
        assert!(Arc::clone(&shared).take_start().is_none());
    }

    #[test]
    fn running_job_completes_handle() {
        let shared = task(CancellationToken::none(), |_| Ok(10));
        let handle = TaskHandle::new(Arc::clone(&shared));

        let job = Arc::clone(&shared).take_start().unwrap();
        thread::spawn(job).join().unwrap();

        assert_eq!(handle.status(), TaskStatus::Completed);
        assert_eq!(handle.wait().unwrap(), 10);
    }

    #[test]
    fn wait_after_try_result_reports_taken_outcome() {
        let shared = task(CancellationToken::none(), |_| Ok(3));
        let mut handle = TaskHandle::new(Arc::clone(&shared));

        Arc::clone(&shared).take_start().unwrap()();
        assert!(matches!(handle.try_result(), Some(Ok(3))));
        assert!(handle.try_result().is_none());
        assert!(matches!(handle.wait(), Err(TaskError::OutcomeTaken)));
    }

    #[test]
    fn observed_cancellation_marks_canceled() {
        let source = CancellationSource::new();
        source.cancel();
        let shared = task(source.token(), |token| {
            token.check()?;
            Ok(())
        });

        Arc::clone(&shared).take_start().unwrap()();
        assert_eq!(shared.status(), TaskStatus::Canceled);
    }

    #[test]
    fn panic_and_error_mark_faulted() {
        let panics = task(CancellationToken::none(), |_| -> Result<(), TaskError> {
            panic!("task exploded")
        });
        Arc::clone(&panics).take_start().unwrap()();
        let handle = TaskHandle::new(panics);
        assert_eq!(handle.status(), TaskStatus::Faulted);
        assert!(matches!(handle.wait(), Err(TaskError::Faulted(msg)) if msg == "task exploded"));

        let fails = task(CancellationToken::none(), |_| -> Result<(), TaskError> {
            Err(TaskError::failed("disk full"))
        });
        Arc::clone(&fails).take_start().unwrap()();
        assert_eq!(fails.status(), TaskStatus::Faulted);
    }

    #[test]
    fn abort_unstarted_only_applies_before_running() {
        let idle = task(CancellationToken::none(), |_| Ok(()));
        assert!(idle.abort_unstarted(TaskError::Canceled));
        assert_eq!(idle.status(), TaskStatus::Canceled);

        let done = task(CancellationToken::none(), |_| Ok(()));
        Arc::clone(&done).take_start().unwrap()();
        assert!(!done.abort_unstarted(TaskError::Canceled));
        assert_eq!(done.status(), TaskStatus::Completed);
    }

    #[test]
    fn current_task_is_set_only_inside_the_body() {
        let (tx, rx) = crossbeam_channel::bounded(1);
        let shared = task(CancellationToken::none(), move |_| {
            tx.send(current_task()).unwrap();
            Ok(())
        });
        let id = shared.id();

        Arc::clone(&shared).take_start().unwrap()();
        assert_eq!(rx.recv().unwrap(), Some(id));
        assert_eq!(current_task(), None);
    }

    #[test]
    fn wait_timeout_reports_unfinished_task() {
        let handle = TaskHandle::new(task(CancellationToken::none(), |_| Ok(())));
        assert!(!handle.wait_timeout(Duration::from_millis(10)));
    }
}
