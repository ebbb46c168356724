//=========================================================================
// Work Items
//=========================================================================
//
// A work item is a unit of deferred main-thread work. Result-bearing
// items are paired with a `WorkHandle` that receives the outcome through
// a one-shot crossbeam channel.
//
// Architecture:
//   queue_work_item(f) ──► WorkItem ──► dispatcher queue
//          │                   │
//          ▼                   ▼ (drain on main thread)
//     WorkHandle ◄──bounded(1)── run f, catch panic, send outcome
//
//=========================================================================

//=== External Dependencies ===============================================

use std::fmt;
use std::mem;
use std::panic::{self, AssertUnwindSafe};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, TryRecvError};

//=== Internal Dependencies ===============================================

use crate::core::identity::{ContextBound, ContextId};
use crate::error::{panic_message, ContextError, Result};

//=== WorkItem ============================================================

/// Deferred main-thread action. Consumed exactly once.
pub(crate) struct WorkItem {
    action: Box<dyn FnOnce() + Send + 'static>,
}

impl WorkItem {
    /// Builds a work item together with the handle that observes it.
    pub(crate) fn with_handle<F, T>(context: ContextId, action: F) -> (Self, WorkHandle<T>)
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let (sender, receiver) = bounded(1);

        let item = WorkItem {
            action: Box::new(move || {
                // The waiter may have dropped its handle already.
                let _ = sender.send(run_captured(action));
            }),
        };

        (item, WorkHandle::waiting(context, receiver))
    }

    /// Runs the action. Panics are captured on the handle, never here.
    pub(crate) fn execute(self) {
        (self.action)()
    }
}

impl fmt::Debug for WorkItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("WorkItem")
    }
}

/// Runs `action`, converting a panic into `WorkItemPanicked`.
pub(crate) fn run_captured<F, T>(action: F) -> Result<T>
where
    F: FnOnce() -> T,
{
    panic::catch_unwind(AssertUnwindSafe(action))
        .map_err(|payload| ContextError::WorkItemPanicked(panic_message(payload)))
}

//=== WorkHandle ==========================================================

enum HandleState<T> {
    Waiting(Receiver<Result<T>>),
    Ready(Result<T>),
    Spent,
}

/// Completion handle for a queued work item.
///
/// Items executed on the synchronous fast path hand back an already
/// completed handle. Deferred items complete when a drain on the main
/// thread runs them.
///
/// Waiting on a handle from the main thread for an item that was deferred
/// deadlocks unless something else drains the queue; the fast path exists
/// precisely so main-thread callers never hit that case.
pub struct WorkHandle<T> {
    context: ContextId,
    state: HandleState<T>,
}

impl<T> WorkHandle<T> {
    pub(crate) fn completed(context: ContextId, outcome: Result<T>) -> Self {
        Self {
            context,
            state: HandleState::Ready(outcome),
        }
    }

    fn waiting(context: ContextId, receiver: Receiver<Result<T>>) -> Self {
        Self {
            context,
            state: HandleState::Waiting(receiver),
        }
    }

    /// Returns true once the item has executed (or was dropped unexecuted).
    pub fn is_completed(&mut self) -> bool {
        self.poll();
        !matches!(self.state, HandleState::Waiting(_))
    }

    /// Takes the outcome if the item has completed.
    ///
    /// Once this returns `Some`, the handle is spent and any later wait
    /// reports `WorkItemAbandoned`.
    pub fn try_result(&mut self) -> Option<Result<T>> {
        self.poll();
        match mem::replace(&mut self.state, HandleState::Spent) {
            HandleState::Ready(outcome) => Some(outcome),
            other => {
                self.state = other;
                None
            }
        }
    }

    /// Blocks until the item has executed and returns its outcome.
    ///
    /// A panic inside the action is returned as `WorkItemPanicked`.
    pub fn wait(self) -> Result<T> {
        match self.state {
            HandleState::Ready(outcome) => outcome,
            HandleState::Waiting(receiver) => receiver
                .recv()
                .unwrap_or(Err(ContextError::WorkItemAbandoned)),
            HandleState::Spent => Err(ContextError::WorkItemAbandoned),
        }
    }

    /// Blocks for at most `timeout`. Gives the handle back if the item has
    /// not run yet.
    pub fn wait_timeout(self, timeout: Duration) -> std::result::Result<Result<T>, Self> {
        let context = self.context;
        match self.state {
            HandleState::Ready(outcome) => Ok(outcome),
            HandleState::Spent => Ok(Err(ContextError::WorkItemAbandoned)),
            HandleState::Waiting(receiver) => match receiver.recv_timeout(timeout) {
                Ok(outcome) => Ok(outcome),
                Err(RecvTimeoutError::Disconnected) => Ok(Err(ContextError::WorkItemAbandoned)),
                Err(RecvTimeoutError::Timeout) => Err(Self::waiting(context, receiver)),
            },
        }
    }

    fn poll(&mut self) {
        let outcome = match &self.state {
            HandleState::Waiting(receiver) => match receiver.try_recv() {
                Ok(outcome) => outcome,
                Err(TryRecvError::Disconnected) => Err(ContextError::WorkItemAbandoned),
                Err(TryRecvError::Empty) => return,
            },
            _ => return,
        };
        self.state = HandleState::Ready(outcome);
    }
}

impl<T> ContextBound for WorkHandle<T> {
    fn context_id(&self) -> ContextId {
        self.context
    }
}

impl<T> fmt::Debug for WorkHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self.state {
            HandleState::Waiting(_) => "waiting",
            HandleState::Ready(_) => "ready",
            HandleState::Spent => "spent",
        };
        f.debug_struct("WorkHandle")
            .field("context", &self.context)
            .field("state", &state)
            .finish()
    }
}

//=========================================================================
// Unit Tests
//=========================================================================
