//=========================================================================
// Main-Thread Dispatcher
//=========================================================================
//
// FIFO queue of work items bound to the thread that constructed it.
//
// Any thread may enqueue; only the owner thread may drain. The queue lock
// is held for push/pop only, never while an item runs, so items are free
// to queue follow-up work (which lands in the next drain).
//
//=========================================================================

//=== External Dependencies ===============================================

use std::collections::VecDeque;
use std::mem;
use std::thread::{self, ThreadId};

use log::{debug, trace};
use parking_lot::Mutex;

//=== Internal Dependencies ===============================================

use super::work_item::{run_captured, WorkHandle, WorkItem};
use crate::core::identity::ContextId;
use crate::error::{ContextError, Result};

//=== DispatcherState =====================================================

#[derive(Default)]
struct DispatcherState {
    queue: VecDeque<WorkItem>,
    closed: bool,
}

//=== MainThreadDispatcher ================================================

/// Work-item queue owned by the main thread.
pub struct MainThreadDispatcher {
    context: ContextId,
    owner: ThreadId,
    state: Mutex<DispatcherState>,
}

impl MainThreadDispatcher {
    //--- Construction -----------------------------------------------------

    /// Creates a dispatcher owned by the calling thread.
    pub(crate) fn new(context: ContextId) -> Self {
        Self {
            context,
            owner: thread::current().id(),
            state: Mutex::new(DispatcherState::default()),
        }
    }

    //--- Thread Affinity --------------------------------------------------

    /// The thread allowed to drain this dispatcher.
    pub fn owner(&self) -> ThreadId {
        self.owner
    }

    /// True when called from the owner thread.
    pub fn is_owner_thread(&self) -> bool {
        thread::current().id() == self.owner
    }

    fn ensure_owner_thread(&self) -> Result<()> {
        if self.is_owner_thread() {
            Ok(())
        } else {
            Err(ContextError::WrongThread)
        }
    }

    //--- Queuing ----------------------------------------------------------

    /// Schedules `action` on the main thread.
    ///
    /// On the owner thread with `force_async == false` the action runs
    /// inline and the returned handle is already completed; nothing is
    /// queued. Otherwise the item is appended and completes on a later
    /// drain.
    pub(crate) fn queue<F, T>(&self, action: F, force_async: bool) -> Result<WorkHandle<T>>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        if !force_async && self.is_owner_thread() {
            trace!(target: "dispatcher", "Running work item inline on main thread");
            return Ok(WorkHandle::completed(self.context, run_captured(action)));
        }

        let (item, handle) = WorkItem::with_handle(self.context, action);
        self.enqueue(item)?;
        Ok(handle)
    }

    /// Appends an item to the queue.
    pub(crate) fn enqueue(&self, item: WorkItem) -> Result<()> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(ContextError::CannotQueue);
        }
        state.queue.push_back(item);
        Ok(())
    }

    //--- Draining ---------------------------------------------------------

    /// Runs every item queued at the time of the call, in FIFO order.
    ///
    /// Returns the number of items executed.
    pub fn process_all(&self) -> Result<usize> {
        self.ensure_owner_thread()?;

        let batch = mem::take(&mut self.state.lock().queue);
        let count = batch.len();

        for item in batch {
            item.execute();
        }

        if count > 0 {
            trace!(target: "dispatcher", "Drained {} work item(s)", count);
        }
        Ok(count)
    }

    /// Runs the oldest queued item, if any. Returns whether one ran.
    pub fn process_single(&self) -> Result<bool> {
        self.ensure_owner_thread()?;

        let next = self.state.lock().queue.pop_front();
        match next {
            Some(item) => {
                item.execute();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    //--- Shutdown ---------------------------------------------------------

    /// Refuses further items. Anything still queued is dropped, which
    /// completes its handle with `WorkItemAbandoned`.
    pub(crate) fn close(&self) -> usize {
        let leftovers = {
            let mut state = self.state.lock();
            state.closed = true;
            mem::take(&mut state.queue)
        };

        if !leftovers.is_empty() {
            debug!(
                target: "dispatcher",
                "Dispatcher closed with {} unexecuted work item(s)",
                leftovers.len()
            );
        }
        leftovers.len()
    }

    //--- Query API --------------------------------------------------------

    /// Number of items waiting for a drain.
    pub fn len(&self) -> usize {
        self.state.lock().queue.len()
    }

    /// True when nothing is waiting.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True once `close` has run.
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }
}

//=========================================================================
// Unit Tests
//=========================================================================
