//=========================================================================
// Notifications
//=========================================================================
//
// Observer lists for the context's lifecycle notifications.
//
// Each `Event<T>` fires to zero or more observers in registration order.
// Observers are snapshotted before firing, so an observer may subscribe
// or unsubscribe without deadlocking; the change applies to the next
// emission.
//
//=========================================================================

//=== External Dependencies ===============================================

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::error;
use parking_lot::{const_mutex, Mutex};
use winit::window::WindowId;

//=== Internal Dependencies ===============================================

use super::FrameTime;
use crate::core::identity::ContextId;
use crate::error::panic_message;

//=== ObserverId ==========================================================

/// Identifies one registered observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

impl ObserverId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

//=== Event ===============================================================

type Observer<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Observer list for one notification kind.
pub struct Event<T> {
    observers: Mutex<Vec<(ObserverId, Observer<T>)>>,
}

impl<T> Event<T> {
    pub const fn new() -> Self {
        Self {
            observers: const_mutex(Vec::new()),
        }
    }

    /// Appends an observer.
    pub fn subscribe<F>(&self, observer: F) -> ObserverId
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = ObserverId::next();
        self.observers.lock().push((id, Arc::new(observer)));
        id
    }

    /// Removes an observer. Returns false if it was not registered.
    pub fn unsubscribe(&self, id: ObserverId) -> bool {
        let mut observers = self.observers.lock();
        let before = observers.len();
        observers.retain(|(existing, _)| *existing != id);
        observers.len() != before
    }

    /// Fires the notification. A panicking observer is logged and the
    /// remaining observers still run.
    pub fn emit(&self, args: &T) {
        let snapshot: Vec<Observer<T>> = self
            .observers
            .lock()
            .iter()
            .map(|(_, observer)| Arc::clone(observer))
            .collect();

        for observer in snapshot {
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| observer(args))) {
                error!(target: "context", "Notification observer panicked: {}", panic_message(payload));
            }
        }
    }

    pub fn len(&self) -> usize {
        self.observers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Default for Event<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Event<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event").field("observers", &self.len()).finish()
    }
}

//=== Payloads ============================================================

/// Payload of the per-window draw notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowFrame {
    pub window: WindowId,
    pub time: FrameTime,
}

/// Payload of the frame-end notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameSummary {
    /// Index of the frame that just ended (first frame is 0).
    pub index: u64,
    /// Wall time between frame start and frame end.
    pub duration: Duration,
}

//=== ContextEvents =======================================================

/// Notifications raised by one context.
#[derive(Debug, Default)]
pub struct ContextEvents {
    /// Frame index of the frame being started.
    pub frame_start: Event<u64>,
    pub frame_end: Event<FrameSummary>,
    pub updating_subsystems: Event<FrameTime>,
    pub updating: Event<FrameTime>,
    pub drawing: Event<FrameTime>,
    pub window_drawing: Event<WindowFrame>,
    pub window_drawn: Event<WindowFrame>,
    pub initialized: Event<ContextId>,
    pub shutdown: Event<ContextId>,
}

//=== GlobalEvents ========================================================

/// Process-wide notifications, independent of any single context.
#[derive(Debug)]
pub struct GlobalEvents {
    /// A context finished initializing and became current.
    pub context_initialized: Event<ContextId>,
    /// The current context finished disposal and released the slot.
    pub context_invalidated: Event<ContextId>,
}

static GLOBAL_EVENTS: GlobalEvents = GlobalEvents {
    context_initialized: Event::new(),
    context_invalidated: Event::new(),
};

/// The process-wide notification set.
pub fn global_events() -> &'static GlobalEvents {
    &GLOBAL_EVENTS
}

//=========================================================================
// Unit Tests
//=========================================================================
