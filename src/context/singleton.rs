//=========================================================================
// Singleton Slot
//=========================================================================
//
// Process-wide registration guarding the "one live context" rule, plus
// the per-thread hook that lets code on the main thread find its context.
//
// The slot is claimed by creation and released only at the very end of
// disposal. Claim and check happen under one lock, so two threads racing
// to create a context cannot both succeed.
//
//=========================================================================

use std::cell::RefCell;
use std::sync::{Arc, Weak};

use parking_lot::{const_mutex, Mutex};

use super::{Context, ContextInner};
use crate::core::identity::ContextId;
use crate::error::{ContextError, Result};

static CURRENT: Mutex<Option<Context>> = const_mutex(None);

thread_local! {
    static THREAD_HOOK: RefCell<Option<Weak<ContextInner>>> = const { RefCell::new(None) };
}

//--- Slot ----------------------------------------------------------------

/// Builds a context and registers it, unless one is already live.
pub(super) fn claim<F>(build: F) -> Result<Context>
where
    F: FnOnce() -> Context,
{
    let mut slot = CURRENT.lock();
    if slot.is_some() {
        return Err(ContextError::AlreadyExists);
    }

    let context = build();
    *slot = Some(context.clone());
    Ok(context)
}

/// Clears the slot if it still holds context `id`.
pub(super) fn release(id: ContextId) -> bool {
    let released = {
        let mut slot = CURRENT.lock();
        if slot.as_ref().map(Context::id) == Some(id) {
            slot.take()
        } else {
            None
        }
    };
    released.is_some()
}

/// The live context, if any.
pub(super) fn current() -> Option<Context> {
    CURRENT.lock().clone()
}

//--- Thread Hook ---------------------------------------------------------

/// Marks the calling thread as the main thread of `inner`.
pub(super) fn attach_thread(inner: &Arc<ContextInner>) {
    THREAD_HOOK.with(|hook| *hook.borrow_mut() = Some(Arc::downgrade(inner)));
}

/// Removes the calling thread's hook if it points at context `id`.
pub(super) fn detach_thread(id: ContextId) {
    THREAD_HOOK.with(|hook| {
        let mut hook = hook.borrow_mut();
        let stale = hook
            .as_ref()
            .map(|weak| weak.upgrade().map_or(true, |inner| inner.id == id))
            .unwrap_or(false);
        if stale {
            *hook = None;
        }
    });
}

/// The context whose main thread is the calling thread.
pub(super) fn thread_context() -> Option<Context> {
    THREAD_HOOK.with(|hook| {
        hook.borrow()
            .as_ref()
            .and_then(Weak::upgrade)
            .map(|inner| Context { inner })
    })
}
