//=========================================================================
// Shared Test Support
//=========================================================================
//
// Only one context may be live per process, so every test that creates
// one holds `serial()` for its whole body. `Live` disposes the context
// before the lock is released, even when the test panics.
//
//=========================================================================

#![allow(dead_code)]

use std::ops::Deref;
use std::sync::Arc;

use aetheric_runtime::prelude::*;
use parking_lot::{const_mutex, Mutex, MutexGuard};

static SERIAL: Mutex<()> = const_mutex(());

/// Serializes tests that touch the process-wide context slot.
pub fn serial() -> MutexGuard<'static, ()> {
    let _ = env_logger::builder().is_test(true).try_init();
    SERIAL.lock()
}

/// A context that is disposed when the test ends.
pub struct Live {
    pub context: Context,
    _serial: MutexGuard<'static, ()>,
}

impl Live {
    pub fn new(builder: ContextBuilder) -> Self {
        Self::with_host(builder, NullHost)
    }

    pub fn with_host<H: Host + 'static>(builder: ContextBuilder, host: H) -> Self {
        let serial = serial();
        let context = builder.build(host).expect("context creation failed");
        Self {
            context,
            _serial: serial,
        }
    }
}

impl Deref for Live {
    type Target = Context;

    fn deref(&self) -> &Context {
        &self.context
    }
}

impl Drop for Live {
    fn drop(&mut self) {
        let _ = self.context.dispose();
    }
}

/// Headless builder with a small worker pool.
pub fn headless() -> ContextBuilder {
    ContextBuilder::new().with_service_mode(true).with_worker_threads(2)
}

/// Shared, clonable event log.
#[derive(Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub fn push(&self, entry: impl Into<String>) {
        self.0.lock().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().clone()
    }
}
