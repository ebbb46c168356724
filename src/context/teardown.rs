//=========================================================================
// Context Teardown
//=========================================================================
//
// Disposal sequence, on the main thread:
//   a. refuse new tasks, then dispose subsystems
//      (UI → Input → Content → Platform → Graphics → Audio)
//   b. fire cancellation and wait for every pending task, draining work items
//   c. enter Disposing, drain work items one last time, close the dispatcher
//      and stop the worker pool
//   d. raise `shutdown` and call Host::shutdown
//   e. detach the main-thread hook
//   f. mark Disposed, release the slot, raise `context_invalidated`
//
// Failures in any step are recorded in the report and never stop the
// steps that follow.
//
//=========================================================================

use std::fmt;
use std::mem;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::Ordering;

use log::{debug, info, warn};

use super::{singleton, Context, ContextState};
use crate::core::frame::global_events;
use crate::core::subsystems::SubsystemFailure;
use crate::error::panic_message;

//=== DisposalReport ======================================================

/// Failures swallowed while tearing a context down.
#[derive(Debug, Default)]
pub(super) struct DisposalReport {
    subsystems: Vec<SubsystemFailure>,
    other: Vec<String>,
}

impl DisposalReport {
    pub(super) fn is_clean(&self) -> bool {
        self.subsystems.is_empty() && self.other.is_empty()
    }
}

impl fmt::Display for DisposalReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let failures = self
            .subsystems
            .iter()
            .map(ToString::to_string)
            .chain(self.other.iter().cloned())
            .collect::<Vec<_>>();
        f.write_str(&failures.join("; "))
    }
}

//=== Teardown ============================================================

impl Context {
    /// Runs the disposal sequence once. Later calls return an empty report.
    pub(super) fn teardown(&self) -> DisposalReport {
        let mut report = DisposalReport::default();
        if self.inner.disposal_started.swap(true, Ordering::AcqRel) {
            return report;
        }

        let id = self.id();
        info!(target: "context", "Disposing context {}", id);

        //--- a. subsystems ------------------------------------------------
        self.inner.tasks.close();
        let mut subsystems = mem::take(&mut *self.inner.subsystems.lock());
        report.subsystems = subsystems.dispose_all();

        //--- b. background tasks ------------------------------------------
        if let Err(e) = self.wait_for_tasks(true) {
            report.other.push(format!("waiting for tasks: {}", e));
        }

        //--- c. final drain -----------------------------------------------
        self.set_state(ContextState::Disposing);
        match self.inner.dispatcher.process_all() {
            Ok(count) if count > 0 => debug!(target: "context", "Final drain ran {} work item(s)", count),
            Ok(_) => {}
            Err(e) => report.other.push(format!("final drain: {}", e)),
        }

        let abandoned = self.inner.dispatcher.close();
        if abandoned > 0 {
            warn!(target: "context", "Abandoned {} work item(s) queued during shutdown", abandoned);
        }
        self.inner.messages.clear_all();
        self.inner.tasks.shutdown();

        //--- d. shutdown notification -------------------------------------
        self.inner.events.shutdown.emit(&id);
        match self.inner.host.try_lock() {
            Some(mut host) => {
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| host.shutdown(self)));
                if let Err(payload) = outcome {
                    report.other.push(format!("host shutdown panicked: {}", panic_message(payload)));
                }
            }
            None => report.other.push("host was busy during shutdown".to_owned()),
        }

        //--- e. main-thread hook ------------------------------------------
        singleton::detach_thread(id);

        //--- f. release ---------------------------------------------------
        self.set_state(ContextState::Disposed);
        singleton::release(id);
        global_events().context_invalidated.emit(&id);

        info!(target: "context", "Context {} disposed", id);
        report
    }
}
