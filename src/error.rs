//=========================================================================
// Error Types
//=========================================================================
//
// Error taxonomy for the engine context.
//
// Usage errors (WrongThread, ObjectDisposed, CannotSpawn, ...) are
// returned at the call site that violated the contract. Failures raised
// by user work (work items, tasks) are captured on their handles and only
// surface to whoever waits on them.
//
//=========================================================================

//=== External Dependencies ===============================================

use std::any::Any;

use thiserror::Error;

//=== Aliases =============================================================

/// Boxed error used at the seams where user code reports failures
/// (subsystem factories, subsystem disposal, host initialization).
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result alias for context operations.
pub type Result<T, E = ContextError> = std::result::Result<T, E>;

//=== ContextError ========================================================

/// Errors raised by the engine context and its scheduling API.
#[derive(Debug, Error)]
pub enum ContextError {
    /// A context is already live in this process.
    #[error("an engine context already exists in this process")]
    AlreadyExists,

    /// `demand_current` was called while no context is live.
    #[error("no engine context is currently live")]
    ContextMissing,

    /// The context has been disposed.
    #[error("the engine context has been disposed")]
    ObjectDisposed,

    /// A main-thread-only operation was invoked from another thread.
    #[error("operation must be called on the context's main thread")]
    WrongThread,

    /// A task was spawned while the context is tearing down.
    #[error("cannot spawn tasks while the context is shutting down")]
    CannotSpawn,

    /// A work item was queued after the final dispatcher drain.
    #[error("cannot queue work items after the dispatcher has closed")]
    CannotQueue,

    /// A resource belongs to a different context instance.
    #[error("resource belongs to context #{found}, not context #{expected}")]
    InvalidResource { expected: u64, found: u64 },

    /// The frame protocol was driven out of order.
    #[error("frame driver expected state {expected}, found {found}")]
    FrameOrder {
        expected: &'static str,
        found: &'static str,
    },

    /// A frame hook was re-entered from inside a host callback.
    #[error("frame driver re-entered from inside a host hook")]
    Reentrant,

    /// A pending task attempted to wait on the pending set it belongs to.
    #[error("a pending task cannot wait for the pending task set")]
    WaitFromTask,

    /// A work item's action panicked; the message is the panic payload.
    #[error("work item panicked: {0}")]
    WorkItemPanicked(String),

    /// The work item was dropped without ever running.
    #[error("work item was dropped before it executed")]
    WorkItemAbandoned,

    /// A step of context creation failed.
    #[error("context initialization failed during {stage}")]
    Initialization {
        stage: &'static str,
        #[source]
        source: BoxError,
    },
}

//=== TaskError ===========================================================

/// Terminal failure of a background task.
#[derive(Debug, Error)]
pub enum TaskError {
    /// The task observed the cancellation signal, or was canceled before
    /// it ever started.
    #[error("task was canceled")]
    Canceled,

    /// The task body panicked.
    #[error("task panicked: {0}")]
    Faulted(String),

    /// The task body returned an error of its own.
    #[error("task failed: {0}")]
    Failed(#[source] BoxError),

    /// The outcome was already taken through `TaskHandle::try_result`.
    #[error("task outcome was already taken")]
    OutcomeTaken,
}

impl TaskError {
    /// Wraps an arbitrary error as a task failure.
    pub fn failed<E>(err: E) -> Self
    where
        E: Into<BoxError>,
    {
        Self::Failed(err.into())
    }
}

//=== Panic Payloads ======================================================

/// Extracts a readable message from a caught panic payload.
pub(crate) fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

//=========================================================================
// Unit Tests
//=========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::panic;

    #[test]
    fn panic_message_reads_str_payload() {
        let payload = panic::catch_unwind(|| panic!("boom")).unwrap_err();
        assert_eq!(panic_message(payload), "boom");
    }

    #[test]
    fn panic_message_reads_formatted_payload() {
        let payload = panic::catch_unwind(|| panic!("code {}", 7)).unwrap_err();
        assert_eq!(panic_message(payload), "code 7");
    }

    #[test]
    fn panic_message_falls_back_for_other_payloads() {
        let payload = panic::catch_unwind(|| panic::panic_any(42_u32)).unwrap_err();
        assert_eq!(panic_message(payload), "unknown panic");
    }

    #[test]
    fn invalid_resource_names_both_contexts() {
        let err = ContextError::InvalidResource { expected: 1, found: 2 };
        assert_eq!(
            err.to_string(),
            "resource belongs to context #2, not context #1"
        );
    }

    #[test]
    fn initialization_error_exposes_source() {
        use std::error::Error as _;

        let err = ContextError::Initialization {
            stage: "host",
            source: "no display".into(),
        };
        assert_eq!(err.source().map(|s| s.to_string()), Some("no display".into()));
    }
}
