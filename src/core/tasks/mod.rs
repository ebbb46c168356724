//=========================================================================
// Task System
//=========================================================================
//
// Background tasks with cooperative cancellation.
//
// Components:
// - `cancellation`: shared cancel signal and per-task tokens
// - `worker_pool`: threads that execute task bodies
// - `task`: task state machine and handles
// - `registry`: pending set and per-tick start/retire protocol
//
//=========================================================================

//=== Module Declarations =================================================

mod cancellation;
mod registry;
mod task;
mod worker_pool;

//=== Public API ==========================================================

pub use cancellation::{CancellationSource, CancellationToken};
pub use registry::{TaskRegistry, TickReport};
pub use task::{TaskHandle, TaskId, TaskStatus};
