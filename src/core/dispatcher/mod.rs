//=========================================================================
// Dispatcher
//=========================================================================
//
// Main-thread work scheduling.
//
// Components:
// - `work_item`: deferred actions and their completion handles
// - `dispatcher`: the main-thread FIFO queue
//
//=========================================================================

//=== Module Declarations =================================================

mod dispatcher;
mod work_item;

//=== Public API ==========================================================

pub use dispatcher::MainThreadDispatcher;
pub use work_item::WorkHandle;
