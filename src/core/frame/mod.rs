//=========================================================================
// Frame System
//=========================================================================
//
// Per-frame protocol and the notifications raised around it.
//
// Components:
// - `time`: host-supplied frame time
// - `events`: observer lists (per context and process-wide)
// - `lifecycle`: Idle/FrameStarted state machine and profiling scope
//
//=========================================================================

//=== Module Declarations =================================================

mod events;
mod lifecycle;
mod time;

//=== Public API ==========================================================

pub use events::{
    global_events, ContextEvents, Event, FrameSummary, GlobalEvents, ObserverId, WindowFrame,
};
pub use lifecycle::{FrameLifecycle, FrameState};
pub use time::FrameTime;
