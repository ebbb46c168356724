//=========================================================================
// Frame Time
//=========================================================================
//
// Elapsed/total time value threaded through update and draw. The context
// never measures it; the host supplies it every frame.
//
//=========================================================================

use std::time::Duration;

/// Time handed to `update` and `draw`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FrameTime {
    /// Time since the previous frame.
    pub elapsed: Duration,
    /// Time since the host loop started.
    pub total: Duration,
}

impl FrameTime {
    pub fn new(elapsed: Duration, total: Duration) -> Self {
        Self { elapsed, total }
    }

    /// The time value for the next frame, `elapsed` after this one.
    pub fn advance(self, elapsed: Duration) -> Self {
        Self {
            elapsed,
            total: self.total + elapsed,
        }
    }
}
