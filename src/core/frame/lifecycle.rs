//=========================================================================
// Frame Lifecycle
//=========================================================================
//
// Two-state machine guarding the per-frame protocol:
//
//   Idle ──handle_frame_start()──► FrameStarted ──handle_frame_end()──► Idle
//
// The open frame doubles as a profiling scope: its start instant is kept
// until the frame ends and the measured duration is reported.
//
//=========================================================================

use std::time::{Duration, Instant};

use log::trace;

use super::events::FrameSummary;
use crate::error::{ContextError, Result};

//=== FrameState ==========================================================

/// Where the frame protocol currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameState {
    Idle,
    FrameStarted,
}

impl FrameState {
    fn name(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::FrameStarted => "frame-started",
        }
    }
}

//=== FrameLifecycle ======================================================

/// Frame protocol state plus the open profiling scope.
#[derive(Debug)]
pub struct FrameLifecycle {
    state: FrameState,
    next_index: u64,
    scope: Option<(u64, Instant)>,
    last_duration: Option<Duration>,
}

impl FrameLifecycle {
    pub fn new() -> Self {
        Self {
            state: FrameState::Idle,
            next_index: 0,
            scope: None,
            last_duration: None,
        }
    }

    /// Opens a frame. Fails unless the lifecycle is idle.
    pub fn begin(&mut self) -> Result<u64> {
        self.ensure_state(FrameState::Idle)?;

        let index = self.next_index;
        self.next_index += 1;
        self.scope = Some((index, Instant::now()));
        self.state = FrameState::FrameStarted;

        trace!(target: "frame", "Frame {} started", index);
        Ok(index)
    }

    /// Closes the open frame and reports its duration.
    pub fn end(&mut self) -> Result<FrameSummary> {
        self.ensure_state(FrameState::FrameStarted)?;

        let (index, started) = self.scope.take().unwrap_or((self.next_index.saturating_sub(1), Instant::now()));
        let duration = started.elapsed();
        self.last_duration = Some(duration);
        self.state = FrameState::Idle;

        trace!(target: "frame", "Frame {} ended after {:?}", index, duration);
        Ok(FrameSummary { index, duration })
    }

    pub fn state(&self) -> FrameState {
        self.state
    }

    /// Number of frames started so far.
    pub fn frames_started(&self) -> u64 {
        self.next_index
    }

    /// Duration of the most recently completed frame.
    pub fn last_duration(&self) -> Option<Duration> {
        self.last_duration
    }

    fn ensure_state(&self, expected: FrameState) -> Result<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(ContextError::FrameOrder {
                expected: expected.name(),
                found: self.state.name(),
            })
        }
    }
}

impl Default for FrameLifecycle {
    fn default() -> Self {
        Self::new()
    }
}

//=========================================================================
// Unit Tests
//=========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_idle() {
        let lifecycle = FrameLifecycle::new();
        assert_eq!(lifecycle.state(), FrameState::Idle);
        assert_eq!(lifecycle.frames_started(), 0);
        assert!(lifecycle.last_duration().is_none());
    }

    #[test]
    fn begin_end_cycle_repeats() {
        let mut lifecycle = FrameLifecycle::new();

        assert_eq!(lifecycle.begin().unwrap(), 0);
        assert_eq!(lifecycle.state(), FrameState::FrameStarted);
        assert_eq!(lifecycle.end().unwrap().index, 0);
        assert_eq!(lifecycle.state(), FrameState::Idle);

        assert_eq!(lifecycle.begin().unwrap(), 1);
        let summary = lifecycle.end().unwrap();
        assert_eq!(summary.index, 1);
        assert_eq!(lifecycle.last_duration(), Some(summary.duration));
    }

    #[test]
    fn double_begin_is_rejected() {
        let mut lifecycle = FrameLifecycle::new();
        lifecycle.begin().unwrap();

        let err = lifecycle.begin().unwrap_err();
        assert!(matches!(
            err,
            ContextError::FrameOrder { expected: "idle", found: "frame-started" }
        ));
        assert_eq!(lifecycle.state(), FrameState::FrameStarted);
    }

    #[test]
    fn end_without_begin_is_rejected() {
        let mut lifecycle = FrameLifecycle::new();
        assert!(matches!(lifecycle.end(), Err(ContextError::FrameOrder { .. })));
    }
}
