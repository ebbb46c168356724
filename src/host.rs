//=========================================================================
// Host
//=========================================================================
//
// Application hooks driven by the context's frame protocol.
//
// Call order per frame:
//   handle_frame_start()
//   update(time)          → Host::update
//   draw(time)            → Host::draw once per Host::windows() entry
//   handle_frame_end()
//
//=========================================================================

use winit::window::WindowId;

use crate::context::Context;
use crate::core::frame::FrameTime;
use crate::error::BoxError;

/// Application-supplied hooks.
///
/// Only `update` is required. Hooks run on the main thread while the
/// context holds the host; calling `update`/`draw` on the context from
/// inside a hook fails with `ContextError::Reentrant`.
///
/// ```rust
/// # use aetheric_runtime::prelude::*;
/// struct Game {
///     ticks: u64,
/// }
///
/// impl Host for Game {
///     fn update(&mut self, _context: &Context, _time: FrameTime) {
///         self.ticks += 1;
///     }
/// }
/// ```
pub trait Host: Send {
    /// Called once during creation, after subsystems exist. An error
    /// aborts creation and the partially built context is disposed.
    fn initialize(&mut self, _context: &Context) -> Result<(), BoxError> {
        Ok(())
    }

    /// Application update, after work items and tasks were advanced.
    fn update(&mut self, context: &Context, time: FrameTime);

    /// Replaces `update` while the host is suspended. Default does nothing;
    /// override to drain work items or tasks explicitly.
    fn update_suspended(&mut self, _context: &Context, _time: FrameTime) {}

    /// Windows that should be drawn this frame.
    fn windows(&self) -> Vec<WindowId> {
        Vec::new()
    }

    /// Draws one window.
    fn draw(&mut self, _context: &Context, _window: WindowId, _time: FrameTime) {}

    /// Called during disposal, after background work has been drained.
    ///
    /// A `dispose` issued from another hook runs once that hook returns,
    /// so this is still called with the host available.
    fn shutdown(&mut self, _context: &Context) {}
}

/// Host with no behavior, for services and tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullHost;

impl Host for NullHost {
    fn update(&mut self, _context: &Context, _time: FrameTime) {}
}
