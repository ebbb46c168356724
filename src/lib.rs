//=========================================================================
// Aetheric Runtime Library Root
//
// Engine context runtime: a single process-wide context that owns the
// main thread, schedules work onto it, runs background tasks with
// cooperative cancellation, delivers typed messages, drives the frame
// protocol, and tears its subsystems down in a fixed order.
//
// Typical usage:
// ```no_run
// use aetheric_runtime::prelude::*;
//
// fn main() -> Result<(), ContextError> {
//     let context = ContextBuilder::new().build(NullHost)?;
//     context.queue_work_item(|| println!("on the main thread"), true)?;
//     context.process_work_items()?;
//     context.dispose()
// }
// ```
//
//=========================================================================

//--- Public Modules ------------------------------------------------------
//
// `core` holds the building blocks the context composes (dispatcher,
// task registry, message bus, frame driver, factories, subsystems).
// They are public so hosts can name their types; applications normally
// go through `Context`.
//
pub mod core;

pub mod config;
pub mod context;
pub mod error;
pub mod host;
pub mod platform;
pub mod prelude;

//--- Public Exports ------------------------------------------------------

pub use config::ContextConfig;
pub use context::{Context, ContextBuilder, ContextState};
pub use error::{BoxError, ContextError, Result, TaskError};
pub use host::{Host, NullHost};
pub use platform::Platform;
