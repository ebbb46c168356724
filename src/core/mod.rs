//=========================================================================
// Core Systems
//=========================================================================
//
// Building blocks composed by `Context`.
//
// Components:
// - `dispatcher`: main-thread work item queue
// - `tasks`: background tasks, worker pool, cancellation
// - `message_bus`: typed publish/subscribe with explicit delivery
// - `frame`: frame state machine, frame time, event hooks
// - `factory`: typed factory registry populated at startup
// - `subsystems`: subsystem contract and ordered disposal
// - `identity`: context ids and resource ownership checks
//
//=========================================================================

pub mod dispatcher;
pub mod factory;
pub mod frame;
pub mod identity;
pub mod message_bus;
pub mod subsystems;
pub mod tasks;
