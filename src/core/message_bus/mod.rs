//=========================================================================
// Message Bus
//=========================================================================
//
// Typed publish/subscribe messaging between subsystems and the host.
//
// Components:
// - `envelope`: type-erased storage for buffered messages
// - `bus`: publish buffer, subscriber registry, explicit delivery
//
//=========================================================================

//=== Module Declarations =================================================

mod bus;
mod envelope;

//=== Public API ==========================================================

pub use bus::{Message, MessageBus, Quit, SubscriptionId};
