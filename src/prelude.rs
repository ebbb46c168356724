//=========================================================================
// Prelude
//=========================================================================
//
// Convenience module that re-exports commonly used types and traits.
//
// Usage:
//   use aetheric_runtime::prelude::*;
//
//=========================================================================

//=== Public API ==========================================================

// Context
pub use crate::config::ContextConfig;
pub use crate::context::{Context, ContextBuilder, ContextState};
pub use crate::host::{Host, NullHost};
pub use crate::platform::Platform;

// Errors
pub use crate::error::{BoxError, ContextError, TaskError};

// Scheduling
pub use crate::core::dispatcher::WorkHandle;
pub use crate::core::tasks::{CancellationToken, TaskHandle, TaskStatus};

// Messages
pub use crate::core::message_bus::{Message, Quit, SubscriptionId};

// Frame
pub use crate::core::frame::{FrameState, FrameSummary, FrameTime, WindowFrame};

// Identity
pub use crate::core::identity::{ContextBound, ContextId};

// Subsystems and factories
pub use crate::core::factory::{FactoryRegistry, RegistryInitializer};
pub use crate::core::subsystems::{Subsystem, SubsystemFactory, SubsystemKind};
