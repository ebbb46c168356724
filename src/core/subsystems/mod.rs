//=========================================================================
// Subsystems
//=========================================================================
//
// Contract between the context and its pluggable subsystems (platform,
// content, graphics, audio, input, UI). The context never looks inside a
// subsystem; it only creates it through a registered factory, hands it
// out through accessors, and disposes it in a fixed order.
//
// Disposal order:
//   UI → Input → Content → Platform → Graphics → Audio
//
//=========================================================================

//=== External Dependencies ===============================================

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use log::{debug, warn};

//=== Internal Dependencies ===============================================

use crate::config::ContextConfig;
use crate::error::{panic_message, BoxError};

//=== Subsystem Trait =====================================================

/// A subsystem owned by the context.
pub trait Subsystem: Send + Sync {
    /// Releases the subsystem's resources. Called once, during context
    /// disposal. Failures are logged and do not stop disposal.
    fn dispose(&self) -> Result<(), BoxError>;

    /// Downcasts to `&dyn Any` for typed access.
    fn as_any(&self) -> &dyn Any;

    /// Name used in logs.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// Constructor registered in the factory registry for one subsystem kind.
///
/// Registered under `SubsystemKind::name()`; an unnamed registration acts
/// as the fallback for every kind.
pub type SubsystemFactory =
    Arc<dyn Fn(SubsystemKind, &ContextConfig) -> Result<Arc<dyn Subsystem>, BoxError> + Send + Sync>;

//=== SubsystemKind =======================================================

/// The subsystem slots a context manages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubsystemKind {
    Platform,
    Content,
    Graphics,
    Audio,
    Input,
    Ui,
}

impl SubsystemKind {
    /// Order in which factories are invoked at creation.
    pub const CREATION_ORDER: [Self; 6] = [
        Self::Platform,
        Self::Content,
        Self::Graphics,
        Self::Audio,
        Self::Input,
        Self::Ui,
    ];

    /// Order in which subsystems are disposed.
    pub const DISPOSAL_ORDER: [Self; 6] = [
        Self::Ui,
        Self::Input,
        Self::Content,
        Self::Platform,
        Self::Graphics,
        Self::Audio,
    ];

    /// Registry name for this kind.
    pub fn name(self) -> &'static str {
        match self {
            Self::Platform => "platform",
            Self::Content => "content",
            Self::Graphics => "graphics",
            Self::Audio => "audio",
            Self::Input => "input",
            Self::Ui => "ui",
        }
    }

    /// Subsystems that only make sense with a user-facing display.
    pub fn is_presentation(self) -> bool {
        matches!(self, Self::Graphics | Self::Audio | Self::Input | Self::Ui)
    }

    /// Whether a context with `config` should create this subsystem.
    pub fn enabled_for(self, config: &ContextConfig) -> bool {
        if config.service_mode && self.is_presentation() {
            return false;
        }
        !(config.hardware_input_disabled && self == Self::Input)
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for SubsystemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

//=== SubsystemFailure ====================================================

/// A disposal failure that was logged and skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubsystemFailure {
    pub kind: SubsystemKind,
    pub message: String,
}

impl fmt::Display for SubsystemFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} subsystem: {}", self.kind, self.message)
    }
}

//=== SubsystemSet ========================================================

/// One optional slot per subsystem kind.
#[derive(Default)]
pub struct SubsystemSet {
    slots: [Option<Arc<dyn Subsystem>>; 6],
}

impl SubsystemSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs a subsystem, returning whatever occupied the slot.
    pub fn insert(&mut self, kind: SubsystemKind, subsystem: Arc<dyn Subsystem>) -> Option<Arc<dyn Subsystem>> {
        self.slots[kind.index()].replace(subsystem)
    }

    pub fn get(&self, kind: SubsystemKind) -> Option<Arc<dyn Subsystem>> {
        self.slots[kind.index()].clone()
    }

    pub fn contains(&self, kind: SubsystemKind) -> bool {
        self.slots[kind.index()].is_some()
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Disposes every installed subsystem in `DISPOSAL_ORDER`, emptying the
    /// set. Errors and panics are collected, never propagated.
    pub fn dispose_all(&mut self) -> Vec<SubsystemFailure> {
        let mut failures = Vec::new();

        for kind in SubsystemKind::DISPOSAL_ORDER {
            let Some(subsystem) = self.slots[kind.index()].take() else {
                continue;
            };

            let outcome = panic::catch_unwind(AssertUnwindSafe(|| subsystem.dispose()));
            let message = match outcome {
                Ok(Ok(())) => {
                    debug!(target: "subsystems", "Disposed {} ({})", kind, subsystem.name());
                    continue;
                }
                Ok(Err(e)) => e.to_string(),
                Err(payload) => format!("panicked: {}", panic_message(payload)),
            };

            warn!(target: "subsystems", "Failed to dispose {} subsystem: {}", kind, message);
            failures.push(SubsystemFailure { kind, message });
        }

        failures
    }
}

//=========================================================================
// Unit Tests
//=========================================================================
