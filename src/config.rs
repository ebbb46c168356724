//=========================================================================
// Context Configuration
//=========================================================================
//
// Plain settings captured at context creation. Built through
// `ContextBuilder`; read-only once the context exists.
//
//=========================================================================

use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::thread;

use crate::platform::Platform;

//=== ContextConfig =======================================================

/// Settings a context is created with.
///
/// # Default Values
///
/// - **service_mode**: false
/// - **high_density_display**: false
/// - **hardware_input_disabled**: false
/// - **platform**: `Platform::detect()`
/// - **worker_threads**: available parallelism (at least 1)
/// - **diagnostics_dir**: none
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextConfig {
    /// Headless operation: presentation subsystems (graphics, audio,
    /// input, UI) are not created.
    pub service_mode: bool,

    /// The host renders at native pixel density.
    pub high_density_display: bool,

    /// The input subsystem is not created.
    pub hardware_input_disabled: bool,

    /// Platform the context reports.
    pub platform: Platform,

    /// Warm minimum of the background worker pool. The pool starts
    /// extra threads while every worker is busy and lets them exit
    /// again once idle.
    pub worker_threads: NonZeroUsize,

    /// Directory that receives `context-creation-failure.log` when both
    /// creation and its cleanup fail. `None` disables the file.
    pub diagnostics_dir: Option<PathBuf>,
}

impl ContextConfig {
    /// Name of the diagnostic file written on double creation failure.
    pub const CREATION_FAILURE_FILE: &'static str = "context-creation-failure.log";

    /// Worker count used when none is configured.
    pub fn default_worker_threads() -> NonZeroUsize {
        thread::available_parallelism().unwrap_or(NonZeroUsize::MIN)
    }
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            service_mode: false,
            high_density_display: false,
            hardware_input_disabled: false,
            platform: Platform::detect(),
            worker_threads: Self::default_worker_threads(),
            diagnostics_dir: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = ContextConfig::default();
        assert!(!config.service_mode);
        assert!(!config.high_density_display);
        assert!(!config.hardware_input_disabled);
        assert_eq!(config.platform, Platform::detect());
        assert!(config.worker_threads.get() >= 1);
        assert!(config.diagnostics_dir.is_none());
    }
}
