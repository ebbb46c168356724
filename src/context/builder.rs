//=========================================================================
// Context Builder
//=========================================================================
//
// Fluent configuration for `Context` creation.
//
//   ContextBuilder::new()
//       .with_service_mode(true)
//       .with_initializer(register_defaults)
//       .build(host)  ──► Context (claims the process-wide slot)
//
//=========================================================================

use std::any::Any;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::Arc;

use log::info;

use super::{creation, Context};
use crate::config::ContextConfig;
use crate::core::factory::{FactoryRegistry, RegistryInitializer};
use crate::core::subsystems::{Subsystem, SubsystemFactory, SubsystemKind};
use crate::error::{BoxError, Result};
use crate::host::Host;
use crate::platform::Platform;

type Registration = Box<dyn FnOnce(&mut FactoryRegistry) + Send>;

//=== ContextBuilder ======================================================

/// Builder for configuring and creating a [`Context`].
///
/// # Examples
///
/// Headless service with a content subsystem:
///
/// ```rust,no_run
/// # use std::any::Any;
/// # use std::sync::Arc;
/// # use aetheric_runtime::prelude::*;
/// struct Content;
///
/// impl Subsystem for Content {
///     fn dispose(&self) -> Result<(), BoxError> {
///         Ok(())
///     }
///
///     fn as_any(&self) -> &dyn Any {
///         self
///     }
/// }
///
/// let context = ContextBuilder::new()
///     .with_service_mode(true)
///     .with_worker_threads(2)
///     .with_subsystem_factory(SubsystemKind::Content, |_, _| {
///         Ok(Arc::new(Content) as Arc<dyn Subsystem>)
///     })
///     .build(NullHost)?;
///
/// assert!(context.content().is_some());
/// assert!(context.graphics().is_none());
/// context.dispose()?;
/// # Ok::<(), ContextError>(())
/// ```
pub struct ContextBuilder {
    config: ContextConfig,
    initializers: Vec<RegistryInitializer>,
    registrations: Vec<Registration>,
}

impl ContextBuilder {
    /// Creates a builder with `ContextConfig::default()` settings.
    pub fn new() -> Self {
        Self {
            config: ContextConfig::default(),
            initializers: Vec::new(),
            registrations: Vec::new(),
        }
    }

    /// Starts from an existing configuration.
    pub fn from_config(config: ContextConfig) -> Self {
        Self {
            config,
            ..Self::new()
        }
    }

    //--- Settings ---------------------------------------------------------

    /// Runs headless: graphics, audio, input and UI are never created.
    ///
    /// Default: false
    pub fn with_service_mode(mut self, enabled: bool) -> Self {
        self.config.service_mode = enabled;
        self
    }

    /// Default: false
    pub fn with_high_density_display(mut self, enabled: bool) -> Self {
        self.config.high_density_display = enabled;
        self
    }

    /// Skips the input subsystem.
    ///
    /// Default: false
    pub fn with_hardware_input_disabled(mut self, disabled: bool) -> Self {
        self.config.hardware_input_disabled = disabled;
        self
    }

    /// Overrides the detected platform.
    ///
    /// Default: `Platform::detect()`
    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.config.platform = platform;
        self
    }

    /// Sets how many background workers are kept warm. The pool grows
    /// past this while every worker is busy.
    ///
    /// Default: available parallelism
    ///
    /// # Panics
    ///
    /// Panics if `count == 0`.
    pub fn with_worker_threads(mut self, count: usize) -> Self {
        assert!(count > 0, "Worker thread count must be positive");
        self.config.worker_threads = NonZeroUsize::new(count).unwrap_or(NonZeroUsize::MIN);
        self
    }

    /// Directory for `context-creation-failure.log`.
    ///
    /// Default: none (no file is written)
    pub fn with_diagnostics_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.diagnostics_dir = Some(dir.into());
        self
    }

    //--- Factories --------------------------------------------------------

    /// Adds a function that populates the factory registry. Initializers
    /// run in the order added, before direct registrations.
    pub fn with_initializer(mut self, initializer: RegistryInitializer) -> Self {
        self.initializers.push(initializer);
        self
    }

    /// Registers the constructor for one subsystem kind.
    pub fn with_subsystem_factory<F>(self, kind: SubsystemKind, factory: F) -> Self
    where
        F: Fn(SubsystemKind, &ContextConfig) -> std::result::Result<Arc<dyn Subsystem>, BoxError>
            + Send
            + Sync
            + 'static,
    {
        let factory: SubsystemFactory = Arc::new(factory);
        self.with_factory(Some(kind.name()), factory)
    }

    /// Registers an arbitrary factory value under its type and name.
    pub fn with_factory<F>(mut self, name: Option<&str>, factory: F) -> Self
    where
        F: Any + Send + Sync,
    {
        let name = name.map(str::to_owned);
        self.registrations
            .push(Box::new(move |registry| registry.register(name.as_deref(), factory)));
        self
    }

    //--- Build ------------------------------------------------------------

    /// Creates the context on the calling thread, which becomes its main
    /// thread.
    ///
    /// Fails with `AlreadyExists` while another context is live, or with
    /// `Initialization` if a subsystem factory or `Host::initialize` fails.
    pub fn build<H>(self, host: H) -> Result<Context>
    where
        H: Host + 'static,
    {
        info!(
            target: "context",
            "Building context (service: {}, platform: {}, workers: {})",
            self.config.service_mode,
            self.config.platform,
            self.config.worker_threads
        );

        let mut factories = FactoryRegistry::from_initializers(&self.initializers);
        for register in self.registrations {
            register(&mut factories);
        }

        creation::create(Box::new(host), self.config, factories)
    }
}

impl Default for ContextBuilder {
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
    fn builder_defaults() {
        let builder = ContextBuilder::new();
        assert_eq!(builder.config, ContextConfig::default());
        assert!(builder.initializers.is_empty());
        assert!(builder.registrations.is_empty());
    }

    #[test]
    fn builder_flags() {
        let builder = ContextBuilder::new()
            .with_service_mode(true)
            .with_high_density_display(true)
            .with_hardware_input_disabled(true)
            .with_platform(Platform::Android);

        assert!(builder.config.service_mode);
        assert!(builder.config.high_density_display);
        assert!(builder.config.hardware_input_disabled);
        assert_eq!(builder.config.platform, Platform::Android);
    }

    #[test]
    fn builder_with_worker_threads() {
        let builder = ContextBuilder::new().with_worker_threads(3);
        assert_eq!(builder.config.worker_threads.get(), 3);
    }

    #[test]
    #[should_panic(expected = "Worker thread count must be positive")]
    fn builder_with_worker_threads_panics_on_zero() {
        ContextBuilder::new().with_worker_threads(0);
    }

    #[test]
    fn builder_with_diagnostics_dir() {
        let builder = ContextBuilder::new().with_diagnostics_dir("/tmp/aetheric");
        assert_eq!(builder.config.diagnostics_dir, Some(PathBuf::from("/tmp/aetheric")));
    }

    #[test]
    fn builder_collects_factories() {
        fn noop(_: &mut FactoryRegistry) {}

        let builder = ContextBuilder::new()
            .with_initializer(noop)
            .with_factory(Some("answer"), 42u32)
            .with_subsystem_factory(SubsystemKind::Audio, |_, _| Err("no device".into()));

        assert_eq!(builder.initializers.len(), 1);
        assert_eq!(builder.registrations.len(), 2);
    }

    #[test]
    fn from_config_keeps_settings() {
        let config = ContextConfig {
            service_mode: true,
            ..ContextConfig::default()
        };
        let builder = ContextBuilder::from_config(config.clone());
        assert_eq!(builder.config, config);
    }
}
