//=========================================================================
// Context Creation
//=========================================================================
//
// Startup sequence:
//   1. claim the process-wide slot and assemble the context
//   2. attach the calling thread as main thread
//   3. subscribe to `Quit`
//   4. create enabled subsystems through their registered factories
//   5. Host::initialize
//   6. mark Initialized and raise `initialized` / `context_initialized`
//   7. finish a `dispose` the host requested from inside `initialize`
//
// Any failure after step 1 tears the partial context down again and
// returns the original error. If the teardown itself fails, that failure
// is logged and written to `context-creation-failure.log` in the
// configured diagnostics directory.
//
//=========================================================================

use std::error::Error as _;
use std::fmt::Write as _;
use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;

use log::{debug, error, info, trace, warn};

use super::{singleton, Context, ContextState};
use crate::config::ContextConfig;
use crate::core::factory::FactoryRegistry;
use crate::core::frame::global_events;
use crate::core::subsystems::{SubsystemFactory, SubsystemKind};
use crate::error::{panic_message, BoxError, ContextError, Result};
use crate::host::Host;

//=== Entry Point =========================================================

pub(super) fn create(host: Box<dyn Host>, config: ContextConfig, factories: FactoryRegistry) -> Result<Context> {
    let context = singleton::claim(|| Context::assemble(host, config, factories))?;
    singleton::attach_thread(&context.inner);

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| initialize(&context)));
    let primary = match outcome {
        Ok(Ok(())) => {
            context.run_deferred_dispose()?;
            return Ok(context);
        }
        Ok(Err(e)) => e,
        Err(payload) => ContextError::Initialization {
            stage: "initialize",
            source: panic_message(payload).into(),
        },
    };

    Err(recover(&context, primary))
}

//=== Startup =============================================================

fn initialize(context: &Context) -> Result<()> {
    context.subscribe_to_quit();
    create_subsystems(context)?;

    {
        let mut host = context.lock_host()?;
        host.initialize(context)
            .map_err(|source| ContextError::Initialization { stage: "host", source })?;
    }

    context.set_state(ContextState::Initialized);
    info!(
        target: "context",
        "Context {} initialized on {} ({} subsystem(s), {} worker(s))",
        context.id(),
        context.platform(),
        context.inner.subsystems.lock().len(),
        context.inner.tasks.worker_count()
    );

    context.inner.events.initialized.emit(&context.id());
    global_events().context_initialized.emit(&context.id());
    Ok(())
}

fn create_subsystems(context: &Context) -> Result<()> {
    let config = context.config();

    for kind in SubsystemKind::CREATION_ORDER {
        if !kind.enabled_for(config) {
            debug!(target: "subsystems", "Skipping {} subsystem (disabled by configuration)", kind);
            continue;
        }

        let Some(factory) = context.factories().resolve_or_default::<SubsystemFactory>(kind.name()) else {
            trace!(target: "subsystems", "No factory registered for {}", kind);
            continue;
        };

        let subsystem = factory(kind, config).map_err(|source| fail(kind, source))?;
        debug!(target: "subsystems", "Created {} subsystem ({})", kind, subsystem.name());
        context.inner.subsystems.lock().insert(kind, subsystem);
    }

    Ok(())
}

fn fail(kind: SubsystemKind, source: BoxError) -> ContextError {
    ContextError::Initialization {
        stage: kind.name(),
        source,
    }
}

//=== Recovery ============================================================

/// Tears down a partially created context and hands back `primary`.
fn recover(context: &Context, primary: ContextError) -> ContextError {
    error!(target: "context", "Context {} creation failed: {}", context.id(), primary);

    let cleanup = match panic::catch_unwind(AssertUnwindSafe(|| context.teardown())) {
        Ok(report) if report.is_clean() => None,
        Ok(report) => Some(report.to_string()),
        Err(payload) => {
            // Teardown unwound before releasing the slot.
            context.set_state(ContextState::Disposed);
            singleton::detach_thread(context.id());
            singleton::release(context.id());
            Some(format!("cleanup panicked: {}", panic_message(payload)))
        }
    };

    if let Some(cleanup) = cleanup {
        error!(target: "context", "Cleanup after failed creation also failed: {}", cleanup);
        if let Some(dir) = context.config().diagnostics_dir.as_deref() {
            write_failure_report(dir, &primary, &cleanup);
        }
    }

    primary
}

fn write_failure_report(dir: &Path, primary: &ContextError, cleanup: &str) {
    let mut report = String::new();
    let _ = writeln!(report, "engine context creation failed");
    let _ = writeln!(report, "primary: {}", primary);

    let mut source = primary.source();
    while let Some(cause) = source {
        let _ = writeln!(report, "  caused by: {}", cause);
        source = cause.source();
    }
    let _ = writeln!(report, "cleanup: {}", cleanup);

    let path = dir.join(ContextConfig::CREATION_FAILURE_FILE);
    let written = fs::create_dir_all(dir).and_then(|()| fs::write(&path, report));
    match written {
        Ok(()) => info!(target: "context", "Wrote creation failure report to {}", path.display()),
        Err(e) => warn!(target: "context", "Could not write {}: {}", path.display(), e),
    }
}
