//=========================================================================
// Context Lifecycle Tests
//=========================================================================
//
// Singleton discipline, creation failure recovery and ordered disposal.
//
//=========================================================================

mod common;

use std::any::Any;
use std::fs;
use std::sync::Arc;

use aetheric_runtime::core::frame::global_events;
use aetheric_runtime::prelude::*;
use common::{headless, serial, Journal, Live};

//=== Fixtures ============================================================

struct Recorded {
    kind: SubsystemKind,
    journal: Journal,
    fail_dispose: bool,
}

impl Subsystem for Recorded {
    fn dispose(&self) -> Result<(), BoxError> {
        self.journal.push(self.kind.name());
        if self.fail_dispose {
            Err(format!("{} refused to dispose", self.kind).into())
        } else {
            Ok(())
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

fn recording_factory(journal: &Journal, failing: Option<SubsystemKind>) -> SubsystemFactory {
    let journal = journal.clone();
    Arc::new(move |kind: SubsystemKind, _config: &ContextConfig| {
        Ok(Arc::new(Recorded {
            kind,
            journal: journal.clone(),
            fail_dispose: Some(kind) == failing,
        }) as Arc<dyn Subsystem>)
    })
}

struct FailingHost;

impl Host for FailingHost {
    fn initialize(&mut self, _context: &Context) -> Result<(), BoxError> {
        Err("host refused to start".into())
    }

    fn update(&mut self, _context: &Context, _time: FrameTime) {}
}

//=====================================================================
// Singleton
//=====================================================================

#[test]
fn second_context_fails_until_first_is_disposed() {
    let _serial = serial();

    let first = headless().build(NullHost).unwrap();
    let second = headless().build(NullHost);
    assert!(matches!(second, Err(ContextError::AlreadyExists)));

    first.dispose().unwrap();

    let third = headless().build(NullHost).unwrap();
    assert_ne!(first.id(), third.id());
    third.dispose().unwrap();
}

#[test]
fn request_and_demand_current() {
    let _serial = serial();
    assert!(Context::request_current().is_none());
    assert!(matches!(Context::demand_current(), Err(ContextError::ContextMissing)));

    let context = headless().build(NullHost).unwrap();
    assert_eq!(Context::request_current(), Some(context.clone()));
    assert_eq!(Context::demand_current().unwrap(), context);
    assert_eq!(Context::for_current_thread(), Some(context.clone()));

    let elsewhere = std::thread::spawn(Context::for_current_thread).join().unwrap();
    assert!(elsewhere.is_none());

    context.dispose().unwrap();
    assert!(Context::request_current().is_none());
    assert!(Context::for_current_thread().is_none());
}

#[test]
fn configuration_is_reported() {
    let live = Live::new(
        headless()
            .with_high_density_display(true)
            .with_platform(Platform::Linux),
    );

    assert!(live.is_service_mode());
    assert!(live.is_high_density_display());
    assert!(!live.is_hardware_input_disabled());
    assert_eq!(live.platform(), Platform::Linux);
    assert_eq!(live.state(), ContextState::Initialized);
    assert!(live.is_main_thread());
}

#[test]
fn global_events_announce_creation_and_invalidation() {
    let _serial = serial();
    let journal = Journal::default();

    let sink = journal.clone();
    let created = global_events()
        .context_initialized
        .subscribe(move |id| sink.push(format!("up {}", id)));
    let sink = journal.clone();
    let invalidated = global_events()
        .context_invalidated
        .subscribe(move |id| sink.push(format!("down {}", id)));

    let context = headless().build(NullHost).unwrap();
    let id = context.id();
    context.dispose().unwrap();

    global_events().context_initialized.unsubscribe(created);
    global_events().context_invalidated.unsubscribe(invalidated);

    assert_eq!(journal.entries(), vec![format!("up {}", id), format!("down {}", id)]);
}

//=====================================================================
// Disposal
//=====================================================================

#[test]
fn dispose_is_idempotent() {
    let _serial = serial();
    let context = headless().build(NullHost).unwrap();

    context.dispose().unwrap();
    context.dispose().unwrap();

    assert!(context.is_disposed());
    assert!(Context::request_current().is_none());
}

struct SelfDisposingHost {
    journal: Journal,
}

impl Host for SelfDisposingHost {
    fn update(&mut self, context: &Context, _time: FrameTime) {
        context.dispose().unwrap();
    }

    fn shutdown(&mut self, _context: &Context) {
        self.journal.push("shutdown");
    }
}

#[test]
fn dispose_from_a_host_hook_completes_after_the_hook() {
    let journal = Journal::default();
    let live = Live::with_host(
        headless(),
        SelfDisposingHost {
            journal: journal.clone(),
        },
    );

    live.update(FrameTime::default()).unwrap();

    assert!(live.is_disposed());
    assert!(Context::request_current().is_none());
    assert_eq!(journal.entries(), vec!["shutdown"]);
}

#[test]
fn disposed_context_rejects_operations() {
    let _serial = serial();
    let context = headless().build(NullHost).unwrap();
    context.dispose().unwrap();

    assert!(matches!(context.queue_work_item(|| (), false), Err(ContextError::ObjectDisposed)));
    assert!(matches!(context.spawn_task(|_| Ok(())), Err(ContextError::ObjectDisposed)));
    assert!(matches!(context.publish(Quit), Err(ContextError::ObjectDisposed)));
    assert!(matches!(context.handle_frame_start(), Err(ContextError::ObjectDisposed)));
    assert!(matches!(context.wait_for_pending_tasks(false), Err(ContextError::ObjectDisposed)));
}

#[test]
fn dispose_off_main_thread_is_rejected() {
    let live = Live::new(headless());
    let context = live.context.clone();

    let outcome = std::thread::spawn(move || context.dispose()).join().unwrap();
    assert!(matches!(outcome, Err(ContextError::WrongThread)));
    assert!(!live.is_disposed());
}

#[test]
fn subsystems_are_disposed_in_fixed_order() {
    let _serial = serial();
    let journal = Journal::default();

    let context = ContextBuilder::new()
        .with_worker_threads(1)
        .with_factory(None, recording_factory(&journal, Some(SubsystemKind::Content)))
        .build(NullHost)
        .unwrap();

    assert!(context.platform_subsystem().is_some());
    assert!(context.graphics().is_some());
    assert!(context.ui().is_some());

    context.dispose().unwrap();

    assert_eq!(
        journal.entries(),
        vec!["ui", "input", "content", "platform", "graphics", "audio"]
    );
    assert!(context.graphics().is_none());
}

#[test]
fn service_mode_creates_only_core_subsystems() {
    let journal = Journal::default();
    let live = Live::new(headless().with_factory(None, recording_factory(&journal, None)));

    assert!(live.platform_subsystem().is_some());
    assert!(live.content().is_some());
    assert!(live.graphics().is_none());
    assert!(live.audio().is_none());
    assert!(live.input().is_none());
    assert!(live.ui().is_none());
}

#[test]
fn hardware_input_disabled_skips_input() {
    let journal = Journal::default();
    let live = Live::new(
        ContextBuilder::new()
            .with_worker_threads(1)
            .with_hardware_input_disabled(true)
            .with_factory(None, recording_factory(&journal, None)),
    );

    assert!(live.input().is_none());
    assert!(live.graphics().is_some());
}

#[test]
fn named_factory_overrides_default() {
    struct Special;

    impl Subsystem for Special {
        fn dispose(&self) -> Result<(), BoxError> {
            Ok(())
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    let journal = Journal::default();
    let live = Live::new(
        headless()
            .with_factory(None, recording_factory(&journal, None))
            .with_subsystem_factory(SubsystemKind::Content, |_, _| Ok(Arc::new(Special) as Arc<dyn Subsystem>)),
    );

    let content = live.content().unwrap();
    assert!(content.as_any().downcast_ref::<Special>().is_some());
    let platform = live.platform_subsystem().unwrap();
    assert!(platform.as_any().downcast_ref::<Recorded>().is_some());
}

//=====================================================================
// Creation Failure
//=====================================================================

#[test]
fn failing_factory_aborts_creation_and_releases_slot() {
    let _serial = serial();
    let journal = Journal::default();

    let outcome = ContextBuilder::new()
        .with_worker_threads(1)
        .with_factory(None, recording_factory(&journal, None))
        .with_subsystem_factory(SubsystemKind::Graphics, |_, _| Err("no adapter".into()))
        .build(NullHost);

    match outcome {
        Err(ContextError::Initialization { stage, source }) => {
            assert_eq!(stage, "graphics");
            assert_eq!(source.to_string(), "no adapter");
        }
        other => panic!("unexpected outcome: {:?}", other.map(|c| c.id())),
    }

    // Subsystems created before the failure were torn down.
    assert_eq!(journal.entries(), vec!["content", "platform"]);
    assert!(Context::request_current().is_none());

    let retry = headless().build(NullHost).unwrap();
    retry.dispose().unwrap();
}

#[test]
fn host_initialize_failure_is_returned() {
    let _serial = serial();

    let outcome = headless().build(FailingHost);
    assert!(matches!(
        outcome,
        Err(ContextError::Initialization { stage: "host", .. })
    ));
    assert!(Context::request_current().is_none());
}

#[test]
fn failed_cleanup_writes_diagnostic_file() {
    let _serial = serial();
    let dir = std::env::temp_dir().join(format!("aetheric-diag-{}", std::process::id()));
    let _ = fs::remove_dir_all(&dir);
    let journal = Journal::default();

    let outcome = headless()
        .with_diagnostics_dir(&dir)
        .with_factory(None, recording_factory(&journal, Some(SubsystemKind::Platform)))
        .build(FailingHost);

    assert!(matches!(outcome, Err(ContextError::Initialization { stage: "host", .. })));

    let report = fs::read_to_string(dir.join(ContextConfig::CREATION_FAILURE_FILE)).unwrap();
    assert!(report.contains("host refused to start"));
    assert!(report.contains("platform refused to dispose"));

    let _ = fs::remove_dir_all(&dir);
    assert!(Context::request_current().is_none());
}

//=====================================================================
// Resource Validation
//=====================================================================

#[test]
fn resources_are_bound_to_their_context() {
    let _serial = serial();

    let first = headless().build(NullHost).unwrap();
    let handle = first.queue_work_item(|| 1, false).unwrap();
    assert!(first.validate_resource(&handle).is_ok());
    first.dispose().unwrap();

    assert!(matches!(first.validate_resource(&handle), Err(ContextError::ObjectDisposed)));

    let second = headless().build(NullHost).unwrap();
    let outcome = second.validate_resource(&handle);
    assert!(matches!(outcome, Err(ContextError::InvalidResource { .. })));
    second.dispose().unwrap();
}
