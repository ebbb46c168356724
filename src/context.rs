//=========================================================================
// Engine Context
//=========================================================================
//
// Process-wide owner of the main thread, background tasks, messages and
// subsystems.
//
// Architecture:
// ```text
//     ContextBuilder ──build(host)──► Context (cheap Arc handle)
//                                       │
//          ┌────────────────────────────┼─────────────────────────────┐
//          ▼                            ▼                             ▼
//   MainThreadDispatcher          TaskRegistry                    MessageBus
//   (work items, main thread)     (worker pool, cancellation)     (typed pub/sub)
//          │                            │
//          └────── update(): drain ─────┴── advance ──► Host::update
// ```
//
// Lifecycle:
//   Uninitialized ──create──► Initialized ──dispose──► Disposing ──► Disposed
//
//=========================================================================

//=== Submodules ==========================================================

mod builder;
mod creation;
mod singleton;
mod teardown;

//=== External Dependencies ===============================================

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, trace, warn};
use parking_lot::{Mutex, MutexGuard};

//=== Internal Dependencies ===============================================

use crate::config::ContextConfig;
use crate::core::dispatcher::{MainThreadDispatcher, WorkHandle};
use crate::core::factory::FactoryRegistry;
use crate::core::frame::{ContextEvents, FrameLifecycle, FrameState, FrameSummary, FrameTime, WindowFrame};
use crate::core::identity::{ContextBound, ContextId};
use crate::core::message_bus::{Message, MessageBus, Quit, SubscriptionId};
use crate::core::subsystems::{Subsystem, SubsystemKind, SubsystemSet};
use crate::core::tasks::{CancellationToken, TaskHandle, TaskRegistry};
use crate::error::{ContextError, Result, TaskError};
use crate::host::Host;
use crate::platform::Platform;

//=== Public Re-exports ===================================================

pub use builder::ContextBuilder;

//=== ContextState ========================================================

/// Lifecycle state of a context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ContextState {
    Uninitialized = 0,
    Initialized = 1,
    Disposing = 2,
    Disposed = 3,
}

impl ContextState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Uninitialized,
            1 => Self::Initialized,
            2 => Self::Disposing,
            _ => Self::Disposed,
        }
    }
}

//=== ContextInner ========================================================

pub(crate) struct ContextInner {
    id: ContextId,
    config: ContextConfig,
    state: AtomicU8,
    disposal_started: AtomicBool,
    dispose_requested: AtomicBool,
    quit_requested: AtomicBool,

    dispatcher: MainThreadDispatcher,
    tasks: TaskRegistry,
    messages: MessageBus,
    factories: FactoryRegistry,
    subsystems: Mutex<SubsystemSet>,

    frame: Mutex<FrameLifecycle>,
    host: Mutex<Box<dyn Host>>,
    events: ContextEvents,
}

impl Drop for ContextInner {
    fn drop(&mut self) {
        if ContextState::from_u8(self.state.load(Ordering::Acquire)) != ContextState::Disposed {
            warn!(target: "context", "Context {} dropped without being disposed", self.id);
        }
    }
}

//=== Context =============================================================

/// Handle to the engine context.
///
/// Cloning is cheap; every clone refers to the same instance. Only one
/// context may be live per process: creating a second one fails with
/// `AlreadyExists` until the first is disposed.
///
/// The thread that creates the context becomes its main thread. Work
/// items, frame hooks and disposal run there; everything else may be
/// called from any thread.
///
/// # Examples
///
/// ```no_run
/// use aetheric_runtime::prelude::*;
///
/// let context = ContextBuilder::new().with_service_mode(true).build(NullHost)?;
///
/// let mut time = FrameTime::default();
/// while !context.is_quit_requested() {
///     time = time.advance(std::time::Duration::from_millis(16));
///     context.handle_frame_start()?;
///     context.update(time)?;
///     context.draw(time)?;
///     context.handle_frame_end()?;
///     context.process_messages()?;
/// #   context.request_quit()?;
/// }
///
/// context.dispose()?;
/// # Ok::<(), ContextError>(())
/// ```
#[derive(Clone)]
pub struct Context {
    inner: Arc<ContextInner>,
}

impl Context {
    //--- Construction -----------------------------------------------------

    /// Starts configuring a context.
    pub fn builder() -> ContextBuilder {
        ContextBuilder::new()
    }

    /// Creates the process-wide context with an empty factory registry.
    pub fn create<H>(host: H, config: ContextConfig) -> Result<Self>
    where
        H: Host + 'static,
    {
        creation::create(Box::new(host), config, FactoryRegistry::new())
    }

    fn assemble(host: Box<dyn Host>, config: ContextConfig, factories: FactoryRegistry) -> Self {
        let id = ContextId::next();
        debug!(
            target: "context",
            "Assembling context {} (platform: {}, workers: {})",
            id,
            config.platform,
            config.worker_threads
        );

        Self {
            inner: Arc::new(ContextInner {
                id,
                state: AtomicU8::new(ContextState::Uninitialized as u8),
                disposal_started: AtomicBool::new(false),
                dispose_requested: AtomicBool::new(false),
                quit_requested: AtomicBool::new(false),
                dispatcher: MainThreadDispatcher::new(id),
                tasks: TaskRegistry::new(id, config.worker_threads),
                messages: MessageBus::new(),
                factories,
                subsystems: Mutex::new(SubsystemSet::new()),
                frame: Mutex::new(FrameLifecycle::new()),
                host: Mutex::new(host),
                events: ContextEvents::default(),
                config,
            }),
        }
    }

    //--- Singleton Access -------------------------------------------------

    /// The live context, if any.
    pub fn request_current() -> Option<Self> {
        singleton::current()
    }

    /// The live context, or `ContextMissing`.
    pub fn demand_current() -> Result<Self> {
        singleton::current().ok_or(ContextError::ContextMissing)
    }

    /// The context whose main thread is the calling thread, if any.
    pub fn for_current_thread() -> Option<Self> {
        singleton::thread_context()
    }

    //--- Properties -------------------------------------------------------

    pub fn id(&self) -> ContextId {
        self.inner.id
    }

    pub fn config(&self) -> &ContextConfig {
        &self.inner.config
    }

    pub fn platform(&self) -> Platform {
        self.inner.config.platform
    }

    pub fn is_service_mode(&self) -> bool {
        self.inner.config.service_mode
    }

    pub fn is_high_density_display(&self) -> bool {
        self.inner.config.high_density_display
    }

    pub fn is_hardware_input_disabled(&self) -> bool {
        self.inner.config.hardware_input_disabled
    }

    pub fn state(&self) -> ContextState {
        ContextState::from_u8(self.inner.state.load(Ordering::Acquire))
    }

    pub fn is_disposed(&self) -> bool {
        self.state() == ContextState::Disposed
    }

    /// True when called on the thread that created the context.
    pub fn is_main_thread(&self) -> bool {
        self.inner.dispatcher.is_owner_thread()
    }

    /// Lifecycle and frame notifications of this context.
    pub fn events(&self) -> &ContextEvents {
        &self.inner.events
    }

    /// The factory table this context was created with.
    pub fn factories(&self) -> &FactoryRegistry {
        &self.inner.factories
    }

    fn set_state(&self, state: ContextState) {
        self.inner.state.store(state as u8, Ordering::Release);
    }

    //--- Validation -------------------------------------------------------

    fn ensure_alive(&self) -> Result<()> {
        if self.is_disposed() {
            Err(ContextError::ObjectDisposed)
        } else {
            Ok(())
        }
    }

    fn ensure_main_thread(&self) -> Result<()> {
        self.ensure_alive()?;
        if self.is_main_thread() {
            Ok(())
        } else {
            Err(ContextError::WrongThread)
        }
    }

    /// Checks that `resource` was produced by this, still live, context.
    pub fn validate_resource<R>(&self, resource: &R) -> Result<()>
    where
        R: ContextBound + ?Sized,
    {
        self.ensure_alive()?;
        let found = resource.context_id();
        if found == self.id() {
            Ok(())
        } else {
            Err(ContextError::InvalidResource {
                expected: self.id().get(),
                found: found.get(),
            })
        }
    }

    //--- Subsystems -------------------------------------------------------

    /// The subsystem in `kind`'s slot, if one was created.
    pub fn subsystem(&self, kind: SubsystemKind) -> Option<Arc<dyn Subsystem>> {
        self.inner.subsystems.lock().get(kind)
    }

    pub fn platform_subsystem(&self) -> Option<Arc<dyn Subsystem>> {
        self.subsystem(SubsystemKind::Platform)
    }

    pub fn content(&self) -> Option<Arc<dyn Subsystem>> {
        self.subsystem(SubsystemKind::Content)
    }

    pub fn graphics(&self) -> Option<Arc<dyn Subsystem>> {
        self.subsystem(SubsystemKind::Graphics)
    }

    pub fn audio(&self) -> Option<Arc<dyn Subsystem>> {
        self.subsystem(SubsystemKind::Audio)
    }

    pub fn input(&self) -> Option<Arc<dyn Subsystem>> {
        self.subsystem(SubsystemKind::Input)
    }

    pub fn ui(&self) -> Option<Arc<dyn Subsystem>> {
        self.subsystem(SubsystemKind::Ui)
    }

    //--- Work Items -------------------------------------------------------

    /// Schedules `action` on the main thread.
    ///
    /// Called on the main thread with `force_async == false`, the action
    /// runs immediately and the returned handle is already completed.
    /// Otherwise the action is queued and runs during a later
    /// `process_work_items` (normally the next `update`).
    pub fn queue_work_item<F, T>(&self, action: F, force_async: bool) -> Result<WorkHandle<T>>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        self.ensure_alive()?;
        self.inner.dispatcher.queue(action, force_async)
    }

    /// Like `queue_work_item`, passing `state` to the action.
    pub fn queue_work_item_with<S, F, T>(&self, state: S, action: F, force_async: bool) -> Result<WorkHandle<T>>
    where
        S: Send + 'static,
        F: FnOnce(S) -> T + Send + 'static,
        T: Send + 'static,
    {
        self.queue_work_item(move || action(state), force_async)
    }

    /// Schedules `action` on the main thread and blocks until it has run.
    ///
    /// From a background thread this only returns once the main thread
    /// drains its queue. On the main thread without `force_async` the
    /// action runs inline. On the main thread with `force_async`, the
    /// queue is drained in order up to and including this item rather
    /// than blocking on a drain that could never happen.
    pub fn queue_work_item_and_wait<F, T>(&self, action: F, force_async: bool) -> Result<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let mut handle = self.queue_work_item(action, force_async)?;

        if self.is_main_thread() {
            while !handle.is_completed() {
                if !self.inner.dispatcher.process_single()? {
                    break;
                }
            }
        }

        handle.wait()
    }

    /// Runs every queued work item. Main thread only.
    pub fn process_work_items(&self) -> Result<usize> {
        self.ensure_main_thread()?;
        self.inner.dispatcher.process_all()
    }

    /// Runs the oldest queued work item. Main thread only.
    pub fn process_single_work_item(&self) -> Result<bool> {
        self.ensure_main_thread()?;
        self.inner.dispatcher.process_single()
    }

    /// Work items waiting for a drain.
    pub fn queued_work_item_count(&self) -> usize {
        self.inner.dispatcher.len()
    }

    //--- Background Tasks -------------------------------------------------

    /// Registers a background task bound to the context's cancellation
    /// signal. It starts on the next `update` (or `wait_for_pending_tasks`).
    ///
    /// Task bodies must poll their token; nothing aborts a running task.
    /// Fails with `CannotSpawn` once disposal has begun, from any thread.
    pub fn spawn_task<F, T>(&self, action: F) -> Result<TaskHandle<T>>
    where
        F: FnOnce(CancellationToken) -> std::result::Result<T, TaskError> + Send + 'static,
        T: Send + 'static,
    {
        self.ensure_alive()?;
        self.inner.tasks.spawn(action)
    }

    /// Blocks until every pending task has completed, been canceled, or
    /// faulted. With `cancel`, fires the shared cancellation signal first.
    ///
    /// On the main thread, queued work items are drained while waiting so
    /// tasks blocked on main-thread results can finish. A task that
    /// ignores cancellation and never completes blocks this forever.
    pub fn wait_for_pending_tasks(&self, cancel: bool) -> Result<()> {
        self.ensure_alive()?;
        self.wait_for_tasks(cancel)?;

        if cancel && !self.inner.disposal_started.load(Ordering::Acquire) {
            self.inner.tasks.reset_cancellation();
        }
        Ok(())
    }

    fn wait_for_tasks(&self, cancel: bool) -> Result<()> {
        let dispatcher = &self.inner.dispatcher;
        self.inner.tasks.wait_for_pending(cancel, || {
            if dispatcher.is_owner_thread() {
                dispatcher.process_all()?;
            }
            Ok(())
        })
    }

    /// Tasks spawned but not yet retired.
    pub fn pending_task_count(&self) -> usize {
        self.inner.tasks.pending_count()
    }

    //--- Messages ---------------------------------------------------------

    /// Buffers a message until the next `process_messages`.
    pub fn publish<M: Message>(&self, message: M) -> Result<()> {
        self.ensure_alive()?;
        self.inner.messages.publish(message);
        Ok(())
    }

    /// Registers a handler for messages of type `M`.
    pub fn subscribe<M, F>(&self, handler: F) -> Result<SubscriptionId>
    where
        M: Message,
        F: Fn(&M) + Send + Sync + 'static,
    {
        self.ensure_alive()?;
        Ok(self.inner.messages.subscribe(handler))
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.inner.messages.unsubscribe(id)
    }

    /// Delivers all buffered messages in publish order.
    pub fn process_messages(&self) -> Result<usize> {
        self.ensure_alive()?;
        Ok(self.inner.messages.process())
    }

    /// Publishes the built-in `Quit` message.
    pub fn request_quit(&self) -> Result<()> {
        self.publish(Quit)
    }

    /// True once a `Quit` message has been delivered.
    pub fn is_quit_requested(&self) -> bool {
        self.inner.quit_requested.load(Ordering::Acquire)
    }

    fn subscribe_to_quit(&self) {
        let weak = Arc::downgrade(&self.inner);
        self.inner.messages.subscribe(move |_: &Quit| {
            if let Some(inner) = weak.upgrade() {
                info!(target: "context", "Quit requested for context {}", inner.id);
                inner.quit_requested.store(true, Ordering::Release);
            }
        });
    }

    //--- Frame Protocol ---------------------------------------------------

    /// Opens a frame. Fails with `FrameOrder` if the previous frame was
    /// not ended.
    pub fn handle_frame_start(&self) -> Result<u64> {
        self.ensure_main_thread()?;
        let index = self.inner.frame.lock().begin()?;
        self.inner.events.frame_start.emit(&index);
        Ok(index)
    }

    /// Drains work items, advances the task registry, raises
    /// `updating_subsystems` then `updating`, then calls `Host::update`.
    pub fn update(&self, time: FrameTime) -> Result<()> {
        self.ensure_main_thread()?;
        self.with_host(|host| {
            self.inner.dispatcher.process_all()?;
            let tick = self.inner.tasks.advance();
            if tick.started > 0 || tick.retired > 0 {
                trace!(target: "frame", "Task tick: {:?}", tick);
            }

            self.inner.events.updating_subsystems.emit(&time);
            self.inner.events.updating.emit(&time);

            host.update(self, time);
            Ok(())
        })
    }

    /// Used instead of `update` while the host is suspended. Only calls
    /// `Host::update_suspended`; work items and tasks are left alone.
    pub fn update_suspended(&self, time: FrameTime) -> Result<()> {
        self.ensure_main_thread()?;
        self.with_host(|host| {
            host.update_suspended(self, time);
            Ok(())
        })
    }

    /// Raises `drawing`, then for each host window raises
    /// `window_drawing`, calls `Host::draw`, and raises `window_drawn`.
    pub fn draw(&self, time: FrameTime) -> Result<()> {
        self.ensure_main_thread()?;
        self.with_host(|host| {
            self.inner.events.drawing.emit(&time);

            for window in host.windows() {
                let frame = WindowFrame { window, time };
                self.inner.events.window_drawing.emit(&frame);
                host.draw(self, window, time);
                self.inner.events.window_drawn.emit(&frame);

                if self.inner.dispose_requested.load(Ordering::Acquire) {
                    break;
                }
            }
            Ok(())
        })
    }

    /// Raises `frame_end` and closes the frame.
    pub fn handle_frame_end(&self) -> Result<FrameSummary> {
        self.ensure_main_thread()?;
        let summary = self.inner.frame.lock().end()?;
        self.inner.events.frame_end.emit(&summary);
        Ok(summary)
    }

    pub fn frame_state(&self) -> FrameState {
        self.inner.frame.lock().state()
    }

    /// Frames started so far.
    pub fn frame_index(&self) -> u64 {
        self.inner.frame.lock().frames_started()
    }

    /// Duration of the last completed frame.
    pub fn last_frame_duration(&self) -> Option<Duration> {
        self.inner.frame.lock().last_duration()
    }

    fn lock_host(&self) -> Result<MutexGuard<'_, Box<dyn Host>>> {
        self.inner.host.try_lock().ok_or(ContextError::Reentrant)
    }

    /// Runs `hook` with the host locked, then completes a `dispose`
    /// requested while the lock was held.
    fn with_host<R>(&self, hook: impl FnOnce(&mut Box<dyn Host>) -> Result<R>) -> Result<R> {
        let outcome = {
            let mut host = self.lock_host()?;
            hook(&mut *host)
        };
        self.run_deferred_dispose()?;
        outcome
    }

    fn run_deferred_dispose(&self) -> Result<()> {
        if self.inner.dispose_requested.swap(false, Ordering::AcqRel) {
            debug!(target: "context", "Completing dispose requested from a host hook");
            self.dispose()?;
        }
        Ok(())
    }

    //--- Disposal ---------------------------------------------------------

    /// Shuts the context down and releases the process-wide slot.
    ///
    /// Idempotent. Must be called on the main thread; subsystem disposal
    /// failures are logged, never returned. Blocks until every pending
    /// task has finished, so a task that ignores cancellation and never
    /// returns keeps this call from returning.
    ///
    /// Called from inside a host hook, the request is recorded and the
    /// sequence runs once that hook has returned, so `Host::shutdown`
    /// always gets the host lock.
    pub fn dispose(&self) -> Result<()> {
        if self.is_disposed() {
            return Ok(());
        }
        if !self.is_main_thread() {
            return Err(ContextError::WrongThread);
        }
        if self.inner.host.is_locked() && !self.inner.disposal_started.load(Ordering::Acquire) {
            self.inner.dispose_requested.store(true, Ordering::Release);
            debug!(target: "context", "Dispose of {} deferred until the host hook returns", self.id());
            return Ok(());
        }

        let report = self.teardown();
        if !report.is_clean() {
            warn!(target: "context", "Context {} disposed with failures: {}", self.id(), report);
        }
        Ok(())
    }
}

impl ContextBound for Context {
    fn context_id(&self) -> ContextId {
        self.id()
    }
}

impl PartialEq for Context {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Context {}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("id", &self.id())
            .field("state", &self.state())
            .field("platform", &self.platform())
            .finish()
    }
}
