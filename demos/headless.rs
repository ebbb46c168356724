//=========================================================================
// Headless Demo
//=========================================================================
//
// Runs a service-mode context for a few frames:
//   - background tasks compute values and hand them to the main thread
//   - the last task publishes `Quit`
//   - the frame loop stops once the quit message was processed
//
// Run with:
//   RUST_LOG=debug cargo run --example headless
//
//=========================================================================

use std::any::Any;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use aetheric_runtime::prelude::*;
use log::info;

//=== Content Subsystem ===================================================

struct Content {
    root: &'static str,
}

impl Subsystem for Content {
    fn dispose(&self) -> Result<(), BoxError> {
        info!("Unloading content from {}", self.root);
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

fn register_content(registry: &mut FactoryRegistry) {
    let factory: SubsystemFactory = Arc::new(|_: SubsystemKind, _: &ContextConfig| {
        Ok(Arc::new(Content { root: "assets/" }) as Arc<dyn Subsystem>)
    });
    registry.register(Some(SubsystemKind::Content.name()), factory);
}

//=== Host ================================================================

#[derive(Default)]
struct Service {
    updates: u64,
}

impl Host for Service {
    fn initialize(&mut self, context: &Context) -> Result<(), BoxError> {
        info!("Service starting on {} with context {}", context.platform(), context.id());
        Ok(())
    }

    fn update(&mut self, context: &Context, time: FrameTime) {
        self.updates += 1;
        if context.frame_index() % 30 == 0 {
            info!("Frame {} at {:?}, {} task(s) pending", context.frame_index(), time.total, context.pending_task_count());
        }
    }

    fn shutdown(&mut self, _context: &Context) {
        info!("Service stopping after {} update(s)", self.updates);
    }
}

//=== Main ================================================================

fn main() -> Result<(), ContextError> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let context = ContextBuilder::new()
        .with_service_mode(true)
        .with_worker_threads(4)
        .with_initializer(register_content)
        .build(Service::default())?;

    for job in 1..=4u64 {
        let ctx = context.clone();
        context.spawn_task(move |token| {
            let mut sum = 0;
            for step in 0..job * 10 {
                token.check()?;
                sum += step;
                thread::sleep(Duration::from_millis(2));
            }

            ctx.queue_work_item(move || info!("Job {} finished with {}", job, sum), false)
                .map_err(TaskError::failed)?;
            if job == 4 {
                ctx.request_quit().map_err(TaskError::failed)?;
            }
            Ok(sum)
        })?;
    }

    let frame = Duration::from_millis(16);
    let mut time = FrameTime::default();
    while !context.is_quit_requested() {
        time = time.advance(frame);

        context.handle_frame_start()?;
        context.update(time)?;
        context.draw(time)?;
        context.handle_frame_end()?;
        context.process_messages()?;

        thread::sleep(frame);
    }

    info!("Quit after {} frame(s)", context.frame_index());
    context.dispose()
}
