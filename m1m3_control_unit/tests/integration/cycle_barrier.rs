//! Integration test: clock and worker threads around the cycle barrier.
//!
//! Validates: every requested cycle is executed exactly once, commands are
//! interleaved between cycles, and shutdown releases both sides.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use m1m3_common::geometry::MirrorGeometry;
use m1m3_common::state::DetailedState;
use m1m3_control_unit::command::{Command, CommandController, CommandEnvelope};
use m1m3_control_unit::cycle::{CycleBarrier, CycleError, ManualTimeSource, OuterLoopClock};
use m1m3_control_unit::model::{Model, ModelOptions};
use m1m3_control_unit::publisher::{Event, RecordingPublisher};
use m1m3_control_unit::state::Context;
use m1m3_control_unit::transport::SimulatedTransport;

use super::{start, ACCEPTED};

struct Rig {
    barrier: Arc<CycleBarrier>,
    controller: CommandController,
    publisher: Arc<RecordingPublisher>,
    ctx: Context,
}

fn rig() -> Rig {
    let publisher = Arc::new(RecordingPublisher::new());
    let (transport, _sim) = SimulatedTransport::new();
    let model = Model::new(
        ModelOptions::default(),
        Arc::new(MirrorGeometry::default()),
        Box::new(transport),
        publisher.clone(),
        Arc::new(ManualTimeSource::new(0.0)),
    );
    let barrier = Arc::new(CycleBarrier::new());
    Rig {
        controller: CommandController::new(publisher.clone(), barrier.clone()),
        barrier,
        publisher,
        ctx: Context::new(model),
    }
}

fn outer_loop_data(publisher: &RecordingPublisher) -> usize {
    publisher.count(|e| matches!(e, Event::OuterLoopData { .. }))
}

#[test]
fn clock_cycles_are_executed_once_each() {
    let Rig {
        barrier,
        controller,
        publisher,
        mut ctx,
    } = rig();
    let running = AtomicBool::new(true);

    let stats = thread::scope(|s| {
        let worker = s.spawn(|| controller.run(&mut ctx, &running));
        let mut clock = OuterLoopClock::new(barrier.clone(), Duration::from_millis(1));
        let stats = clock.run(&running, 25);
        running.store(false, Ordering::SeqCst);
        barrier.shutdown();
        worker.join().unwrap();
        stats
    });

    assert_eq!(stats.cycle_count, 25);
    assert_eq!(ctx.cycles(), 25);
    assert_eq!(outer_loop_data(&publisher), 25);
}

#[test]
fn commands_run_between_cycles() {
    let Rig {
        barrier,
        controller,
        publisher,
        mut ctx,
    } = rig();
    let running = AtomicBool::new(true);

    thread::scope(|s| {
        let worker = s.spawn(|| controller.run(&mut ctx, &running));
        barrier.request_cycle().unwrap();
        controller.enqueue(CommandEnvelope::new(1, Command::Boot));
        controller.enqueue(CommandEnvelope::new(2, start("Default")));
        barrier.request_cycle().unwrap();

        // Commands may still be queued behind the cycle; wait for them.
        for _ in 0..200 {
            if publisher.acks_for(2).len() == 2 {
                break;
            }
            thread::sleep(Duration::from_millis(5));
        }
        barrier.request_cycle().unwrap();

        running.store(false, Ordering::SeqCst);
        barrier.shutdown();
        worker.join().unwrap();
    });

    assert_eq!(publisher.acks_for(1), ACCEPTED);
    assert_eq!(publisher.acks_for(2), ACCEPTED);
    assert_eq!(ctx.state(), DetailedState::Disabled);
    assert_eq!(ctx.cycles(), 3);
}

#[test]
fn shutdown_releases_clock_and_refuses_requests() {
    let barrier = Arc::new(CycleBarrier::new());

    // No worker: the request only returns through shutdown.
    let waiter = {
        let barrier = barrier.clone();
        thread::spawn(move || barrier.request_cycle())
    };
    thread::sleep(Duration::from_millis(20));
    barrier.shutdown();

    assert_eq!(waiter.join().unwrap(), Err(CycleError::Shutdown));
    assert_eq!(barrier.request_cycle(), Err(CycleError::Shutdown));
    assert!(barrier.is_shutdown());
}

#[test]
fn worker_aborts_queue_on_exit() {
    let Rig {
        barrier,
        controller,
        publisher,
        mut ctx,
    } = rig();
    controller.enqueue(CommandEnvelope::new(9, Command::Boot));
    barrier.shutdown();

    // Shut down before the first iteration: nothing executes.
    controller.run(&mut ctx, &AtomicBool::new(true));

    assert_eq!(
        publisher.acks_for(9),
        vec![m1m3_common::state::AckCode::Aborted]
    );
    assert_eq!(ctx.state(), DetailedState::Offline);
}
