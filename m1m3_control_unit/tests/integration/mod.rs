//! Shared harness: a context on the simulated transport, a recording
//! publisher and a manual clock.

mod command_pipeline;
mod cycle_barrier;
mod force_limits;
mod lifecycle;
mod raise_lower;

use std::path::PathBuf;
use std::sync::Arc;

use m1m3_common::geometry::MirrorGeometry;
use m1m3_common::state::{AckCode, DetailedState};
use m1m3_control_unit::command::{Command, CommandController, CommandEnvelope, RaisePayload, StartPayload};
use m1m3_control_unit::cycle::{CycleBarrier, ManualTimeSource};
use m1m3_control_unit::model::{Model, ModelOptions};
use m1m3_control_unit::publisher::{Event, RecordingPublisher};
use m1m3_control_unit::state::Context;
use m1m3_control_unit::transport::{SimulatedTransport, SimulationHandle};

/// Upper bound on cycles for any automatic operation in these tests.
pub const MAX_CYCLES: usize = 400;

pub struct Cell {
    pub controller: CommandController,
    pub ctx: Context,
    pub publisher: Arc<RecordingPublisher>,
    pub sim: SimulationHandle,
    pub time: Arc<ManualTimeSource>,
    next_id: i32,
}

impl Cell {
    pub fn new() -> Self {
        Self::with_settings_dir(None)
    }

    pub fn with_settings_dir(settings_dir: Option<PathBuf>) -> Self {
        let publisher = Arc::new(RecordingPublisher::new());
        let time = Arc::new(ManualTimeSource::new(1_000.0));
        let (transport, sim) = SimulatedTransport::new();
        let model = Model::new(
            ModelOptions {
                settings_dir,
                ..ModelOptions::default()
            },
            Arc::new(MirrorGeometry::default()),
            Box::new(transport),
            publisher.clone(),
            time.clone(),
        );
        let controller = CommandController::new(publisher.clone(), Arc::new(CycleBarrier::new()));
        Self {
            controller,
            ctx: Context::new(model),
            publisher,
            sim,
            time,
            next_id: 1,
        }
    }

    pub fn state(&self) -> DetailedState {
        self.ctx.state()
    }

    /// Execute one external command, returning its acknowledgments.
    pub fn send(&mut self, command: Command) -> Vec<AckCode> {
        let id = self.next_id;
        self.next_id += 1;
        self.controller
            .execute(&mut self.ctx, &CommandEnvelope::new(id, command));
        self.publisher.acks_for(id)
    }

    /// Run `n` outer-loop cycles, advancing the clock one period each.
    pub fn cycle(&mut self, n: usize) {
        for _ in 0..n {
            self.time.advance(0.02);
            self.controller
                .execute(&mut self.ctx, &CommandEnvelope::update());
        }
    }

    /// Cycle until `state` is reached. Returns the cycles taken.
    pub fn cycle_until(&mut self, state: DetailedState) -> Option<usize> {
        for n in 1..=MAX_CYCLES {
            self.cycle(1);
            if self.state() == state {
                return Some(n);
            }
        }
        None
    }

    /// Boot, start with `Default` and enable: the mirror is parked.
    pub fn parked() -> Self {
        let mut cell = Self::new();
        cell.send(Command::Boot);
        cell.send(start("Default"));
        cell.send(Command::Enable);
        assert_eq!(cell.state(), DetailedState::Parked);
        cell
    }

    /// Parked, then raised to `Active`.
    pub fn active() -> Self {
        let mut cell = Self::parked();
        cell.send(Command::RaiseM1M3(RaisePayload::default()));
        assert!(cell.cycle_until(DetailedState::Active).is_some());
        cell
    }

    /// Detailed states published so far, in order.
    pub fn detailed_states(&self) -> Vec<DetailedState> {
        self.publisher
            .events()
            .into_iter()
            .filter_map(|e| match e {
                Event::DetailedState { detailed_state, .. } => Some(detailed_state),
                _ => None,
            })
            .collect()
    }
}

pub fn start(profile: &str) -> Command {
    Command::Start(StartPayload {
        settings_to_apply: profile.to_string(),
    })
}

pub const ACCEPTED: [AckCode; 2] = [AckCode::InProgress, AckCode::Complete];
pub const FAILED: [AckCode; 2] = [AckCode::InProgress, AckCode::Failed];
