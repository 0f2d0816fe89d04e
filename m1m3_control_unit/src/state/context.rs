//! State machine context: the current state plus the model it drives.

use std::time::Instant;

use m1m3_common::state::DetailedState;
use tracing::{debug, info};

use super::{enabled, lifecycle, StateError};
use crate::command::Command;
use crate::model::Model;
use crate::publisher::Event;

/// Owns the model and the current [`DetailedState`].
pub struct Context {
    state: DetailedState,
    model: Model,
    cycle: u64,
}

impl Context {
    /// Start in `Offline`.
    pub fn new(model: Model) -> Self {
        Self {
            state: DetailedState::Offline,
            model,
            cycle: 0,
        }
    }

    #[inline]
    pub fn state(&self) -> DetailedState {
        self.state
    }

    #[inline]
    pub fn model(&self) -> &Model {
        &self.model
    }

    #[inline]
    pub fn model_mut(&mut self) -> &mut Model {
        &mut self.model
    }

    /// Outer-loop cycles executed so far.
    #[inline]
    pub fn cycles(&self) -> u64 {
        self.cycle
    }

    /// Run `command` against the current state.
    ///
    /// A handler error leaves the state untouched. Otherwise the proposed
    /// state passes through the safety check (in `Disabled` and the enabled
    /// family) before it becomes current.
    pub fn handle(&mut self, command: &Command) -> Result<(), StateError> {
        let started = Instant::now();
        let state = self.state;

        let proposed = if is_enabled_family(state) {
            enabled::handle(&mut self.model, state, command)?
        } else {
            lifecycle::handle(&mut self.model, state, command)?
        };

        let mut next = proposed.unwrap_or(state);
        if next == DetailedState::Disabled || next.is_enabled() {
            next = self.model.safety.check_safety(next);
        }
        if next != state {
            self.transition(next);
        }

        if matches!(command, Command::Update) {
            self.cycle += 1;
            let execution_time = started.elapsed().as_secs_f64();
            debug!(cycle = self.cycle, execution_time, "Outer loop cycle");
            self.model.publisher().publish(Event::OuterLoopData {
                timestamp: self.model.now(),
                cycle: self.cycle,
                execution_time,
            });
        }
        Ok(())
    }

    fn transition(&mut self, next: DetailedState) {
        let previous = self.state;
        self.state = next;
        info!("State: {previous} -> {next}");

        let timestamp = self.model.now();
        let publisher = self.model.publisher();
        publisher.publish(Event::DetailedState {
            timestamp,
            detailed_state: next,
        });
        if previous.summary() != next.summary() {
            publisher.publish(Event::SummaryState {
                timestamp,
                summary_state: next.summary(),
            });
        }
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("state", &self.state)
            .field("cycle", &self.cycle)
            .finish_non_exhaustive()
    }
}

const fn is_enabled_family(state: DetailedState) -> bool {
    use DetailedState::*;
    matches!(
        state,
        Parked
            | ParkedEngineering
            | Raising
            | RaisingEngineering
            | Active
            | ActiveEngineering
            | Lowering
            | LoweringEngineering
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{RaisePayload, StartPayload};
    use crate::cycle::ManualTimeSource;
    use crate::model::ModelOptions;
    use crate::publisher::RecordingPublisher;
    use crate::transport::simulation::SimulatedTransport;
    use m1m3_common::geometry::MirrorGeometry;
    use m1m3_common::state::SummaryState;
    use std::sync::Arc;

    fn context() -> (Context, Arc<RecordingPublisher>) {
        let publisher = Arc::new(RecordingPublisher::new());
        let (transport, _handle) = SimulatedTransport::new();
        let model = Model::new(
            ModelOptions::default(),
            Arc::new(MirrorGeometry::default()),
            Box::new(transport),
            publisher.clone(),
            Arc::new(ManualTimeSource::new(0.0)),
        );
        (Context::new(model), publisher)
    }

    fn start() -> Command {
        Command::Start(StartPayload {
            settings_to_apply: "Default".to_string(),
        })
    }

    #[test]
    fn boot_start_enable_reaches_parked() {
        let (mut ctx, publisher) = context();
        ctx.handle(&Command::Boot).unwrap();
        ctx.handle(&start()).unwrap();
        ctx.handle(&Command::Enable).unwrap();
        assert_eq!(ctx.state(), DetailedState::Parked);

        let summaries: Vec<_> = publisher
            .events()
            .into_iter()
            .filter_map(|e| match e {
                Event::SummaryState { summary_state, .. } => Some(summary_state),
                _ => None,
            })
            .collect();
        assert_eq!(
            summaries,
            vec![SummaryState::Standby, SummaryState::Disabled, SummaryState::Enabled]
        );
    }

    #[test]
    fn invalid_command_keeps_state() {
        let (mut ctx, publisher) = context();
        let err = ctx.handle(&Command::Enable).unwrap_err();
        assert_eq!(
            err,
            StateError::NotValid {
                command: "enable",
                state: DetailedState::Offline
            }
        );
        assert_eq!(ctx.state(), DetailedState::Offline);
        assert!(publisher.events().is_empty());
    }

    #[test]
    fn update_publishes_outer_loop_data() {
        let (mut ctx, publisher) = context();
        ctx.handle(&Command::Update).unwrap();
        ctx.handle(&Command::Update).unwrap();
        assert_eq!(ctx.cycles(), 2);
        assert_eq!(
            publisher.count(|e| matches!(e, Event::OuterLoopData { .. })),
            2
        );
    }

    #[test]
    fn panic_overrides_proposed_state() {
        let (mut ctx, _publisher) = context();
        ctx.handle(&Command::Boot).unwrap();
        ctx.handle(&start()).unwrap();
        ctx.handle(&Command::Enable).unwrap();
        ctx.handle(&Command::Panic).unwrap();
        assert_eq!(ctx.state(), DetailedState::LoweringFault);

        ctx.handle(&Command::Update).unwrap();
        assert_eq!(ctx.state(), DetailedState::Fault);
        ctx.handle(&Command::Standby).unwrap();
        assert_eq!(ctx.state(), DetailedState::Standby);
        assert!(ctx.model().safety.error_code().is_none());
    }

    #[test]
    fn bypass_needs_engineering_mode() {
        let (mut ctx, _publisher) = context();
        ctx.handle(&Command::Boot).unwrap();
        ctx.handle(&start()).unwrap();
        ctx.handle(&Command::Enable).unwrap();
        let err = ctx
            .handle(&Command::RaiseM1M3(RaisePayload {
                bypass_reference_position: true,
            }))
            .unwrap_err();
        assert!(matches!(err, StateError::Rejected(_)));
        assert_eq!(ctx.state(), DetailedState::Parked);
    }
}
