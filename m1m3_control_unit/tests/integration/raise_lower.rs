//! Integration test: automatic raise and lower.
//!
//! Validates: support percentage ramps to 100 % and back, completion events
//! instead of timeouts, abort mid-raise, engineering raise with the
//! reference bypass, and the following-error fault during a raise.

use m1m3_common::state::DetailedState;
use m1m3_control_unit::command::{Command, RaisePayload};
use m1m3_control_unit::force::ComponentKind;
use m1m3_control_unit::publisher::{Event, OperationKind, OperationPhase};

use super::{Cell, ACCEPTED};

fn phases(cell: &Cell, kind: OperationKind) -> Vec<OperationPhase> {
    cell.publisher
        .events()
        .into_iter()
        .filter_map(|e| match e {
            Event::AutomaticOperation { operation, phase, .. } if operation == kind => Some(phase),
            _ => None,
        })
        .collect()
}

#[test]
fn raise_reaches_active_with_completion_event() {
    let mut cell = Cell::parked();
    assert_eq!(cell.send(Command::RaiseM1M3(RaisePayload::default())), ACCEPTED);
    assert_eq!(cell.state(), DetailedState::Raising);

    let cycles = cell.cycle_until(DetailedState::Active).expect("raise did not finish");
    assert!((100..=110).contains(&cycles), "raise took {cycles} cycles");

    let force = &cell.ctx.model().force;
    assert!(force.support_percentage_filled());
    assert!(force.component(ComponentKind::Static).is_enabled());
    assert!(force.component(ComponentKind::Elevation).is_enabled());
    assert_eq!(
        phases(&cell, OperationKind::Raise),
        vec![OperationPhase::Started, OperationPhase::Completed]
    );
}

#[test]
fn support_percentage_is_monotonic_while_raising() {
    let mut cell = Cell::parked();
    cell.send(Command::RaiseM1M3(RaisePayload::default()));
    let mut last = 0.0;
    while cell.state() == DetailedState::Raising {
        cell.cycle(1);
        let now = cell.ctx.model().force.support_percentage();
        assert!(now >= last, "support dropped from {last} to {now}");
        last = now;
    }
    assert_eq!(cell.state(), DetailedState::Active);
}

#[test]
fn raise_then_lower_returns_to_parked() {
    let mut cell = Cell::active();
    assert_eq!(cell.send(Command::LowerM1M3), ACCEPTED);
    assert_eq!(cell.state(), DetailedState::Lowering);

    assert!(cell.cycle_until(DetailedState::Parked).is_some());
    let force = &cell.ctx.model().force;
    assert!(force.support_percentage_zeroed());
    assert!(!force.component(ComponentKind::Elevation).is_enabled());
    assert_eq!(
        phases(&cell, OperationKind::Lower),
        vec![OperationPhase::Started, OperationPhase::Completed]
    );
}

#[test]
fn round_trip_is_deterministic() {
    let run = || {
        let mut cell = Cell::active();
        cell.send(Command::LowerM1M3);
        cell.cycle_until(DetailedState::Parked);
        (cell.detailed_states(), cell.ctx.cycles())
    };
    assert_eq!(run(), run());
}

#[test]
fn abort_lowers_from_current_support() {
    let mut cell = Cell::parked();
    cell.send(Command::RaiseM1M3(RaisePayload::default()));
    cell.cycle(30);
    let support = cell.ctx.model().force.support_percentage();
    assert!(support > 0.2 && support < 0.4, "support {support}");

    assert_eq!(cell.send(Command::AbortRaiseM1M3), ACCEPTED);
    assert_eq!(cell.state(), DetailedState::Lowering);
    let cycles = cell.cycle_until(DetailedState::Parked).unwrap();
    assert!(cycles < 50, "lower from {support} took {cycles} cycles");
    assert_eq!(
        phases(&cell, OperationKind::Raise),
        vec![OperationPhase::Started, OperationPhase::Aborted]
    );
}

#[test]
fn engineering_raise_may_bypass_reference() {
    let mut cell = Cell::parked();
    cell.send(Command::EnterEngineering);
    assert_eq!(
        cell.send(Command::RaiseM1M3(RaisePayload {
            bypass_reference_position: true,
        })),
        ACCEPTED
    );
    assert_eq!(cell.state(), DetailedState::RaisingEngineering);
    assert!(cell.cycle_until(DetailedState::ActiveEngineering).is_some());
    assert!(cell.ctx.model().automatic.bypass_move_to_reference());
}

#[test]
fn following_error_stalls_then_faults_raise() {
    let mut cell = Cell::parked();
    cell.sim.lock().following_error = 500.0;
    cell.send(Command::RaiseM1M3(RaisePayload::default()));
    assert_eq!(cell.cycle_until(DetailedState::LoweringFault), Some(10));
    assert!(cell.ctx.model().force.support_percentage() < 0.05);

    cell.cycle(1);
    assert_eq!(cell.state(), DetailedState::Fault);
}

#[test]
fn raise_timeout_is_reported_once() {
    let mut cell = Cell::parked();
    // Hardpoints overloaded: the raise can never progress.
    cell.sim.lock().hardpoint_force_offsets = [5_000.0; 6];
    cell.send(Command::RaiseM1M3(RaisePayload::default()));
    cell.cycle(1);
    cell.time.advance(301.0);
    cell.cycle(5);

    assert_eq!(cell.state(), DetailedState::Raising);
    assert_eq!(
        phases(&cell, OperationKind::Raise),
        vec![OperationPhase::Started, OperationPhase::TimedOut]
    );
}
