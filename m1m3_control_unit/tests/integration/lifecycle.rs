//! Integration test: lifecycle transitions and per-state acceptance.
//!
//! Validates: Offline → Standby → Disabled → Parked and back, engineering
//! entry/exit, fault recovery through Standby, and that refused commands
//! leave the state untouched.

use m1m3_common::consts::FA_COUNT;
use m1m3_common::fault::{CellOutputs, PowerNetworks};
use m1m3_common::state::{AckCode, DetailedState, SummaryState};
use m1m3_control_unit::command::{
    Command, HardpointStepsPayload, OffsetForcesPayload, PidSelectPayload, PowerPayload, ProgramIlcPayload,
    RaisePayload, TranslatePayload,
};
use m1m3_control_unit::force::ComponentKind;
use m1m3_control_unit::publisher::Event;
use tempfile::TempDir;

use super::{start, Cell, ACCEPTED, FAILED};

// ── Start-up ────────────────────────────────────────────────────────

#[test]
fn start_reaches_disabled_with_main_power() {
    let mut cell = Cell::new();
    assert_eq!(cell.send(Command::Boot), ACCEPTED);
    assert_eq!(cell.state(), DetailedState::Standby);

    assert_eq!(cell.send(start("Default")), ACCEPTED);
    assert_eq!(cell.state(), DetailedState::Disabled);
    assert_eq!(cell.sim.snapshot().power, PowerNetworks::MAIN);
    assert_eq!(
        cell.publisher
            .count(|e| matches!(e, Event::SettingsApplied { settings_version, .. } if settings_version == "Default")),
        1
    );
}

#[test]
fn enable_powers_aux_and_air_then_parks() {
    let mut cell = Cell::new();
    cell.send(Command::Boot);
    cell.send(start("Default"));
    assert_eq!(cell.send(Command::Enable), ACCEPTED);
    assert_eq!(cell.state(), DetailedState::Parked);
    assert_eq!(cell.state().summary(), SummaryState::Enabled);

    let sim = cell.sim.snapshot();
    assert!(sim.outputs.contains(CellOutputs::AIR_SUPPLY));
    assert_eq!(sim.power, PowerNetworks::MAIN | PowerNetworks::AUX);
}

#[test]
fn disable_and_standby_power_down() {
    let mut cell = Cell::parked();
    assert_eq!(cell.send(Command::Disable), ACCEPTED);
    assert_eq!(cell.state(), DetailedState::Disabled);
    let sim = cell.sim.snapshot();
    assert_eq!(sim.power, PowerNetworks::MAIN);
    assert!(!sim.outputs.contains(CellOutputs::AIR_SUPPLY));

    assert_eq!(cell.send(Command::Standby), ACCEPTED);
    assert_eq!(cell.state(), DetailedState::Standby);
    let sim = cell.sim.snapshot();
    assert!(sim.power.is_empty());
    assert!(sim.outputs.is_empty());

    assert_eq!(cell.send(Command::Shutdown), ACCEPTED);
    assert_eq!(cell.state(), DetailedState::Offline);
}

#[test]
fn failed_disable_keeps_forces() {
    let mut cell = Cell::parked();
    cell.send(Command::EnterEngineering);
    cell.send(Command::ApplyOffsetForces(OffsetForcesPayload {
        x_forces: vec![0.0; FA_COUNT],
        y_forces: vec![0.0; FA_COUNT],
        z_forces: vec![40.0; FA_COUNT],
    }));
    cell.cycle(3);

    cell.sim.lock().outputs_fail = true;
    assert_eq!(cell.send(Command::Disable), FAILED);
    assert_eq!(cell.state(), DetailedState::ParkedEngineering);
    let offset = cell.ctx.model().force.component(ComponentKind::Offset);
    assert!(offset.is_enabled());
    assert_eq!(offset.current().z.get(0), Some(&40.0));

    cell.sim.lock().outputs_fail = false;
    assert_eq!(cell.send(Command::Disable), ACCEPTED);
    assert!(!cell.ctx.model().force.component(ComponentKind::Offset).is_active());
}

#[test]
fn unknown_profile_fails_and_stays_in_standby() {
    let dir = TempDir::new().unwrap();
    let mut cell = Cell::with_settings_dir(Some(dir.path().to_path_buf()));
    cell.send(Command::Boot);
    assert_eq!(cell.send(start("Missing")), FAILED);
    assert_eq!(cell.state(), DetailedState::Standby);
}

#[test]
fn profile_file_is_applied() {
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("Fast.toml"),
        "[force_controller]\nraise_increment_percentage = 0.05\n",
    )
    .unwrap();
    let mut cell = Cell::with_settings_dir(Some(dir.path().to_path_buf()));
    cell.send(Command::Boot);
    assert_eq!(cell.send(start("Fast")), ACCEPTED);
    let settings = cell.ctx.model().settings();
    assert_eq!(settings.name, "Fast");
    assert_eq!(settings.force_controller.raise_increment_percentage, 0.05);
}

// ── Acceptance ──────────────────────────────────────────────────────

fn standby() -> Cell {
    let mut cell = Cell::new();
    cell.send(Command::Boot);
    cell
}

fn enter_engineering(mut cell: Cell) -> Cell {
    cell.send(Command::EnterEngineering);
    cell
}

fn parked_engineering() -> Cell {
    enter_engineering(Cell::parked())
}

fn active_engineering() -> Cell {
    enter_engineering(Cell::active())
}

fn raising() -> Cell {
    let mut cell = Cell::parked();
    cell.send(Command::RaiseM1M3(RaisePayload::default()));
    cell
}

fn raising_engineering() -> Cell {
    let mut cell = parked_engineering();
    cell.send(Command::RaiseM1M3(RaisePayload::default()));
    cell
}

fn lowering() -> Cell {
    let mut cell = Cell::active();
    cell.send(Command::LowerM1M3);
    cell
}

fn lowering_engineering() -> Cell {
    let mut cell = active_engineering();
    cell.send(Command::LowerM1M3);
    cell
}

fn lowering_fault() -> Cell {
    let mut cell = Cell::parked();
    cell.send(Command::Panic);
    cell
}

fn fault() -> Cell {
    let mut cell = lowering_fault();
    cell.cycle(1);
    cell
}

fn offsets() -> Command {
    Command::ApplyOffsetForces(OffsetForcesPayload {
        x_forces: vec![0.0; FA_COUNT],
        y_forces: vec![0.0; FA_COUNT],
        z_forces: vec![10.0; FA_COUNT],
    })
}

fn program_ilc() -> Command {
    Command::ProgramIlc(ProgramIlcPayload {
        actuator_id: 101,
        file_path: "firmware.hex".into(),
    })
}

fn raise() -> Command {
    Command::RaiseM1M3(RaisePayload::default())
}

/// Every command in `commands` is acknowledged FAILED from the state
/// `make` builds, and the state does not move.
fn assert_refused(make: fn() -> Cell, commands: &[Command]) {
    for command in commands {
        let mut cell = make();
        let before = cell.state();
        let name = command.name();
        assert_eq!(cell.send(command.clone()), FAILED, "{name} in {before}");
        assert_eq!(cell.state(), before, "{name} changed {before}");
    }
}

#[test]
fn lifecycle_states_refuse_commands_outside_their_set() {
    assert_refused(
        Cell::new,
        &[
            start("Default"),
            Command::Enable,
            Command::Standby,
            Command::Panic,
            raise(),
            Command::TurnAirOn,
        ],
    );
    assert_refused(
        standby,
        &[
            Command::Boot,
            Command::Enable,
            raise(),
            Command::ClearOffsetForces,
            program_ilc(),
        ],
    );
    assert_refused(
        disabled,
        &[
            Command::Boot,
            start("Default"),
            Command::Shutdown,
            raise(),
            offsets(),
            Command::TurnLightsOn,
        ],
    );
    assert_refused(
        lowering_fault,
        &[
            Command::Standby,
            Command::Enable,
            Command::Panic,
            Command::LowerM1M3,
            Command::ClearOffsetForces,
        ],
    );
    assert_refused(
        fault,
        &[
            Command::Boot,
            start("Default"),
            Command::Enable,
            Command::Disable,
            Command::Shutdown,
            raise(),
        ],
    );
}

#[test]
fn parked_states_refuse_commands_outside_their_set() {
    assert_refused(
        Cell::parked,
        &[
            Command::Boot,
            Command::Standby,
            Command::ExitEngineering,
            Command::LowerM1M3,
            Command::AbortRaiseM1M3,
            Command::ClearOffsetForces,
            Command::ClearActiveOpticForces,
            Command::MoveHardpointActuators(HardpointStepsPayload { steps: [10; 6] }),
            Command::TurnAirOff,
            Command::TranslateM1M3(TranslatePayload::default()),
            Command::ResetPid(PidSelectPayload { pid: 1 }),
            program_ilc(),
        ],
    );
    assert_refused(
        parked_engineering,
        &[
            Command::Standby,
            Command::EnterEngineering,
            Command::LowerM1M3,
            Command::AbortRaiseM1M3,
            Command::ClearActiveOpticForces,
            Command::TranslateM1M3(TranslatePayload::default()),
            Command::ResetPid(PidSelectPayload { pid: 1 }),
        ],
    );
}

#[test]
fn moving_states_refuse_commands_outside_their_set() {
    assert_refused(
        raising,
        &[
            Command::Disable,
            Command::EnterEngineering,
            raise(),
            Command::LowerM1M3,
            offsets(),
            Command::ClearActiveOpticForces,
            Command::TurnAirOff,
        ],
    );
    assert_refused(
        raising_engineering,
        &[
            Command::Disable,
            Command::ExitEngineering,
            Command::LowerM1M3,
            Command::ClearActiveOpticForces,
            Command::ResetPid(PidSelectPayload { pid: 1 }),
        ],
    );
    assert_refused(
        lowering,
        &[
            Command::Disable,
            Command::EnterEngineering,
            raise(),
            Command::AbortRaiseM1M3,
            Command::ClearActiveOpticForces,
            Command::StopHardpointMotion,
        ],
    );
    assert_refused(
        lowering_engineering,
        &[
            Command::ExitEngineering,
            Command::Disable,
            Command::LowerM1M3,
            Command::TranslateM1M3(TranslatePayload::default()),
        ],
    );
}

#[test]
fn active_states_refuse_commands_outside_their_set() {
    assert_refused(
        Cell::active,
        &[
            Command::Disable,
            Command::Standby,
            raise(),
            Command::AbortRaiseM1M3,
            offsets(),
            Command::MoveHardpointActuators(HardpointStepsPayload { steps: [10; 6] }),
            Command::TranslateM1M3(TranslatePayload::default()),
            Command::TurnAirOff,
        ],
    );
    assert_refused(
        active_engineering,
        &[
            Command::Disable,
            Command::Standby,
            Command::EnterEngineering,
            raise(),
            Command::AbortRaiseM1M3,
            program_ilc(),
        ],
    );
}

#[test]
fn rejection_reason_names_command_and_state() {
    let mut cell = Cell::parked();
    cell.send(Command::ClearOffsetForces);
    let description = cell
        .publisher
        .events()
        .into_iter()
        .find_map(|e| match e {
            Event::CommandAck {
                ack: AckCode::Failed,
                description,
                ..
            } => Some(description),
            _ => None,
        })
        .unwrap();
    assert_eq!(
        description,
        "The command clearOffsetForces is not valid in the Parked state."
    );
}

#[test]
fn engineering_mode_unlocks_cell_io_and_hardpoints() {
    let mut cell = Cell::parked();
    assert_eq!(cell.send(Command::EnterEngineering), ACCEPTED);
    assert_eq!(cell.state(), DetailedState::ParkedEngineering);

    assert_eq!(cell.send(Command::TurnLightsOn), ACCEPTED);
    assert!(cell.sim.snapshot().outputs.contains(CellOutputs::CELL_LIGHTS));
    assert_eq!(
        cell.send(Command::TurnPowerOff(PowerPayload {
            networks: PowerNetworks::AUX_C,
        })),
        ACCEPTED
    );
    assert!(!cell.sim.snapshot().power.contains(PowerNetworks::AUX_C));

    assert_eq!(
        cell.send(Command::MoveHardpointActuators(HardpointStepsPayload {
            steps: [100, 0, 0, 0, 0, -100],
        })),
        ACCEPTED
    );
    cell.cycle(2);
    let encoders = cell.sim.snapshot().encoders;
    assert_eq!(encoders[0], 100);
    assert_eq!(encoders[5], -100);

    assert_eq!(cell.send(Command::ExitEngineering), ACCEPTED);
    assert_eq!(cell.state(), DetailedState::Parked);
}

// ── Faults ──────────────────────────────────────────────────────────

#[test]
fn panic_faults_and_standby_recovers() {
    let mut cell = Cell::parked();
    assert_eq!(cell.send(Command::Panic), ACCEPTED);
    assert_eq!(cell.state(), DetailedState::LoweringFault);

    cell.cycle(1);
    assert_eq!(cell.state(), DetailedState::Fault);
    assert!(cell.ctx.model().safety.error_code().is_some());

    assert_eq!(cell.send(Command::Enable), FAILED);
    assert_eq!(cell.send(Command::Standby), ACCEPTED);
    assert_eq!(cell.state(), DetailedState::Standby);
    assert!(cell.ctx.model().safety.error_code().is_none());

    let states = cell.detailed_states();
    assert_eq!(
        &states[states.len() - 3..],
        &[
            DetailedState::LoweringFault,
            DetailedState::Fault,
            DetailedState::Standby
        ]
    );
}

#[test]
fn persistent_bus_failure_faults() {
    let mut cell = Cell::parked();
    cell.sim.lock().failing_subnet = Some(2);
    let cycles = cell.cycle_until(DetailedState::LoweringFault);
    assert_eq!(cycles, Some(10));
    assert!(cell.publisher.count(|e| matches!(e, Event::TransportWarning { .. })) >= 10);
}

fn disabled() -> Cell {
    let mut cell = Cell::new();
    cell.send(Command::Boot);
    cell.send(start("Default"));
    assert_eq!(cell.state(), DetailedState::Disabled);
    cell
}

#[test]
fn bus_failure_while_disabled_faults() {
    let mut cell = disabled();
    cell.cycle(3);
    assert_eq!(cell.sim.snapshot().transactions, 3);

    cell.sim.lock().failing_subnet = Some(2);
    assert_eq!(cell.cycle_until(DetailedState::LoweringFault), Some(10));
    assert!(cell.publisher.count(|e| matches!(e, Event::TransportWarning { .. })) >= 10);

    cell.cycle(1);
    assert_eq!(cell.state(), DetailedState::Fault);
}

#[test]
fn fault_keeps_polling_the_bus() {
    let mut cell = Cell::parked();
    cell.send(Command::Panic);
    cell.cycle(1);
    assert_eq!(cell.state(), DetailedState::Fault);

    let before = cell.sim.snapshot().transactions;
    let telemetry = cell.publisher.count(|e| matches!(e, Event::AppliedForces { .. }));
    cell.cycle(20);
    assert_eq!(cell.sim.snapshot().transactions, before + 20);
    assert_eq!(
        cell.publisher.count(|e| matches!(e, Event::AppliedForces { .. })),
        telemetry + 20
    );
    assert_eq!(cell.state(), DetailedState::Fault);
}

#[test]
fn fault_leaves_no_component_enabled() {
    let mut cell = Cell::active();
    cell.send(Command::Panic);
    cell.cycle(1);
    assert_eq!(cell.state(), DetailedState::Fault);
    let force = &cell.ctx.model().force;
    for kind in ComponentKind::ALL {
        assert!(!force.component(kind).is_active(), "{} still active", kind.name());
    }
}

