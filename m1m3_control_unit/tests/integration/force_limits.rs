//! Integration test: force components, clipping and setpoint warnings.
//!
//! Validates: offset ramps converge without overshoot, clearing ramps down
//! monotonically, offsets above the per-actuator limit are clamped and
//! flagged, excessive moments are flagged and corrected, and bending-mode
//! commands are checked before they reach the state machine.

use m1m3_common::consts::{BENDING_MODE_COUNT, FA_COUNT};
use m1m3_common::fault::SetpointWarning;
use m1m3_common::state::{AckCode, DetailedState};
use m1m3_control_unit::command::{BendingModesPayload, Command, MirrorForcePayload, OffsetForcesPayload};
use m1m3_control_unit::force::ComponentKind;
use m1m3_control_unit::publisher::Event;

use super::{Cell, ACCEPTED};

fn engineering() -> Cell {
    let mut cell = Cell::parked();
    cell.send(Command::EnterEngineering);
    assert_eq!(cell.state(), DetailedState::ParkedEngineering);
    cell
}

fn z_offsets(f: impl Fn(usize) -> f64) -> Command {
    Command::ApplyOffsetForces(OffsetForcesPayload {
        x_forces: vec![0.0; FA_COUNT],
        y_forces: vec![0.0; FA_COUNT],
        z_forces: (0..FA_COUNT).map(f).collect(),
    })
}

fn offset_z(cell: &Cell, index: usize) -> (f64, f64) {
    let c = cell.ctx.model().force.component(ComponentKind::Offset);
    (
        *c.current().z.get(index).unwrap(),
        *c.target().z.get(index).unwrap(),
    )
}

fn warnings(cell: &Cell) -> Vec<SetpointWarning> {
    cell.publisher
        .events()
        .into_iter()
        .filter_map(|e| match e {
            Event::ForceSetpointWarning { flags, .. } => Some(flags),
            _ => None,
        })
        .collect()
}

#[test]
fn offset_converges_without_overshoot() {
    let mut cell = engineering();
    assert_eq!(cell.send(z_offsets(|_| 250.0)), ACCEPTED);

    let mut last = 0.0;
    for _ in 0..10 {
        cell.cycle(1);
        let (current, target) = offset_z(&cell, 7);
        assert!(current >= last && current <= target, "current {current}");
        last = current;
    }
    assert_eq!(offset_z(&cell, 7), (250.0, 250.0));
}

#[test]
fn clearing_offsets_ramps_down() {
    let mut cell = engineering();
    cell.send(z_offsets(|i| if i % 2 == 0 { 300.0 } else { -300.0 }));
    cell.cycle(5);

    assert_eq!(cell.send(Command::ClearOffsetForces), ACCEPTED);
    let mut last = offset_z(&cell, 0).0.abs();
    for _ in 0..5 {
        cell.cycle(1);
        let now = offset_z(&cell, 0).0.abs();
        assert!(now <= last, "|current| grew from {last} to {now}");
        last = now;
    }
    assert_eq!(last, 0.0);

    assert_eq!(cell.send(Command::ClearOffsetForces), ACCEPTED);
    assert_eq!(offset_z(&cell, 0).1, 0.0);
}

#[test]
fn offset_above_limit_is_clamped_and_flagged() {
    let mut cell = engineering();
    cell.send(z_offsets(|i| if i == 3 { 1_500.0 } else { 0.0 }));
    assert_eq!(offset_z(&cell, 3).1, 1_000.0);
    assert!(warnings(&cell).is_empty());

    cell.cycle(1);
    let flags = warnings(&cell);
    assert_eq!(flags.len(), 1);
    assert!(flags[0].contains(SetpointWarning::ANY_OFFSET_CLIP));

    // The flag clears once the clip has been reported.
    cell.cycle(1);
    assert!(!warnings(&cell).last().unwrap().contains(SetpointWarning::ANY_OFFSET_CLIP));
}

#[test]
fn excessive_moment_is_flagged_and_corrected() {
    let mut cell = engineering();
    let command = Command::ApplyOffsetForcesByMirrorForce(MirrorForcePayload {
        x_moment: 50_000.0,
        ..MirrorForcePayload::default()
    });
    assert_eq!(cell.send(command), ACCEPTED);
    cell.cycle(15);

    assert!(warnings(&cell)
        .iter()
        .any(|w| w.contains(SetpointWarning::X_MOMENT)));
    let mirror = cell.ctx.model().force.mirror_forces();
    assert!(mirror.mx.abs() <= 20_000.0 + 1e-6, "mx {}", mirror.mx);
}

#[test]
fn bending_modes_need_every_coefficient() {
    let mut cell = Cell::active();
    let short = Command::ApplyActiveOpticForcesByBendingModes(BendingModesPayload {
        coefficients: vec![0.1; BENDING_MODE_COUNT - 1],
    });
    assert_eq!(cell.send(short), vec![AckCode::NoPerm]);

    let full = Command::ApplyActiveOpticForcesByBendingModes(BendingModesPayload {
        coefficients: vec![0.1; BENDING_MODE_COUNT],
    });
    assert_eq!(cell.send(full), ACCEPTED);
    assert!(cell
        .ctx
        .model()
        .force
        .component(ComponentKind::ActiveOptic)
        .is_enabled());
}

#[test]
fn active_optics_are_refused_while_parked() {
    let mut cell = Cell::parked();
    let command = Command::ApplyActiveOpticForcesByBendingModes(BendingModesPayload {
        coefficients: vec![0.0; BENDING_MODE_COUNT],
    });
    assert_eq!(cell.send(command), super::FAILED);
}
