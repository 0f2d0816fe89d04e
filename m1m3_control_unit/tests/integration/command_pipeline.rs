//! Integration test: JSON lines through the queue to acknowledgments.
//!
//! Validates: decoded commands execute in arrival order, undecodable
//! payloads keep their command id, structural errors are refused with
//! NOPERM before the state machine sees them, and clearing the queue aborts
//! what is still waiting.

use m1m3_common::state::{AckCode, DetailedState};
use m1m3_control_unit::command::codec::{self, DecodeError};

use super::{Cell, ACCEPTED, FAILED};

/// Decode `lines` into the queue, then drain it.
fn feed(cell: &mut Cell, lines: &[&str]) {
    for line in lines {
        cell.controller.enqueue(codec::decode(line).unwrap());
    }
    while let Some(envelope) = cell.controller.dequeue() {
        cell.controller.execute(&mut cell.ctx, &envelope);
    }
}

#[test]
fn json_lines_bring_the_cell_to_parked() {
    let mut cell = Cell::new();
    feed(
        &mut cell,
        &[
            r#"{"topic":"MTM1M3_command_boot","commandId":101}"#,
            r#"{"topic":"MTM1M3_command_start","commandId":102,"settingsToApply":"Default"}"#,
            r#"{"topic":"MTM1M3_command_enable","commandId":103}"#,
        ],
    );
    assert_eq!(cell.state(), DetailedState::Parked);
    for id in 101..=103 {
        assert_eq!(cell.publisher.acks_for(id), ACCEPTED, "command {id}");
    }
    assert!(cell.controller.is_empty());
}

#[test]
fn queue_preserves_arrival_order() {
    let mut cell = Cell::new();
    // Enable before start: refused, and start still runs after it.
    feed(
        &mut cell,
        &[
            r#"{"topic":"MTM1M3_command_boot","commandId":1}"#,
            r#"{"topic":"MTM1M3_command_enable","commandId":2}"#,
            r#"{"topic":"MTM1M3_command_start","commandId":3,"settingsToApply":"Default"}"#,
        ],
    );
    assert_eq!(cell.publisher.acks_for(2), FAILED);
    assert_eq!(cell.publisher.acks_for(3), ACCEPTED);
    assert_eq!(cell.state(), DetailedState::Disabled);
}

#[test]
fn undecodable_payload_keeps_its_command_id() {
    let err = codec::decode(r#"{"topic":"MTM1M3_command_raiseM1M3","commandId":44,"bypassReferencePosition":"yes"}"#)
        .unwrap_err();
    assert_eq!(err.command_id(), Some(44));
    assert!(err.to_string().contains("MTM1M3_command_raiseM1M3"));

    let err = codec::decode(r#"{"topic":"MTM1M3_command_enable","commandId":"x"}"#).unwrap_err();
    assert_eq!(err, DecodeError::MissingId);
    assert_eq!(err.command_id(), None);
}

#[test]
fn structural_errors_are_refused_with_noperm() {
    let mut cell = Cell::parked();
    cell.send(m1m3_control_unit::command::Command::EnterEngineering);
    let before = cell.state();
    feed(
        &mut cell,
        &[
            r#"{"topic":"MTM1M3_command_applyOffsetForces","commandId":7,"xForces":[0.0],"yForces":[0.0],"zForces":[0.0]}"#,
            r#"{"topic":"MTM1M3_command_turnPowerOn","commandId":8,"networks":""}"#,
        ],
    );
    assert_eq!(cell.publisher.acks_for(7), vec![AckCode::NoPerm]);
    assert_eq!(cell.publisher.acks_for(8), vec![AckCode::NoPerm]);
    assert_eq!(cell.state(), before);
}

#[test]
fn clearing_the_queue_aborts_waiting_commands() {
    let mut cell = Cell::new();
    for line in [
        r#"{"topic":"MTM1M3_command_boot","commandId":5}"#,
        r#"{"topic":"MTM1M3_command_start","commandId":6,"settingsToApply":"Default"}"#,
    ] {
        cell.controller.enqueue(codec::decode(line).unwrap());
    }
    assert_eq!(cell.controller.len(), 2);

    cell.controller.clear();
    assert!(cell.controller.is_empty());
    assert_eq!(cell.publisher.acks_for(5), vec![AckCode::Aborted]);
    assert_eq!(cell.publisher.acks_for(6), vec![AckCode::Aborted]);
    assert_eq!(cell.state(), DetailedState::Offline);
}
