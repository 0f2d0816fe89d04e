//! Event publication boundary.
//!
//! The core never talks to the bus directly: acknowledgments, state changes
//! and telemetry are handed to a [`Publisher`] as [`Event`] values. The
//! binary serializes them as JSON lines; tests record them.

use std::io::Write;
use std::sync::{Mutex, PoisonError};

use m1m3_common::actuator::{ActuatorArray, ActuatorId};
use m1m3_common::fault::{PowerNetworks, SetpointWarning};
use m1m3_common::settings::PidParameters;
use m1m3_common::state::{AckCode, DetailedState, SummaryState};
use serde::Serialize;
use tracing::warn;

use crate::hardpoint::HardpointMotion;

/// Which automatic operation an [`Event::AutomaticOperation`] refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum OperationKind {
    Raise,
    Lower,
}

/// Milestone of an automatic operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum OperationPhase {
    Started,
    Completed,
    TimedOut,
    Aborted,
}

/// Everything the core publishes.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Event {
    /// Command acknowledgment.
    CommandAck {
        command_id: i32,
        ack: AckCode,
        ack_code: i32,
        description: String,
    },
    DetailedState {
        timestamp: f64,
        detailed_state: DetailedState,
    },
    SummaryState {
        timestamp: f64,
        summary_state: SummaryState,
    },
    /// Duration of the last outer-loop cycle.
    OuterLoopData {
        timestamp: f64,
        cycle: u64,
        execution_time: f64,
    },
    ForceSetpointWarning {
        timestamp: f64,
        flags: SetpointWarning,
        safety_limit: Vec<ActuatorId>,
        near_neighbor: Vec<ActuatorId>,
        far_neighbor: Vec<ActuatorId>,
        clipped_components: Vec<&'static str>,
    },
    AppliedForces {
        timestamp: f64,
        x_forces: Box<ActuatorArray<f64>>,
        y_forces: Box<ActuatorArray<f64>>,
        z_forces: Box<ActuatorArray<f64>>,
        fx: f64,
        fy: f64,
        fz: f64,
        mx: f64,
        my: f64,
        mz: f64,
    },
    ErrorCode {
        timestamp: f64,
        error_code: u32,
        error_report: String,
    },
    CommandRejectionWarning {
        timestamp: f64,
        command: &'static str,
        reason: String,
    },
    HardpointActuatorState {
        timestamp: f64,
        motion_state: [HardpointMotion; 6],
        encoders: [i32; 6],
    },
    AutomaticOperation {
        timestamp: f64,
        operation: OperationKind,
        phase: OperationPhase,
        support_percentage: f64,
    },
    CellOutputs {
        timestamp: f64,
        air_supply: bool,
        cell_lights: bool,
        power_networks: PowerNetworks,
    },
    PidInfo {
        timestamp: f64,
        pid: u8,
        parameters: PidParameters,
    },
    SettingsApplied {
        timestamp: f64,
        settings_version: String,
    },
    /// Hardware transport failure reported as a warning.
    TransportWarning {
        timestamp: f64,
        reason: String,
    },
}

impl Event {
    /// Short name used in logs.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::CommandAck { .. } => "commandAck",
            Self::DetailedState { .. } => "detailedState",
            Self::SummaryState { .. } => "summaryState",
            Self::OuterLoopData { .. } => "outerLoopData",
            Self::ForceSetpointWarning { .. } => "forceSetpointWarning",
            Self::AppliedForces { .. } => "appliedForces",
            Self::ErrorCode { .. } => "errorCode",
            Self::CommandRejectionWarning { .. } => "commandRejectionWarning",
            Self::HardpointActuatorState { .. } => "hardpointActuatorState",
            Self::AutomaticOperation { .. } => "automaticOperation",
            Self::CellOutputs { .. } => "cellOutputs",
            Self::PidInfo { .. } => "pidInfo",
            Self::SettingsApplied { .. } => "settingsApplied",
            Self::TransportWarning { .. } => "transportWarning",
        }
    }
}

/// Sink for published events. Shared between the subscriber and worker
/// threads.
pub trait Publisher: Send + Sync {
    /// Publish one event.
    fn publish(&self, event: Event);

    /// Publish a command acknowledgment.
    fn ack(&self, command_id: i32, ack: AckCode, description: &str) {
        self.publish(Event::CommandAck {
            command_id,
            ack,
            ack_code: ack.code(),
            description: description.to_string(),
        });
    }
}

// ─── Recording ──────────────────────────────────────────────────────

/// Keeps every event in memory.
#[derive(Debug, Default)]
pub struct RecordingPublisher {
    events: Mutex<Vec<Event>>,
}

impl RecordingPublisher {
    /// Empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all events so far.
    pub fn events(&self) -> Vec<Event> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Remove and return all events so far.
    pub fn take(&self) -> Vec<Event> {
        std::mem::take(&mut *self.events.lock().unwrap_or_else(PoisonError::into_inner))
    }

    /// Acknowledgment codes published for `command_id`, in order.
    pub fn acks_for(&self, command_id: i32) -> Vec<AckCode> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::CommandAck {
                    command_id: id,
                    ack,
                    ..
                } if id == command_id => Some(ack),
                _ => None,
            })
            .collect()
    }

    /// Number of events matching `pred`.
    pub fn count(&self, pred: impl Fn(&Event) -> bool) -> usize {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|e| pred(e))
            .count()
    }
}

impl Publisher for RecordingPublisher {
    fn publish(&self, event: Event) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}

// ─── JSON Lines ─────────────────────────────────────────────────────

/// Writes each event as one JSON object per line.
pub struct JsonLinesPublisher<W: Write + Send> {
    out: Mutex<W>,
    include_cycle_data: bool,
}

impl<W: Write + Send> JsonLinesPublisher<W> {
    /// Publisher writing to `out`. Per-cycle `outerLoopData` events are
    /// written only when `include_cycle_data` is set.
    pub fn new(out: W, include_cycle_data: bool) -> Self {
        Self {
            out: Mutex::new(out),
            include_cycle_data,
        }
    }
}

impl<W: Write + Send> Publisher for JsonLinesPublisher<W> {
    fn publish(&self, event: Event) {
        if !self.include_cycle_data && matches!(event, Event::OuterLoopData { .. }) {
            return;
        }
        let line = match serde_json::to_string(&event) {
            Ok(line) => line,
            Err(e) => {
                warn!("Failed to encode {} event: {e}", event.name());
                return;
            }
        };
        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(e) = writeln!(out, "{line}").and_then(|()| out.flush()) {
            warn!("Failed to write {} event: {e}", event.name());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recorder_filters_acks_by_command() {
        let p = RecordingPublisher::new();
        p.ack(1, AckCode::InProgress, "");
        p.ack(2, AckCode::NoPerm, "bad");
        p.ack(1, AckCode::Complete, "");
        assert_eq!(p.acks_for(1), vec![AckCode::InProgress, AckCode::Complete]);
        assert_eq!(p.acks_for(2), vec![AckCode::NoPerm]);
        assert_eq!(p.take().len(), 3);
        assert!(p.events().is_empty());
    }

    #[test]
    fn json_lines_are_camel_case() {
        let p = JsonLinesPublisher::new(Vec::new(), false);
        p.ack(7, AckCode::Failed, "nope");
        p.publish(Event::OuterLoopData {
            timestamp: 1.0,
            cycle: 1,
            execution_time: 0.001,
        });
        p.publish(Event::DetailedState {
            timestamp: 2.0,
            detailed_state: DetailedState::Parked,
        });
        let out = p.out.into_inner().unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);

        let ack: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(ack["event"], "commandAck");
        assert_eq!(ack["commandId"], 7);
        assert_eq!(ack["ackCode"], -302);

        let state: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(state["detailedState"], "Parked");
    }
}
