//! JSON line decoding.
//!
//! One message per line:
//!
//! ```json
//! {"topic": "MTM1M3_command_raiseM1M3", "commandId": 12, "bypassReferencePosition": false}
//! ```
//!
//! `topic` and `commandId` are envelope fields; everything else is the
//! payload of the command named by the topic.

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use thiserror::Error;

use super::{Command, CommandEnvelope, TOPIC_PREFIX};

/// A message that never became a command.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DecodeError {
    /// Not a JSON object.
    #[error("malformed message: {0}")]
    Malformed(String),
    /// No `topic`, or not a command topic.
    #[error("unknown topic '{0}'")]
    UnknownTopic(String),
    /// No usable `commandId`.
    #[error("missing or invalid commandId")]
    MissingId,
    /// Payload does not match the topic's schema.
    #[error("invalid {topic} payload: {reason}")]
    Payload {
        /// Command id, so the failure can be acknowledged.
        command_id: i32,
        topic: String,
        reason: String,
    },
}

impl DecodeError {
    /// Command id recovered from the message, if any.
    pub const fn command_id(&self) -> Option<i32> {
        match self {
            Self::Payload { command_id, .. } => Some(*command_id),
            _ => None,
        }
    }
}

/// Decode one JSON line.
pub fn decode(line: &str) -> Result<CommandEnvelope, DecodeError> {
    let value: Value = serde_json::from_str(line).map_err(|e| DecodeError::Malformed(e.to_string()))?;
    let Value::Object(mut fields) = value else {
        return Err(DecodeError::Malformed("expected a JSON object".to_string()));
    };

    let topic = match fields.remove("topic") {
        Some(Value::String(topic)) => topic,
        _ => return Err(DecodeError::UnknownTopic(String::new())),
    };
    let id = fields
        .remove("commandId")
        .and_then(|v| v.as_i64())
        .and_then(|v| i32::try_from(v).ok())
        .ok_or(DecodeError::MissingId)?;
    let Some(name) = topic.strip_prefix(TOPIC_PREFIX) else {
        return Err(DecodeError::UnknownTopic(topic));
    };

    let command = command(name, fields).map_err(|e| match e {
        PayloadError::Unknown => DecodeError::UnknownTopic(topic.clone()),
        PayloadError::Invalid(reason) => DecodeError::Payload {
            command_id: id,
            topic: topic.clone(),
            reason,
        },
    })?;
    Ok(CommandEnvelope::new(id, command))
}

enum PayloadError {
    Unknown,
    Invalid(String),
}

fn payload<T: DeserializeOwned>(fields: Map<String, Value>) -> Result<T, PayloadError> {
    serde_json::from_value(Value::Object(fields)).map_err(|e| PayloadError::Invalid(e.to_string()))
}

fn command(name: &str, fields: Map<String, Value>) -> Result<Command, PayloadError> {
    use Command::*;

    let command = match name {
        "boot" => Boot,
        "start" => Start(payload(fields)?),
        "enable" => Enable,
        "disable" => Disable,
        "standby" => Standby,
        "shutdown" => Shutdown,
        "enterEngineering" => EnterEngineering,
        "exitEngineering" => ExitEngineering,
        "panic" => Panic,
        "raiseM1M3" => RaiseM1M3(payload(fields)?),
        "abortRaiseM1M3" => AbortRaiseM1M3,
        "lowerM1M3" => LowerM1M3,
        "applyOffsetForces" => ApplyOffsetForces(payload(fields)?),
        "applyOffsetForcesByMirrorForce" => ApplyOffsetForcesByMirrorForce(payload(fields)?),
        "clearOffsetForces" => ClearOffsetForces,
        "applyActiveOpticForces" => ApplyActiveOpticForces(payload(fields)?),
        "applyActiveOpticForcesByBendingModes" => ApplyActiveOpticForcesByBendingModes(payload(fields)?),
        "clearActiveOpticForces" => ClearActiveOpticForces,
        "applyAberrationForces" => ApplyAberrationForces(payload(fields)?),
        "applyAberrationForcesByBendingModes" => ApplyAberrationForcesByBendingModes(payload(fields)?),
        "clearAberrationForces" => ClearAberrationForces,
        "applyAOSCorrection" => ApplyAosCorrection(payload(fields)?),
        "enableHardpointCorrections" => EnableHardpointCorrections,
        "disableHardpointCorrections" => DisableHardpointCorrections,
        "updatePID" => UpdatePid(payload(fields)?),
        "resetPID" => ResetPid(payload(fields)?),
        "moveHardpointActuators" => MoveHardpointActuators(payload(fields)?),
        "enableHardpointChase" => EnableHardpointChase(payload(fields)?),
        "disableHardpointChase" => DisableHardpointChase(payload(fields)?),
        "stopHardpointMotion" => StopHardpointMotion,
        "testHardpoint" => TestHardpoint(payload(fields)?),
        "translateM1M3" => TranslateM1M3(payload(fields)?),
        "positionM1M3" => PositionM1M3(payload(fields)?),
        "turnAirOn" => TurnAirOn,
        "turnAirOff" => TurnAirOff,
        "turnLightsOn" => TurnLightsOn,
        "turnLightsOff" => TurnLightsOff,
        "turnPowerOn" => TurnPowerOn(payload(fields)?),
        "turnPowerOff" => TurnPowerOff(payload(fields)?),
        "programILC" => ProgramIlc(payload(fields)?),
        "modbusTransmit" => ModbusTransmit(payload(fields)?),
        "storeTMAAzimuthSample" => StoreTmaAzimuthSample(payload(fields)?),
        "storeTMAElevationSample" => StoreTmaElevationSample(payload(fields)?),
        // `update` is synthetic and never arrives from the bus.
        _ => return Err(PayloadError::Unknown),
    };
    Ok(command)
}
