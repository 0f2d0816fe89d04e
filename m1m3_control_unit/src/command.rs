//! Commands accepted by the control unit.
//!
//! Every bus topic `MTM1M3_command_<name>` maps onto one [`Command`]
//! variant; payload fields are camelCase. A command is validated
//! structurally before it reaches the state machine (array lengths,
//! finite values, index ranges), so states only deal with commands that
//! make sense.
//!
//! ## Submodules
//! - [`codec`]: JSON line decoding
//! - [`controller`]: queue, acknowledgment and the worker loop

pub mod codec;
pub mod controller;

use std::path::PathBuf;

use m1m3_common::actuator::HardpointId;
use m1m3_common::consts::{BENDING_MODE_COUNT, MODBUS_DATA_MAX};
use m1m3_common::fault::PowerNetworks;
use m1m3_common::settings::PidParameters;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::force::components::{xyz_forces, z_forces};
use crate::force::ForceError;

pub use controller::CommandController;

/// Prefix of every command topic.
pub const TOPIC_PREFIX: &str = "MTM1M3_command_";

// ─── Payloads ───────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartPayload {
    /// Name of the settings profile to apply.
    pub settings_to_apply: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RaisePayload {
    /// Skip the final move to the hardpoint reference position.
    #[serde(default)]
    pub bypass_reference_position: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OffsetForcesPayload {
    pub x_forces: Vec<f64>,
    pub y_forces: Vec<f64>,
    pub z_forces: Vec<f64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MirrorForcePayload {
    #[serde(default)]
    pub x_force: f64,
    #[serde(default)]
    pub y_force: f64,
    #[serde(default)]
    pub z_force: f64,
    #[serde(default)]
    pub x_moment: f64,
    #[serde(default)]
    pub y_moment: f64,
    #[serde(default)]
    pub z_moment: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZForcesPayload {
    pub z_forces: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BendingModesPayload {
    pub coefficients: Vec<f64>,
}

/// Active optic and aberration corrections applied together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AosCorrectionPayload {
    pub active_optic_coefficients: Vec<f64>,
    pub aberration_coefficients: Vec<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PidPayload {
    /// PID `1..=6` (fx, fy, fz, mx, my, mz).
    pub pid: u8,
    pub timestep: f64,
    pub p: f64,
    pub i: f64,
    pub d: f64,
    pub n: f64,
}

impl PidPayload {
    pub const fn parameters(&self) -> PidParameters {
        PidParameters {
            timestep: self.timestep,
            p: self.p,
            i: self.i,
            d: self.d,
            n: self.n,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PidSelectPayload {
    pub pid: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HardpointStepsPayload {
    pub steps: [i32; 6],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HardpointPayload {
    /// Hardpoint number `1..=6`.
    pub hardpoint_actuator: u8,
}

impl HardpointPayload {
    pub fn hardpoint(&self) -> Result<HardpointId, CommandError> {
        HardpointId::new(self.hardpoint_actuator).ok_or(CommandError::HardpointOutOfRange(self.hardpoint_actuator))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranslatePayload {
    #[serde(default)]
    pub x_translation: f64,
    #[serde(default)]
    pub y_translation: f64,
    #[serde(default)]
    pub z_translation: f64,
    #[serde(default)]
    pub x_rotation: f64,
    #[serde(default)]
    pub y_rotation: f64,
    #[serde(default)]
    pub z_rotation: f64,
}

impl TranslatePayload {
    pub const fn to_array(&self) -> [f64; 6] {
        [
            self.x_translation,
            self.y_translation,
            self.z_translation,
            self.x_rotation,
            self.y_rotation,
            self.z_rotation,
        ]
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionPayload {
    #[serde(default)]
    pub x_position: f64,
    #[serde(default)]
    pub y_position: f64,
    #[serde(default)]
    pub z_position: f64,
    #[serde(default)]
    pub x_rotation: f64,
    #[serde(default)]
    pub y_rotation: f64,
    #[serde(default)]
    pub z_rotation: f64,
}

impl PositionPayload {
    pub const fn to_array(&self) -> [f64; 6] {
        [
            self.x_position,
            self.y_position,
            self.z_position,
            self.x_rotation,
            self.y_rotation,
            self.z_rotation,
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PowerPayload {
    /// Networks to switch, e.g. `"MAIN_A | AUX_B"`.
    pub networks: PowerNetworks,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgramIlcPayload {
    /// ILC bus address.
    pub actuator_id: u16,
    pub file_path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModbusPayload {
    /// ILC bus address.
    pub actuator_id: u16,
    pub function_code: u8,
    #[serde(default)]
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TmaAzimuthPayload {
    /// Telescope azimuth [deg].
    pub azimuth_angle: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TmaElevationPayload {
    /// Telescope elevation [deg].
    pub elevation_angle: f64,
}

// ─── Command ────────────────────────────────────────────────────────

/// Every operation the control unit performs.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    // Lifecycle
    Boot,
    Start(StartPayload),
    Enable,
    Disable,
    Standby,
    Shutdown,
    EnterEngineering,
    ExitEngineering,
    /// Synthetic outer-loop cycle. Never acknowledged.
    Update,
    Panic,

    // Raise / lower
    RaiseM1M3(RaisePayload),
    AbortRaiseM1M3,
    LowerM1M3,

    // Forces
    ApplyOffsetForces(OffsetForcesPayload),
    ApplyOffsetForcesByMirrorForce(MirrorForcePayload),
    ClearOffsetForces,
    ApplyActiveOpticForces(ZForcesPayload),
    ApplyActiveOpticForcesByBendingModes(BendingModesPayload),
    ClearActiveOpticForces,
    ApplyAberrationForces(ZForcesPayload),
    ApplyAberrationForcesByBendingModes(BendingModesPayload),
    ClearAberrationForces,
    ApplyAosCorrection(AosCorrectionPayload),
    EnableHardpointCorrections,
    DisableHardpointCorrections,
    UpdatePid(PidPayload),
    ResetPid(PidSelectPayload),

    // Hardpoints
    MoveHardpointActuators(HardpointStepsPayload),
    EnableHardpointChase(HardpointPayload),
    DisableHardpointChase(HardpointPayload),
    StopHardpointMotion,
    TestHardpoint(HardpointPayload),
    TranslateM1M3(TranslatePayload),
    PositionM1M3(PositionPayload),

    // Cell I/O
    TurnAirOn,
    TurnAirOff,
    TurnLightsOn,
    TurnLightsOff,
    TurnPowerOn(PowerPayload),
    TurnPowerOff(PowerPayload),

    // ILC maintenance
    ProgramIlc(ProgramIlcPayload),
    ModbusTransmit(ModbusPayload),

    // Telescope samples
    StoreTmaAzimuthSample(TmaAzimuthPayload),
    StoreTmaElevationSample(TmaElevationPayload),
}

impl Command {
    /// Topic suffix, also used in acknowledgments and rejection messages.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Boot => "boot",
            Self::Start(_) => "start",
            Self::Enable => "enable",
            Self::Disable => "disable",
            Self::Standby => "standby",
            Self::Shutdown => "shutdown",
            Self::EnterEngineering => "enterEngineering",
            Self::ExitEngineering => "exitEngineering",
            Self::Update => "update",
            Self::Panic => "panic",
            Self::RaiseM1M3(_) => "raiseM1M3",
            Self::AbortRaiseM1M3 => "abortRaiseM1M3",
            Self::LowerM1M3 => "lowerM1M3",
            Self::ApplyOffsetForces(_) => "applyOffsetForces",
            Self::ApplyOffsetForcesByMirrorForce(_) => "applyOffsetForcesByMirrorForce",
            Self::ClearOffsetForces => "clearOffsetForces",
            Self::ApplyActiveOpticForces(_) => "applyActiveOpticForces",
            Self::ApplyActiveOpticForcesByBendingModes(_) => "applyActiveOpticForcesByBendingModes",
            Self::ClearActiveOpticForces => "clearActiveOpticForces",
            Self::ApplyAberrationForces(_) => "applyAberrationForces",
            Self::ApplyAberrationForcesByBendingModes(_) => "applyAberrationForcesByBendingModes",
            Self::ClearAberrationForces => "clearAberrationForces",
            Self::ApplyAosCorrection(_) => "applyAOSCorrection",
            Self::EnableHardpointCorrections => "enableHardpointCorrections",
            Self::DisableHardpointCorrections => "disableHardpointCorrections",
            Self::UpdatePid(_) => "updatePID",
            Self::ResetPid(_) => "resetPID",
            Self::MoveHardpointActuators(_) => "moveHardpointActuators",
            Self::EnableHardpointChase(_) => "enableHardpointChase",
            Self::DisableHardpointChase(_) => "disableHardpointChase",
            Self::StopHardpointMotion => "stopHardpointMotion",
            Self::TestHardpoint(_) => "testHardpoint",
            Self::TranslateM1M3(_) => "translateM1M3",
            Self::PositionM1M3(_) => "positionM1M3",
            Self::TurnAirOn => "turnAirOn",
            Self::TurnAirOff => "turnAirOff",
            Self::TurnLightsOn => "turnLightsOn",
            Self::TurnLightsOff => "turnLightsOff",
            Self::TurnPowerOn(_) => "turnPowerOn",
            Self::TurnPowerOff(_) => "turnPowerOff",
            Self::ProgramIlc(_) => "programILC",
            Self::ModbusTransmit(_) => "modbusTransmit",
            Self::StoreTmaAzimuthSample(_) => "storeTMAAzimuthSample",
            Self::StoreTmaElevationSample(_) => "storeTMAElevationSample",
        }
    }

    /// Bus topic, `MTM1M3_command_<name>`.
    pub fn topic(&self) -> String {
        format!("{TOPIC_PREFIX}{}", self.name())
    }

    /// Structural checks that do not depend on the current state.
    pub fn validate(&self) -> Result<(), CommandError> {
        match self {
            Self::Start(p) if p.settings_to_apply.trim().is_empty() => {
                Err(CommandError::InvalidField {
                    field: "settingsToApply",
                    reason: "must not be empty".to_string(),
                })
            }
            Self::ApplyOffsetForces(p) => {
                xyz_forces(&p.x_forces, &p.y_forces, &p.z_forces)?;
                Ok(())
            }
            Self::ApplyOffsetForcesByMirrorForce(p) => finite(
                "mirrorForce",
                &[p.x_force, p.y_force, p.z_force, p.x_moment, p.y_moment, p.z_moment],
            ),
            Self::ApplyActiveOpticForces(p) | Self::ApplyAberrationForces(p) => {
                z_forces(&p.z_forces)?;
                Ok(())
            }
            Self::ApplyActiveOpticForcesByBendingModes(p) | Self::ApplyAberrationForcesByBendingModes(p) => {
                bending_modes(&p.coefficients)
            }
            Self::ApplyAosCorrection(p) => {
                bending_modes(&p.active_optic_coefficients)?;
                bending_modes(&p.aberration_coefficients)
            }
            Self::UpdatePid(p) => {
                pid_index(p.pid)?;
                p.parameters()
                    .check()
                    .map_err(|reason| CommandError::InvalidField { field: "pid", reason })
            }
            Self::ResetPid(p) => pid_index(p.pid),
            Self::EnableHardpointChase(p) | Self::DisableHardpointChase(p) | Self::TestHardpoint(p) => {
                p.hardpoint().map(|_| ())
            }
            Self::TranslateM1M3(p) => finite("translation", &p.to_array()),
            Self::PositionM1M3(p) => finite("position", &p.to_array()),
            Self::TurnPowerOn(p) | Self::TurnPowerOff(p) if p.networks.is_empty() => {
                Err(CommandError::InvalidField {
                    field: "networks",
                    reason: "no power network selected".to_string(),
                })
            }
            Self::ProgramIlc(p) if p.file_path.as_os_str().is_empty() => Err(CommandError::InvalidField {
                field: "filePath",
                reason: "must not be empty".to_string(),
            }),
            Self::ModbusTransmit(p) if p.data.len() > MODBUS_DATA_MAX => Err(CommandError::InvalidField {
                field: "data",
                reason: format!("{} bytes exceeds {MODBUS_DATA_MAX}", p.data.len()),
            }),
            Self::StoreTmaAzimuthSample(p) => finite("azimuthAngle", &[p.azimuth_angle]),
            Self::StoreTmaElevationSample(p) => finite("elevationAngle", &[p.elevation_angle]),
            _ => Ok(()),
        }
    }
}

fn finite(field: &'static str, values: &[f64]) -> Result<(), CommandError> {
    match values.iter().position(|v| !v.is_finite()) {
        Some(i) => Err(CommandError::InvalidField {
            field,
            reason: format!("value {i} is not finite"),
        }),
        None => Ok(()),
    }
}

fn bending_modes(coefficients: &[f64]) -> Result<(), CommandError> {
    if coefficients.len() != BENDING_MODE_COUNT {
        return Err(ForceError::WrongLength {
            expected: BENDING_MODE_COUNT,
            actual: coefficients.len(),
        }
        .into());
    }
    finite("coefficients", coefficients)
}

fn pid_index(pid: u8) -> Result<(), CommandError> {
    if (1..=6).contains(&pid) {
        Ok(())
    } else {
        Err(ForceError::UnknownPid(pid).into())
    }
}

/// A command paired with the identifier its acknowledgments carry.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandEnvelope {
    pub id: i32,
    pub command: Command,
}

impl CommandEnvelope {
    pub const fn new(id: i32, command: Command) -> Self {
        Self { id, command }
    }

    /// The synthetic cycle command.
    pub const fn update() -> Self {
        Self::new(0, Command::Update)
    }
}

/// Structural validation failure. Acknowledged NOPERM.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CommandError {
    #[error("{field}: {reason}")]
    InvalidField { field: &'static str, reason: String },
    #[error("hardpoint actuator {0} out of range [1, 6]")]
    HardpointOutOfRange(u8),
    #[error(transparent)]
    Force(#[from] ForceError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use m1m3_common::consts::FA_COUNT;

    #[test]
    fn topics_use_the_command_prefix() {
        assert_eq!(Command::RaiseM1M3(RaisePayload::default()).topic(), "MTM1M3_command_raiseM1M3");
        assert_eq!(Command::ApplyAosCorrection(AosCorrectionPayload {
            active_optic_coefficients: vec![],
            aberration_coefficients: vec![],
        })
        .name(), "applyAOSCorrection");
    }

    #[test]
    fn offset_arrays_must_be_complete() {
        let short = Command::ApplyOffsetForces(OffsetForcesPayload {
            x_forces: vec![0.0; FA_COUNT],
            y_forces: vec![0.0; FA_COUNT],
            z_forces: vec![0.0; 12],
        });
        assert_eq!(
            short.validate(),
            Err(CommandError::Force(ForceError::WrongLength {
                expected: FA_COUNT,
                actual: 12
            }))
        );
    }

    #[test]
    fn hardpoint_index_is_checked() {
        let bad = Command::TestHardpoint(HardpointPayload { hardpoint_actuator: 7 });
        assert_eq!(bad.validate(), Err(CommandError::HardpointOutOfRange(7)));
        let good = Command::EnableHardpointChase(HardpointPayload { hardpoint_actuator: 6 });
        assert!(good.validate().is_ok());
    }

    #[test]
    fn bending_mode_count_and_pid_range() {
        let c = Command::ApplyActiveOpticForcesByBendingModes(BendingModesPayload {
            coefficients: vec![0.0; 21],
        });
        assert!(matches!(c.validate(), Err(CommandError::Force(ForceError::WrongLength { .. }))));
        let c = Command::ResetPid(PidSelectPayload { pid: 0 });
        assert_eq!(c.validate(), Err(CommandError::Force(ForceError::UnknownPid(0))));
    }

    #[test]
    fn non_finite_samples_are_rejected() {
        let c = Command::StoreTmaElevationSample(TmaElevationPayload {
            elevation_angle: f64::NAN,
        });
        assert!(matches!(c.validate(), Err(CommandError::InvalidField { field: "elevationAngle", .. })));
        assert!(Command::Boot.validate().is_ok());
    }
}
