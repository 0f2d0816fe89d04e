//! Lifecycle state and acknowledgment enums.
//!
//! `DetailedState` is the state the control unit actually runs in;
//! `SummaryState` is the coarse state published to supervisors. All enums
//! are `#[repr]` so they map directly onto bus integer fields.

use serde::{Deserialize, Serialize};

// ─── Detailed State ─────────────────────────────────────────────────

/// Detailed lifecycle state of the mirror support system.
///
/// Only one `DetailedState` is current at any time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[repr(u8)]
pub enum DetailedState {
    /// Process up, nothing initialized.
    #[default]
    Offline = 0,
    /// Waiting for a settings profile.
    Standby = 1,
    /// Settings applied, ILCs disabled.
    Disabled = 2,
    /// ILCs enabled, mirror resting on static supports.
    Parked = 3,
    /// Automatic raise in progress.
    Raising = 4,
    /// Mirror fully supported by the force actuators.
    Active = 5,
    /// Automatic lower in progress.
    Lowering = 6,
    /// Parked, engineering commands accepted.
    ParkedEngineering = 7,
    /// Raising from engineering.
    RaisingEngineering = 8,
    /// Active, engineering commands accepted.
    ActiveEngineering = 9,
    /// Lowering into engineering.
    LoweringEngineering = 10,
    /// Faulted, forces zeroed.
    Fault = 11,
    /// Faulted, forces being removed.
    LoweringFault = 12,
}

impl DetailedState {
    /// Convert from raw `u8`. Returns `None` for invalid values.
    #[inline]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Offline),
            1 => Some(Self::Standby),
            2 => Some(Self::Disabled),
            3 => Some(Self::Parked),
            4 => Some(Self::Raising),
            5 => Some(Self::Active),
            6 => Some(Self::Lowering),
            7 => Some(Self::ParkedEngineering),
            8 => Some(Self::RaisingEngineering),
            9 => Some(Self::ActiveEngineering),
            10 => Some(Self::LoweringEngineering),
            11 => Some(Self::Fault),
            12 => Some(Self::LoweringFault),
            _ => None,
        }
    }

    /// Coarse state published to supervisors.
    pub const fn summary(self) -> SummaryState {
        match self {
            Self::Offline => SummaryState::Offline,
            Self::Standby => SummaryState::Standby,
            Self::Disabled => SummaryState::Disabled,
            Self::Parked
            | Self::Raising
            | Self::Active
            | Self::Lowering
            | Self::ParkedEngineering
            | Self::RaisingEngineering
            | Self::ActiveEngineering
            | Self::LoweringEngineering => SummaryState::Enabled,
            Self::Fault | Self::LoweringFault => SummaryState::Fault,
        }
    }

    /// ILCs are enabled and forces are being commanded.
    #[inline]
    pub const fn is_enabled(self) -> bool {
        matches!(self.summary(), SummaryState::Enabled)
    }

    /// Engineering variant of an enabled state.
    #[inline]
    pub const fn is_engineering(self) -> bool {
        matches!(
            self,
            Self::ParkedEngineering
                | Self::RaisingEngineering
                | Self::ActiveEngineering
                | Self::LoweringEngineering
        )
    }

    /// Human-readable state name used in rejection messages.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Offline => "Offline",
            Self::Standby => "Standby",
            Self::Disabled => "Disabled",
            Self::Parked => "Parked",
            Self::Raising => "Raising",
            Self::Active => "Active",
            Self::Lowering => "Lowering",
            Self::ParkedEngineering => "ParkedEngineering",
            Self::RaisingEngineering => "RaisingEngineering",
            Self::ActiveEngineering => "ActiveEngineering",
            Self::LoweringEngineering => "LoweringEngineering",
            Self::Fault => "Fault",
            Self::LoweringFault => "LoweringFault",
        }
    }
}

impl std::fmt::Display for DetailedState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// ─── Summary State ──────────────────────────────────────────────────

/// Coarse lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[repr(u8)]
pub enum SummaryState {
    /// Not running.
    #[default]
    Offline = 0,
    /// Idle, no settings.
    Standby = 1,
    /// Settings applied.
    Disabled = 2,
    /// Forces commanded.
    Enabled = 3,
    /// Faulted.
    Fault = 4,
}

impl SummaryState {
    /// Convert from raw `u8`. Returns `None` for invalid values.
    #[inline]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Offline),
            1 => Some(Self::Standby),
            2 => Some(Self::Disabled),
            3 => Some(Self::Enabled),
            4 => Some(Self::Fault),
            _ => None,
        }
    }
}

// ─── Acknowledgment ─────────────────────────────────────────────────

/// Command acknowledgment code carried on the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i32)]
pub enum AckCode {
    /// Command accepted, execution started.
    InProgress = 301,
    /// Command executed.
    Complete = 303,
    /// Command failed (including "not valid in this state").
    Failed = -302,
    /// Command rejected before execution (invalid parameters).
    NoPerm = -300,
    /// Command dropped before execution.
    Aborted = -303,
}

impl AckCode {
    /// Convert from raw bus code.
    #[inline]
    pub const fn from_i32(value: i32) -> Option<Self> {
        match value {
            301 => Some(Self::InProgress),
            303 => Some(Self::Complete),
            -302 => Some(Self::Failed),
            -300 => Some(Self::NoPerm),
            -303 => Some(Self::Aborted),
            _ => None,
        }
    }

    /// Raw bus code.
    #[inline]
    pub const fn code(self) -> i32 {
        self as i32
    }

    /// No further acknowledgment follows this one.
    #[inline]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::InProgress)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detailed_state_round_trips_u8() {
        for v in 0..=12u8 {
            let s = DetailedState::from_u8(v).unwrap();
            assert_eq!(s as u8, v);
        }
        assert!(DetailedState::from_u8(13).is_none());
    }

    #[test]
    fn summary_mapping() {
        assert_eq!(DetailedState::Parked.summary(), SummaryState::Enabled);
        assert_eq!(
            DetailedState::LoweringEngineering.summary(),
            SummaryState::Enabled
        );
        assert_eq!(DetailedState::LoweringFault.summary(), SummaryState::Fault);
        assert_eq!(DetailedState::Disabled.summary(), SummaryState::Disabled);
        assert!(DetailedState::ActiveEngineering.is_engineering());
        assert!(!DetailedState::Active.is_engineering());
    }

    #[test]
    fn ack_codes_match_bus_values() {
        assert_eq!(AckCode::InProgress.code(), 301);
        assert_eq!(AckCode::Complete.code(), 303);
        assert_eq!(AckCode::Failed.code(), -302);
        assert_eq!(AckCode::NoPerm.code(), -300);
        assert_eq!(AckCode::Aborted.code(), -303);
        assert_eq!(AckCode::from_i32(-300), Some(AckCode::NoPerm));
        assert!(!AckCode::InProgress.is_terminal());
        assert!(AckCode::Failed.is_terminal());
    }
}
