//! Fault codes and status bitflags.
//!
//! `FaultCode` identifies the condition latched by the safety controller.
//! Warning and output sets use `bitflags`; flags marked CRITICAL are the ones
//! that can escalate to a fault when the matching safety setting is enabled.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

/// Condition latched by the safety controller.
///
/// The numeric values are the codes published in the error-code event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u32)]
pub enum FaultCode {
    /// Operator pressed panic.
    UserPanic = 0x0000_0001,
    /// Cylinder setpoint clipped to safety limit.
    ForceControllerSafetyLimit = 0x0600_0001,
    /// Net X moment out of range.
    ForceControllerXMomentLimit = 0x0600_0002,
    /// Net Y moment out of range.
    ForceControllerYMomentLimit = 0x0600_0003,
    /// Net Z moment out of range.
    ForceControllerZMomentLimit = 0x0600_0004,
    /// Actuator diverges from its near neighbors.
    ForceControllerNearNeighborCheck = 0x0600_0005,
    /// Total applied force magnitude too large.
    ForceControllerMagnitudeLimit = 0x0600_0006,
    /// Actuator group diverges from the global average.
    ForceControllerFarNeighborCheck = 0x0600_0007,
    /// Elevation component clipped.
    ForceControllerElevationForceClipping = 0x0600_0008,
    /// Azimuth component clipped.
    ForceControllerAzimuthForceClipping = 0x0600_0009,
    /// Thermal component clipped.
    ForceControllerThermalForceClipping = 0x0600_000A,
    /// Balance component clipped.
    ForceControllerBalanceForceClipping = 0x0600_000B,
    /// Dynamic component clipped.
    ForceControllerDynamicForceClipping = 0x0600_000C,
    /// Active optic component clipped.
    ForceControllerActiveOpticForceClipping = 0x0600_000D,
    /// Static component clipped.
    ForceControllerStaticForceClipping = 0x0600_000E,
    /// Aberration component clipped.
    ForceControllerAberrationForceClipping = 0x0600_000F,
    /// Offset component clipped.
    ForceControllerOffsetForceClipping = 0x0600_0010,
    /// Raise did not finish in time.
    RaiseOperationTimeout = 0x0700_0001,
    /// Lower did not finish in time.
    LowerOperationTimeout = 0x0700_0002,
    /// Too many ILC communication timeouts in the window.
    IlcCommunicationTimeout = 0x0800_0001,
    /// Measured force diverges from the setpoint too often.
    ForceActuatorFollowingError = 0x0800_0002,
}

impl FaultCode {
    /// Raw code.
    #[inline]
    pub const fn code(self) -> u32 {
        self as u32
    }
}

impl std::fmt::Display for FaultCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?} (0x{:08X})", self, self.code())
    }
}

bitflags! {
    /// Mirror-level force setpoint warnings.
    ///
    /// Per-actuator warnings are aggregated into the `ANY_*` flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct SetpointWarning: u32 {
        /// At least one cylinder setpoint clipped. **CRITICAL**.
        const ANY_SAFETY_LIMIT     = 0x0001;
        /// Net X moment out of range. **CRITICAL**.
        const X_MOMENT             = 0x0002;
        /// Net Y moment out of range. **CRITICAL**.
        const Y_MOMENT             = 0x0004;
        /// Net Z moment out of range. **CRITICAL**.
        const Z_MOMENT             = 0x0008;
        /// At least one near-neighbor violation.
        const ANY_NEAR_NEIGHBOR    = 0x0010;
        /// Total force magnitude above the mirror weight limit. **CRITICAL**.
        const MAGNITUDE            = 0x0020;
        /// At least one far-neighbor violation.
        const ANY_FAR_NEIGHBOR     = 0x0040;
        /// At least one component clipped its forces.
        const ANY_COMPONENT_CLIP   = 0x0080;
        /// At least one offset force clipped at application.
        const ANY_OFFSET_CLIP      = 0x0100;
    }
}

impl SetpointWarning {
    /// Mask of flags that describe a physically unsafe setpoint.
    pub const CRITICAL_MASK: Self = Self::from_bits_truncate(
        Self::ANY_SAFETY_LIMIT.bits()
            | Self::X_MOMENT.bits()
            | Self::Y_MOMENT.bits()
            | Self::Z_MOMENT.bits()
            | Self::MAGNITUDE.bits(),
    );

    /// Returns true if any CRITICAL flag is set.
    #[inline]
    pub const fn has_critical(&self) -> bool {
        self.intersects(Self::CRITICAL_MASK)
    }
}

bitflags! {
    /// Cell power networks.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct PowerNetworks: u8 {
        /// Main power network A.
        const MAIN_A = 0x01;
        /// Main power network B.
        const MAIN_B = 0x02;
        /// Main power network C.
        const MAIN_C = 0x04;
        /// Main power network D.
        const MAIN_D = 0x08;
        /// Auxiliary power network A.
        const AUX_A  = 0x10;
        /// Auxiliary power network B.
        const AUX_B  = 0x20;
        /// Auxiliary power network C.
        const AUX_C  = 0x40;
        /// Auxiliary power network D.
        const AUX_D  = 0x80;
    }
}

impl PowerNetworks {
    /// All main networks.
    pub const MAIN: Self = Self::from_bits_truncate(0x0F);
    /// All auxiliary networks.
    pub const AUX: Self = Self::from_bits_truncate(0xF0);
}

bitflags! {
    /// Cell digital outputs other than power.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct CellOutputs: u8 {
        /// Air supply valve open.
        const AIR_SUPPLY  = 0x01;
        /// Cell lights on.
        const CELL_LIGHTS = 0x02;
        /// Heartbeat toggle.
        const HEARTBEAT   = 0x04;
    }
}
