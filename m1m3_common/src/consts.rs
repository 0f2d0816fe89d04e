//! System-wide constants for the M1M3 workspace.
//!
//! Single source of truth for actuator counts, cycle timing and default
//! paths. Imported by all crates.

use static_assertions::const_assert;

/// Number of force actuators (every actuator has a Z axis).
pub const FA_COUNT: usize = 156;

/// Number of force actuators with an X-oriented secondary cylinder.
pub const FA_X_COUNT: usize = 12;

/// Number of force actuators with a Y-oriented secondary cylinder.
pub const FA_Y_COUNT: usize = 100;

/// Number of force actuators with a secondary cylinder.
pub const FA_S_COUNT: usize = FA_X_COUNT + FA_Y_COUNT;

/// Number of hardpoint actuators.
pub const HP_COUNT: usize = 6;

/// Number of bending modes accepted by active optic and aberration commands.
pub const BENDING_MODE_COUNT: usize = 22;

/// Lowest ILC identifier of a force actuator.
pub const FA_ID_MIN: u16 = 101;

/// Highest ILC identifier of a force actuator.
pub const FA_ID_MAX: u16 = 443;

/// Default outer-loop cycle time in microseconds (50 Hz).
pub const CYCLE_TIME_US: u64 = 20_000;

/// Minimum accepted outer-loop cycle time in microseconds.
pub const CYCLE_TIME_US_MIN: u64 = 1_000;

/// Maximum accepted outer-loop cycle time in microseconds.
pub const CYCLE_TIME_US_MAX: u64 = 1_000_000;

/// Maximum length of any safety sliding window [cycles].
pub const SAFETY_WINDOW_MAX: usize = 128;

/// Maximum Modbus payload carried by a ModbusTransmit command.
pub const MODBUS_DATA_MAX: usize = 252;

/// Name of the built-in settings profile.
pub const DEFAULT_SETTINGS_PROFILE: &str = "Default";

/// Default configuration directory path.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/m1m3/config";

const_assert!(FA_S_COUNT <= FA_COUNT);
const_assert!(CYCLE_TIME_US >= CYCLE_TIME_US_MIN && CYCLE_TIME_US <= CYCLE_TIME_US_MAX);
