//! Prelude module for common re-exports.
//!
//! Consumers can do `use m1m3_common::prelude::*;` and get the most
//! important types without listing individual paths.

use std::time::Duration;

// ─── Logging ────────────────────────────────────────────────────────
pub use crate::config::LogLevel;

// ─── Configuration ──────────────────────────────────────────────────
pub use crate::config::{ConfigError, ConfigLoader, SharedConfig, Validate};
pub use crate::settings::{Limits, Settings};

// ─── System Constants ───────────────────────────────────────────────
pub use crate::consts::{BENDING_MODE_COUNT, CYCLE_TIME_US, FA_COUNT, HP_COUNT};

// ─── Identifiers & Containers ───────────────────────────────────────
pub use crate::actuator::{ActuatorArray, ActuatorId, HardpointId, Orientation};
pub use crate::geometry::MirrorGeometry;

// ─── State ──────────────────────────────────────────────────────────
pub use crate::fault::{FaultCode, SetpointWarning};
pub use crate::state::{AckCode, DetailedState, SummaryState};

/// Default outer-loop cycle time as Duration.
pub const DEFAULT_CYCLE_TIME: Duration = Duration::from_micros(CYCLE_TIME_US);
