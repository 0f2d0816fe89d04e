//! M1M3 Common Library
//!
//! Shared constants, identifiers, settings and configuration loading used by
//! every crate of the M1M3 mirror support workspace.
//!
//! # Module Structure
//!
//! - [`consts`] - Actuator counts, cycle timing and default paths
//! - [`config`] - Configuration loading traits and types
//! - [`actuator`] - `ActuatorId` / `HardpointId` and per-actuator containers
//! - [`state`] - Lifecycle states and acknowledgment codes
//! - [`fault`] - Fault codes and status bitflags
//! - [`settings`] - Settings profiles selected at Start
//! - [`geometry`] - Mirror geometry and bending modes
//! - [`prelude`] - Common re-exports for convenience
//!
//! # Usage
//!
//! ```rust
//! use m1m3_common::prelude::*;
//!
//! let id = ActuatorId::new(12).unwrap();
//! let mut forces = ActuatorArray::zeros();
//! forces[id] = 25.0;
//! assert_eq!(forces.sum(), 25.0);
//! ```

pub mod actuator;
pub mod config;
pub mod consts;
pub mod fault;
pub mod geometry;
pub mod prelude;
pub mod settings;
pub mod state;
