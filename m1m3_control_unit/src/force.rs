//! Force computation: components, distribution, checks and the controller
//! that composes them.

pub mod checks;
pub mod component;
pub mod components;
pub mod controller;
pub mod distribution;
pub mod pid;

use m1m3_common::actuator::{ActuatorArray, ActuatorId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use component::{ComponentKind, ComponentState, ForceComponent};
pub use controller::ForceController;

/// Per-actuator force vectors [N].
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AxisForces {
    pub x: ActuatorArray<f64>,
    pub y: ActuatorArray<f64>,
    pub z: ActuatorArray<f64>,
}

impl AxisForces {
    /// All zeros.
    pub const fn zeros() -> Self {
        Self {
            x: ActuatorArray::zeros(),
            y: ActuatorArray::zeros(),
            z: ActuatorArray::zeros(),
        }
    }

    /// Z forces only.
    pub const fn from_z(z: ActuatorArray<f64>) -> Self {
        Self {
            x: ActuatorArray::zeros(),
            y: ActuatorArray::zeros(),
            z,
        }
    }

    /// Largest absolute value over every axis.
    pub fn max_abs(&self) -> f64 {
        self.x.max_abs().max(self.y.max_abs()).max(self.z.max_abs())
    }

    /// `self += other * scale`.
    pub fn add_scaled(&mut self, other: &Self, scale: f64) {
        for id in ActuatorId::all() {
            self.x[id] += other.x[id] * scale;
            self.y[id] += other.y[id] * scale;
            self.z[id] += other.z[id] * scale;
        }
    }
}

/// Net forces and moments on the mirror.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MirrorForces {
    /// Force along X [N].
    pub fx: f64,
    /// Force along Y [N].
    pub fy: f64,
    /// Force along Z [N].
    pub fz: f64,
    /// Moment about X [N·m].
    pub mx: f64,
    /// Moment about Y [N·m].
    pub my: f64,
    /// Moment about Z [N·m].
    pub mz: f64,
}

impl MirrorForces {
    /// As `[fx, fy, fz, mx, my, mz]`.
    pub const fn to_array(self) -> [f64; 6] {
        [self.fx, self.fy, self.fz, self.mx, self.my, self.mz]
    }

    /// From `[fx, fy, fz, mx, my, mz]`.
    pub const fn from_array(v: [f64; 6]) -> Self {
        Self {
            fx: v[0],
            fy: v[1],
            fz: v[2],
            mx: v[3],
            my: v[4],
            mz: v[5],
        }
    }
}

/// Force command failure.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ForceError {
    /// Array with the wrong number of actuators.
    #[error("expected {expected} forces, got {actual}")]
    WrongLength {
        /// Required length.
        expected: usize,
        /// Supplied length.
        actual: usize,
    },
    /// Non-finite force value.
    #[error("force value at index {0} is not finite")]
    NotFinite(usize),
    /// PID index outside `1..=6`.
    #[error("PID {0} out of range [1, 6]")]
    UnknownPid(u8),
}

impl From<m1m3_common::actuator::LengthError> for ForceError {
    fn from(e: m1m3_common::actuator::LengthError) -> Self {
        Self::WrongLength {
            expected: e.expected,
            actual: e.actual,
        }
    }
}
