//! Mirror force distribution.
//!
//! Maps a net (fx, fy, fz, mx, my, mz) onto per-actuator forces and back.
//! Lateral X forces go to the X-type actuators, lateral Y forces to the
//! Y-type ones; Z force and the X/Y moments are spread over every actuator
//! as a plane `z_i = fz/N + α·y_i + β·x_i`; the Z moment is produced by a
//! zero-sum shear of the Y forces proportional to each actuator's X offset.

use m1m3_common::actuator::{ActuatorArray, ActuatorId};
use m1m3_common::consts::FA_COUNT;
use m1m3_common::geometry::MirrorGeometry;

use super::{AxisForces, MirrorForces};

/// Precomputed geometry sums for [`ForceDistribution::distribute`].
#[derive(Debug, Clone)]
pub struct ForceDistribution {
    x_pos: ActuatorArray<f64>,
    y_pos: ActuatorArray<f64>,
    x_actuators: Vec<ActuatorId>,
    y_actuators: Vec<ActuatorId>,
    sx: f64,
    sy: f64,
    sxx: f64,
    syy: f64,
    sxy: f64,
    /// Mean X position of the Y-type actuators.
    y_actuator_mean_x: f64,
    /// `Σ (x_i - mean)²` over the Y-type actuators.
    y_actuator_x_spread: f64,
}

impl ForceDistribution {
    pub fn new(geometry: &MirrorGeometry) -> Self {
        let x_pos = geometry.actuators().map(|a| a.x);
        let y_pos = geometry.actuators().map(|a| a.y);
        let mut sx = 0.0;
        let mut sy = 0.0;
        let mut sxx = 0.0;
        let mut syy = 0.0;
        let mut sxy = 0.0;
        for id in ActuatorId::all() {
            let (x, y) = (x_pos[id], y_pos[id]);
            sx += x;
            sy += y;
            sxx += x * x;
            syy += y * y;
            sxy += x * y;
        }
        let y_actuators = geometry.y_actuators().to_vec();
        let y_actuator_mean_x = if y_actuators.is_empty() {
            0.0
        } else {
            y_actuators.iter().map(|&id| x_pos[id]).sum::<f64>() / y_actuators.len() as f64
        };
        let y_actuator_x_spread = y_actuators
            .iter()
            .map(|&id| (x_pos[id] - y_actuator_mean_x).powi(2))
            .sum();
        Self {
            x_pos,
            y_pos,
            x_actuators: geometry.x_actuators().to_vec(),
            y_actuators,
            sx,
            sy,
            sxx,
            syy,
            sxy,
            y_actuator_mean_x,
            y_actuator_x_spread,
        }
    }

    /// Per-actuator forces whose net is `target`.
    pub fn distribute(&self, target: &MirrorForces) -> AxisForces {
        let mut out = AxisForces::zeros();

        if !self.x_actuators.is_empty() {
            let share = target.fx / self.x_actuators.len() as f64;
            for &id in &self.x_actuators {
                out.x[id] = share;
            }
        }
        if !self.y_actuators.is_empty() {
            let share = target.fy / self.y_actuators.len() as f64;
            for &id in &self.y_actuators {
                out.y[id] = share;
            }
        }

        let mean_z = target.fz / FA_COUNT as f64;
        let a = target.mx - mean_z * self.sy;
        let b = -target.my - mean_z * self.sx;
        let det = self.syy * self.sxx - self.sxy * self.sxy;
        let (alpha, beta) = if det.abs() > f64::EPSILON {
            (
                (a * self.sxx - b * self.sxy) / det,
                (b * self.syy - a * self.sxy) / det,
            )
        } else {
            (0.0, 0.0)
        };
        for id in ActuatorId::all() {
            out.z[id] = mean_z + alpha * self.y_pos[id] + beta * self.x_pos[id];
        }

        let base_mz = self.z_moment(&out);
        if self.y_actuator_x_spread > f64::EPSILON {
            let gamma = (target.mz - base_mz) / self.y_actuator_x_spread;
            for &id in &self.y_actuators {
                out.y[id] += gamma * (self.x_pos[id] - self.y_actuator_mean_x);
            }
        }
        out
    }

    /// Net forces and moments of per-actuator forces.
    pub fn mirror_forces(&self, forces: &AxisForces) -> MirrorForces {
        let mut m = MirrorForces::default();
        for id in ActuatorId::all() {
            let (x, y) = (self.x_pos[id], self.y_pos[id]);
            m.fx += forces.x[id];
            m.fy += forces.y[id];
            m.fz += forces.z[id];
            m.mx += y * forces.z[id];
            m.my -= x * forces.z[id];
        }
        m.mz = self.z_moment(forces);
        m
    }

    fn z_moment(&self, forces: &AxisForces) -> f64 {
        ActuatorId::all()
            .map(|id| self.x_pos[id] * forces.y[id] - self.y_pos[id] * forces.x[id])
            .sum()
    }
}
