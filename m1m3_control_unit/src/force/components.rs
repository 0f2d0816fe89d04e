//! Target models of the sensor- and table-driven components.
//!
//! Each function turns its input (elevation, azimuth, temperature, angular
//! rates, hardpoint load) into per-actuator X/Y/Z targets. Lateral forces
//! are only produced where the actuator has a matching secondary cylinder.

use m1m3_common::actuator::ActuatorArray;
use m1m3_common::consts::{FA_COUNT, FA_Y_COUNT};
use m1m3_common::geometry::MirrorGeometry;
use m1m3_common::settings::{ForceTables, PidParameters};

use super::distribution::ForceDistribution;
use super::pid::Pid;
use super::{AxisForces, ForceError, MirrorForces};

/// Gravity load at a zenith angle [deg]: Z carries `cos`, the Y-type
/// actuators carry the lateral `sin` share.
pub fn elevation_forces(geometry: &MirrorGeometry, mirror_weight: f64, zenith_deg: f64) -> AxisForces {
    let zenith = zenith_deg.to_radians();
    let z = mirror_weight / FA_COUNT as f64 * zenith.cos();
    let y = mirror_weight / FA_Y_COUNT as f64 * zenith.sin();
    let mut forces = AxisForces::from_z(ActuatorArray::splat(z));
    for &id in geometry.y_actuators() {
        forces.y[id] = y;
    }
    forces
}

/// Static table forces.
pub fn static_forces(geometry: &MirrorGeometry, tables: &ForceTables) -> AxisForces {
    masked(geometry, AxisForces {
        x: tables.static_x,
        y: tables.static_y,
        z: tables.static_z,
    })
}

/// Per-actuator cubic in azimuth angle [deg].
pub fn azimuth_forces(geometry: &MirrorGeometry, tables: &ForceTables, azimuth_deg: f64) -> AxisForces {
    masked(geometry, AxisForces {
        x: tables.azimuth_x.map(|c| polynomial(&c, azimuth_deg)),
        y: tables.azimuth_y.map(|c| polynomial(&c, azimuth_deg)),
        z: tables.azimuth_z.map(|c| polynomial(&c, azimuth_deg)),
    })
}

/// Per-actuator cubic in mirror temperature [°C].
pub fn thermal_forces(geometry: &MirrorGeometry, tables: &ForceTables, temperature: f64) -> AxisForces {
    masked(geometry, AxisForces {
        x: tables.thermal_x.map(|c| polynomial(&c, temperature)),
        y: tables.thermal_y.map(|c| polynomial(&c, temperature)),
        z: tables.thermal_z.map(|c| polynomial(&c, temperature)),
    })
}

/// Inertial forces from angular acceleration and angular velocity squared.
pub fn dynamic_forces(
    geometry: &MirrorGeometry,
    tables: &ForceTables,
    acceleration: [f64; 3],
    velocity: [f64; 3],
) -> AxisForces {
    let omega2 = velocity.map(|w| w * w);
    let term = |acc: &[f64; 3], vel: &[f64; 3]| dot(acc, &acceleration) + dot(vel, &omega2);
    let x = ActuatorArray::from_fn(|id| term(&tables.acceleration_x[id], &tables.velocity_x[id]));
    let y = ActuatorArray::from_fn(|id| term(&tables.acceleration_y[id], &tables.velocity_y[id]));
    let z = ActuatorArray::from_fn(|id| term(&tables.acceleration_z[id], &tables.velocity_z[id]));
    masked(geometry, AxisForces { x, y, z })
}

/// `c0 + c1·v + c2·v² + c3·v³`.
fn polynomial(c: &[f64; 4], v: f64) -> f64 {
    ((c[3] * v + c[2]) * v + c[1]) * v + c[0]
}

fn dot(a: &[f64; 3], b: &[f64; 3]) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

fn masked(geometry: &MirrorGeometry, mut forces: AxisForces) -> AxisForces {
    for (id, a) in geometry.actuators().enumerate() {
        if !a.orientation.has_x() {
            forces.x[id] = 0.0;
        }
        if !a.orientation.has_y() {
            forces.y[id] = 0.0;
        }
    }
    forces
}

/// Z forces from a 156-long array, rejecting non-finite values.
pub fn z_forces(values: &[f64]) -> Result<AxisForces, ForceError> {
    Ok(AxisForces::from_z(finite_array(values)?))
}

/// X/Y/Z forces from three 156-long arrays.
pub fn xyz_forces(x: &[f64], y: &[f64], z: &[f64]) -> Result<AxisForces, ForceError> {
    Ok(AxisForces {
        x: finite_array(x)?,
        y: finite_array(y)?,
        z: finite_array(z)?,
    })
}

fn finite_array(values: &[f64]) -> Result<ActuatorArray<f64>, ForceError> {
    if let Some(i) = values.iter().position(|v| !v.is_finite()) {
        return Err(ForceError::NotFinite(i));
    }
    Ok(ActuatorArray::from_slice(values)?)
}

// ─── Balance ────────────────────────────────────────────────────────

/// Six PIDs taking the hardpoint load off the hardpoints.
#[derive(Debug, Clone)]
pub struct BalanceController {
    profile: [PidParameters; 6],
    pids: [Pid; 6],
}

impl BalanceController {
    pub fn new(profile: [PidParameters; 6]) -> Self {
        Self {
            profile,
            pids: profile.map(Pid::new),
        }
    }

    /// PID `1..=6` (fx, fy, fz, mx, my, mz).
    pub fn pid(&self, pid: u8) -> Result<&Pid, ForceError> {
        Self::slot(pid).map(|i| &self.pids[i])
    }

    /// Replace the gains of one PID.
    pub fn update_pid(&mut self, pid: u8, parameters: PidParameters) -> Result<(), ForceError> {
        let i = Self::slot(pid)?;
        self.pids[i].set_parameters(parameters);
        Ok(())
    }

    /// Restore the profile gains of one PID.
    pub fn reset_pid(&mut self, pid: u8) -> Result<(), ForceError> {
        let i = Self::slot(pid)?;
        self.pids[i].set_parameters(self.profile[i]);
        Ok(())
    }

    /// Restore every PID to the profile gains and clear its state.
    pub fn reset_all(&mut self) {
        for (pid, parameters) in self.pids.iter_mut().zip(self.profile) {
            pid.set_parameters(parameters);
            pid.reset();
        }
    }

    /// One cycle: drive the measured hardpoint load toward zero and spread
    /// the correction over the actuators.
    pub fn process(&mut self, measured: &MirrorForces, distribution: &ForceDistribution) -> AxisForces {
        let measured = measured.to_array();
        let mut correction = [0.0; 6];
        for ((out, pid), m) in correction.iter_mut().zip(self.pids.iter_mut()).zip(measured) {
            *out = pid.process(-m);
        }
        distribution.distribute(&MirrorForces::from_array(correction))
    }

    fn slot(pid: u8) -> Result<usize, ForceError> {
        match pid {
            1..=6 => Ok(usize::from(pid - 1)),
            _ => Err(ForceError::UnknownPid(pid)),
        }
    }
}

/// Mirror forces seen by the hardpoints.
pub fn hardpoint_mirror_forces(matrix: &[[f64; 6]; 6], hardpoint_forces: &[f64; 6]) -> MirrorForces {
    let mut out = [0.0; 6];
    for (o, row) in out.iter_mut().zip(matrix) {
        *o = row.iter().zip(hardpoint_forces).map(|(a, f)| a * f).sum();
    }
    MirrorForces::from_array(out)
}
