//! Setpoint conversion and mirror safety checks.
//!
//! Runs on the summed forces every cycle: cylinder conversion with
//! per-actuator clipping, then the near-neighbor, magnitude and far-neighbor
//! checks on what will actually be applied.

use std::f64::consts::SQRT_2;

use m1m3_common::actuator::{ActuatorArray, ActuatorId, Orientation};
use m1m3_common::consts::FA_COUNT;
use m1m3_common::geometry::MirrorGeometry;
use m1m3_common::settings::Limits;

use super::AxisForces;
use crate::transport::CylinderSetpoints;

/// Result of [`to_cylinders`].
#[derive(Debug, Clone)]
pub struct CylinderConversion {
    /// Clipped setpoints sent to the ILCs.
    pub setpoints: CylinderSetpoints,
    /// Forces the clipped setpoints produce.
    pub applied: AxisForces,
    /// Actuators whose primary or secondary setpoint was clipped.
    pub clipped: Vec<ActuatorId>,
}

/// Convert X/Y/Z forces into primary/secondary cylinder setpoints, clip
/// them, and back-compute the forces actually applied.
///
/// The secondary cylinder sits at 45°: it contributes equally to the lateral
/// axis and to Z, so the primary carries the remaining Z.
pub fn to_cylinders(
    geometry: &MirrorGeometry,
    forces: &AxisForces,
    primary_limits: &Limits,
    secondary_limits: &Limits,
) -> CylinderConversion {
    let mut setpoints = CylinderSetpoints::default();
    let mut applied = AxisForces::zeros();
    let mut clipped = Vec::new();

    for (id, actuator) in geometry.actuators().enumerate() {
        let (x, y, z) = (forces.x[id], forces.y[id], forces.z[id]);
        let (secondary, primary) = match actuator.orientation {
            Orientation::PositiveY => (y * SQRT_2, z - y),
            Orientation::NegativeY => (-y * SQRT_2, z + y),
            Orientation::PositiveX => (x * SQRT_2, z - x),
            Orientation::NegativeX => (-x * SQRT_2, z + x),
            Orientation::Na => (0.0, z),
        };
        let (primary, pc) = primary_limits.coerce(primary);
        let (secondary, sc) = if actuator.orientation.has_secondary() {
            secondary_limits.coerce(secondary)
        } else {
            (0.0, false)
        };
        if pc || sc {
            clipped.push(id);
        }
        setpoints.primary[id] = primary;
        setpoints.secondary[id] = secondary;

        let lateral = secondary / SQRT_2;
        match actuator.orientation {
            Orientation::PositiveY => {
                applied.y[id] = lateral;
                applied.z[id] = primary + lateral;
            }
            Orientation::NegativeY => {
                applied.y[id] = -lateral;
                applied.z[id] = primary + lateral;
            }
            Orientation::PositiveX => {
                applied.x[id] = lateral;
                applied.z[id] = primary + lateral;
            }
            Orientation::NegativeX => {
                applied.x[id] = -lateral;
                applied.z[id] = primary + lateral;
            }
            Orientation::Na => applied.z[id] = primary,
        }
    }

    CylinderConversion {
        setpoints,
        applied,
        clipped,
    }
}

/// Actuators whose Z force differs from the mean of their near neighbors by
/// more than `near_factor` of the nominal per-actuator load.
pub fn near_neighbor_violations(
    geometry: &MirrorGeometry,
    z: &ActuatorArray<f64>,
    mirror_weight: f64,
    near_factor: f64,
) -> Vec<ActuatorId> {
    let tolerance = mirror_weight / FA_COUNT as f64 * near_factor;
    ActuatorId::all()
        .filter(|&id| {
            let neighbors = geometry.near_neighbors(id);
            if neighbors.is_empty() {
                return false;
            }
            let mean = neighbors.iter().map(|&n| z[n]).sum::<f64>() / neighbors.len() as f64;
            (z[id] - mean).abs() > tolerance
        })
        .collect()
}

/// Total absolute force exceeds `mirror_weight * weight_factor`.
pub fn magnitude_violation(forces: &AxisForces, mirror_weight: f64, weight_factor: f64) -> bool {
    let total: f64 = ActuatorId::all()
        .map(|id| forces.x[id].abs() + forces.y[id].abs() + forces.z[id].abs())
        .sum();
    total > mirror_weight * weight_factor
}

/// Actuators whose neighborhood average magnitude strays from the global
/// average by more than `far_factor` of it (at least 1 N).
pub fn far_neighbor_violations(
    geometry: &MirrorGeometry,
    forces: &AxisForces,
    far_factor: f64,
) -> Vec<ActuatorId> {
    let magnitude = ActuatorArray::from_fn(|id| {
        (forces.x[id].powi(2) + forces.y[id].powi(2) + forces.z[id].powi(2)).sqrt()
    });
    let global_average = magnitude.sum() / FA_COUNT as f64;
    let tolerance = (global_average * far_factor).max(1.0);
    ActuatorId::all()
        .filter(|&id| {
            let far = geometry.far_neighbors(id);
            let local = (magnitude[id] + far.iter().map(|&n| magnitude[n]).sum::<f64>())
                / (far.len() + 1) as f64;
            (local - global_average).abs() > tolerance
        })
        .collect()
}
