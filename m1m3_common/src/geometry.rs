//! Static mirror geometry: actuator positions, orientations, neighbor sets
//! and the bending-mode influence table.
//!
//! The geometry is calibration data fixed for the life of the process. The
//! built-in layout places the actuators on six concentric rings; every
//! thirteenth actuator carries an X secondary cylinder and the first hundred
//! of the remainder carry a Y secondary cylinder.

use crate::actuator::{ActuatorArray, ActuatorId, Orientation};
use crate::consts::{BENDING_MODE_COUNT, FA_COUNT, FA_ID_MIN, FA_X_COUNT, FA_Y_COUNT};

/// Ring radii [m] and actuator counts of the built-in layout.
const RINGS: [(f64, usize); 6] = [
    (1.0, 12),
    (1.6, 18),
    (2.2, 24),
    (2.8, 30),
    (3.4, 33),
    (4.0, 39),
];

/// Outer radius used to normalize bending modes [m].
const MIRROR_RADIUS: f64 = 4.2;

/// Distance below which two actuators are near neighbors [m].
const NEAR_NEIGHBOR_RADIUS: f64 = 0.9;

/// Distance below which two actuators are far neighbors [m].
const FAR_NEIGHBOR_RADIUS: f64 = 2.0;

/// Radial/azimuthal orders `(n, m)` of the bending modes, lowest order first.
const MODE_ORDERS: [(u32, i32); BENDING_MODE_COUNT] = [
    (2, -2), (2, 0), (2, 2),
    (3, -3), (3, -1), (3, 1), (3, 3),
    (4, -4), (4, -2), (4, 0), (4, 2), (4, 4),
    (5, -5), (5, -3), (5, -1), (5, 1), (5, 3), (5, 5),
    (6, -6), (6, -4), (6, -2), (6, 0),
];

/// Bending-mode influence per unit coefficient [N].
const BENDING_MODE_GAIN: f64 = 100.0;

/// Position and orientation of one force actuator.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ActuatorGeometry {
    /// ILC bus address.
    pub ilc_id: u16,
    /// X position on the mirror [m].
    pub x: f64,
    /// Y position on the mirror [m].
    pub y: f64,
    /// Secondary cylinder orientation.
    pub orientation: Orientation,
}

/// Complete mirror geometry.
#[derive(Debug, Clone)]
pub struct MirrorGeometry {
    actuators: ActuatorArray<ActuatorGeometry>,
    near_neighbors: Vec<Vec<ActuatorId>>,
    far_neighbors: Vec<Vec<ActuatorId>>,
    x_actuators: Vec<ActuatorId>,
    y_actuators: Vec<ActuatorId>,
    bending_modes: ActuatorArray<[f64; BENDING_MODE_COUNT]>,
}

impl Default for MirrorGeometry {
    fn default() -> Self {
        Self::default_layout()
    }
}

impl MirrorGeometry {
    /// Built-in ring layout.
    pub fn default_layout() -> Self {
        let mut positions = Vec::with_capacity(FA_COUNT);
        for (ring, &(radius, count)) in RINGS.iter().enumerate() {
            let step = std::f64::consts::TAU / count as f64;
            let phase = if ring % 2 == 1 { step / 2.0 } else { 0.0 };
            for k in 0..count {
                let theta = phase + step * k as f64;
                positions.push((radius * theta.cos(), radius * theta.sin()));
            }
        }

        let mut y_assigned = 0;
        let actuators = ActuatorArray::from_fn(|id| {
            let i = id.index();
            let (x, y) = positions[i];
            let orientation = if i % 13 == 0 {
                if x >= 0.0 {
                    Orientation::PositiveX
                } else {
                    Orientation::NegativeX
                }
            } else if y_assigned < FA_Y_COUNT {
                y_assigned += 1;
                if y >= 0.0 {
                    Orientation::PositiveY
                } else {
                    Orientation::NegativeY
                }
            } else {
                Orientation::Na
            };
            ActuatorGeometry {
                ilc_id: FA_ID_MIN + i as u16,
                x,
                y,
                orientation,
            }
        });

        let near_neighbors = neighbors_within(&actuators, NEAR_NEIGHBOR_RADIUS, true);
        let far_neighbors = neighbors_within(&actuators, FAR_NEIGHBOR_RADIUS, false);

        let x_actuators: Vec<ActuatorId> = actuators
            .enumerate()
            .filter(|(_, a)| a.orientation.has_x())
            .map(|(id, _)| id)
            .collect();
        let y_actuators: Vec<ActuatorId> = actuators
            .enumerate()
            .filter(|(_, a)| a.orientation.has_y())
            .map(|(id, _)| id)
            .collect();
        debug_assert_eq!(x_actuators.len(), FA_X_COUNT);
        debug_assert_eq!(y_actuators.len(), FA_Y_COUNT);

        let bending_modes = actuators.map(|a| {
            let rho = (a.x * a.x + a.y * a.y).sqrt() / MIRROR_RADIUS;
            let theta = a.y.atan2(a.x);
            std::array::from_fn(|k| {
                let (n, m) = MODE_ORDERS[k];
                BENDING_MODE_GAIN * zernike(n, m, rho, theta)
            })
        });

        Self {
            actuators,
            near_neighbors,
            far_neighbors,
            x_actuators,
            y_actuators,
            bending_modes,
        }
    }

    /// Geometry of one actuator.
    #[inline]
    pub fn actuator(&self, id: ActuatorId) -> &ActuatorGeometry {
        &self.actuators[id]
    }

    /// All actuators.
    #[inline]
    pub fn actuators(&self) -> &ActuatorArray<ActuatorGeometry> {
        &self.actuators
    }

    /// Look up an actuator by ILC bus address.
    pub fn by_ilc_id(&self, ilc_id: u16) -> Option<ActuatorId> {
        self.actuators
            .enumerate()
            .find(|(_, a)| a.ilc_id == ilc_id)
            .map(|(id, _)| id)
    }

    /// Actuators with an X secondary cylinder.
    #[inline]
    pub fn x_actuators(&self) -> &[ActuatorId] {
        &self.x_actuators
    }

    /// Actuators with a Y secondary cylinder.
    #[inline]
    pub fn y_actuators(&self) -> &[ActuatorId] {
        &self.y_actuators
    }

    /// Near neighbors of `id` (never empty, never contains `id`).
    #[inline]
    pub fn near_neighbors(&self, id: ActuatorId) -> &[ActuatorId] {
        &self.near_neighbors[id.index()]
    }

    /// Far neighbors of `id` (may be empty, never contains `id`).
    #[inline]
    pub fn far_neighbors(&self, id: ActuatorId) -> &[ActuatorId] {
        &self.far_neighbors[id.index()]
    }

    /// Z forces produced by a set of bending-mode coefficients.
    pub fn bending_mode_forces(&self, coefficients: &[f64; BENDING_MODE_COUNT]) -> ActuatorArray<f64> {
        self.bending_modes.map(|row| {
            row.iter()
                .zip(coefficients.iter())
                .map(|(influence, c)| influence * c)
                .sum()
        })
    }
}

fn neighbors_within(
    actuators: &ActuatorArray<ActuatorGeometry>,
    radius: f64,
    at_least_one: bool,
) -> Vec<Vec<ActuatorId>> {
    ActuatorId::all()
        .map(|id| {
            let me = actuators[id];
            let mut closest: Option<(ActuatorId, f64)> = None;
            let mut found = Vec::new();
            for (other, a) in actuators.enumerate() {
                if other == id {
                    continue;
                }
                let d = (a.x - me.x).hypot(a.y - me.y);
                if d <= radius {
                    found.push(other);
                }
                if closest.is_none_or(|(_, best)| d < best) {
                    closest = Some((other, d));
                }
            }
            if found.is_empty() && at_least_one {
                if let Some((other, _)) = closest {
                    found.push(other);
                }
            }
            found
        })
        .collect()
}

/// Zernike polynomial `Z_n^m(rho, theta)`; negative `m` selects the sine term.
fn zernike(n: u32, m: i32, rho: f64, theta: f64) -> f64 {
    let am = m.unsigned_abs();
    let radial: f64 = (0..=(n - am) / 2)
        .map(|k| {
            let sign = if k % 2 == 0 { 1.0 } else { -1.0 };
            let num = factorial(n - k);
            let den = factorial(k) * factorial((n + am) / 2 - k) * factorial((n - am) / 2 - k);
            sign * num / den * rho.powi((n - 2 * k) as i32)
        })
        .sum();
    if m < 0 {
        radial * (am as f64 * theta).sin()
    } else {
        radial * (am as f64 * theta).cos()
    }
}

fn factorial(n: u32) -> f64 {
    (1..=n).map(f64::from).product()
}
