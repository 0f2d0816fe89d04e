//! Hardpoint position controller.
//!
//! Six stepper-driven hardpoints define the mirror's rigid-body position.
//! Each one is in one motion state per cycle:
//!
//! - `Standby`: no steps.
//! - `Chasing`: steps proportional to the measured load, driving it to zero.
//! - `Stepping`: a queued move drained at most `max_steps_per_cycle` a cycle.
//! - `Testing`: out by `test_travel_steps` and back.
//!
//! [`PositionController::cycle_steps`] produces the steps for the next
//! control list; [`PositionController::update_measurements`] feeds back the
//! encoders and load cells read after the transaction.

use std::sync::Arc;

use m1m3_common::actuator::HardpointId;
use m1m3_common::consts::HP_COUNT;
use m1m3_common::settings::PositionControllerSettings;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::cycle::TimeSource;
use crate::publisher::{Event, Publisher};

/// Motion state of one hardpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum HardpointMotion {
    #[default]
    Standby,
    Chasing,
    Stepping,
    Testing,
}

/// Rejected hardpoint request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HardpointError {
    /// The hardpoint is already moving.
    #[error("{hardpoint} is busy ({motion:?})")]
    Busy {
        hardpoint: HardpointId,
        motion: HardpointMotion,
    },
    /// A displacement does not fit the step counter.
    #[error("{0} move out of range")]
    OutOfRange(HardpointId),
}

/// Phase of a hardpoint test excursion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TestPhase {
    Out,
    Back,
}

/// Drives the six hardpoints.
pub struct PositionController {
    settings: PositionControllerSettings,
    publisher: Arc<dyn Publisher>,
    time: Arc<dyn TimeSource>,
    motion: [HardpointMotion; HP_COUNT],
    queued: [i32; HP_COUNT],
    test_phase: [TestPhase; HP_COUNT],
    encoders: [i32; HP_COUNT],
    forces: [f64; HP_COUNT],
}

impl PositionController {
    pub fn new(
        settings: PositionControllerSettings,
        publisher: Arc<dyn Publisher>,
        time: Arc<dyn TimeSource>,
    ) -> Self {
        Self {
            settings,
            publisher,
            time,
            motion: [HardpointMotion::Standby; HP_COUNT],
            queued: [0; HP_COUNT],
            test_phase: [TestPhase::Out; HP_COUNT],
            encoders: [0; HP_COUNT],
            forces: [0.0; HP_COUNT],
        }
    }

    #[inline]
    pub fn motion(&self) -> &[HardpointMotion; HP_COUNT] {
        &self.motion
    }

    #[inline]
    pub fn encoders(&self) -> &[i32; HP_COUNT] {
        &self.encoders
    }

    /// Last measured hardpoint loads [N].
    #[inline]
    pub fn forces(&self) -> &[f64; HP_COUNT] {
        &self.forces
    }

    // ─── Chase ──────────────────────────────────────────────────────

    /// Start chasing on one idle hardpoint.
    pub fn enable_chase(&mut self, hp: HardpointId) -> Result<(), HardpointError> {
        self.require_standby(hp)?;
        info!("{hp} chase enabled");
        self.motion[hp.index()] = HardpointMotion::Chasing;
        self.publish_state();
        Ok(())
    }

    /// Stop chasing on one hardpoint. No effect if it is not chasing.
    pub fn disable_chase(&mut self, hp: HardpointId) {
        if self.motion[hp.index()] == HardpointMotion::Chasing {
            info!("{hp} chase disabled");
            self.motion[hp.index()] = HardpointMotion::Standby;
            self.publish_state();
        }
    }

    /// Chase on every hardpoint, interrupting any motion.
    pub fn enable_chase_all(&mut self) {
        self.queued = [0; HP_COUNT];
        self.motion = [HardpointMotion::Chasing; HP_COUNT];
        debug!("Chase enabled on all hardpoints");
        self.publish_state();
    }

    pub fn disable_chase_all(&mut self) {
        let mut changed = false;
        for m in self.motion.iter_mut() {
            if *m == HardpointMotion::Chasing {
                *m = HardpointMotion::Standby;
                changed = true;
            }
        }
        if changed {
            debug!("Chase disabled on all hardpoints");
            self.publish_state();
        }
    }

    // ─── Moves ──────────────────────────────────────────────────────

    /// Queue relative moves. Every hardpoint with a non-zero move must be
    /// idle.
    pub fn move_steps(&mut self, steps: [i32; HP_COUNT]) -> Result<(), HardpointError> {
        for hp in HardpointId::all() {
            if steps[hp.index()] != 0 {
                self.require_standby(hp)?;
            }
        }
        for (i, &s) in steps.iter().enumerate() {
            if s != 0 {
                self.queued[i] = s;
                self.motion[i] = HardpointMotion::Stepping;
            }
        }
        info!(?steps, "Hardpoint move queued");
        self.publish_state();
        Ok(())
    }

    /// Move every hardpoint to absolute encoder positions.
    pub fn move_to_encoders(&mut self, target: [i32; HP_COUNT]) -> Result<(), HardpointError> {
        let mut steps = [0; HP_COUNT];
        for hp in HardpointId::all() {
            let i = hp.index();
            steps[i] = target[i]
                .checked_sub(self.encoders[i])
                .ok_or(HardpointError::OutOfRange(hp))?;
        }
        self.move_steps(steps)
    }

    /// Move to the reference encoder positions of the settings profile.
    pub fn move_to_reference(&mut self) -> Result<(), HardpointError> {
        info!("Moving hardpoints to reference position");
        self.move_to_encoders(self.settings.reference_position)
    }

    /// Relative rigid-body move `(x, y, z [m], rx, ry, rz [rad])`.
    pub fn translate(&mut self, displacement: [f64; 6]) -> Result<(), HardpointError> {
        let steps = self.to_steps(&displacement)?;
        self.move_steps(steps)
    }

    /// Absolute rigid-body position relative to the reference position.
    pub fn position(&mut self, position: [f64; 6]) -> Result<(), HardpointError> {
        let offset = self.to_steps(&position)?;
        let mut target = self.settings.reference_position;
        for hp in HardpointId::all() {
            let i = hp.index();
            target[i] = target[i]
                .checked_add(offset[i])
                .ok_or(HardpointError::OutOfRange(hp))?;
        }
        self.move_to_encoders(target)
    }

    /// Out-and-back excursion on one idle hardpoint.
    pub fn test_hardpoint(&mut self, hp: HardpointId) -> Result<(), HardpointError> {
        self.require_standby(hp)?;
        let i = hp.index();
        info!("{hp} test started");
        self.queued[i] = self.settings.test_travel_steps;
        self.test_phase[i] = TestPhase::Out;
        self.motion[i] = HardpointMotion::Testing;
        self.publish_state();
        Ok(())
    }

    /// Stop every hardpoint immediately.
    pub fn stop_motion(&mut self) {
        self.queued = [0; HP_COUNT];
        if self.motion != [HardpointMotion::Standby; HP_COUNT] {
            info!("Hardpoint motion stopped");
            self.motion = [HardpointMotion::Standby; HP_COUNT];
            self.publish_state();
        }
    }

    // ─── Cycle ──────────────────────────────────────────────────────

    /// Steps to send this cycle.
    pub fn cycle_steps(&mut self) -> [i32; HP_COUNT] {
        let max = self.settings.max_steps_per_cycle;
        let mut steps = [0; HP_COUNT];
        let mut changed = false;
        for (i, out) in steps.iter_mut().enumerate() {
            match self.motion[i] {
                HardpointMotion::Standby => {}
                HardpointMotion::Chasing => {
                    let chase = (-self.forces[i] * self.settings.chase_gain).round();
                    *out = chase.clamp(-f64::from(max), f64::from(max)) as i32;
                }
                HardpointMotion::Stepping => {
                    *out = self.queued[i].clamp(-max, max);
                    self.queued[i] -= *out;
                    if self.queued[i] == 0 {
                        self.motion[i] = HardpointMotion::Standby;
                        changed = true;
                    }
                }
                HardpointMotion::Testing => {
                    *out = self.queued[i].clamp(-max, max);
                    self.queued[i] -= *out;
                    if self.queued[i] == 0 {
                        match self.test_phase[i] {
                            TestPhase::Out => {
                                self.test_phase[i] = TestPhase::Back;
                                self.queued[i] = -self.settings.test_travel_steps;
                            }
                            TestPhase::Back => {
                                self.motion[i] = HardpointMotion::Standby;
                                changed = true;
                            }
                        }
                    }
                }
            }
        }
        if changed {
            self.publish_state();
        }
        steps
    }

    /// Encoders and load cells read back after the transaction.
    pub fn update_measurements(&mut self, encoders: [i32; HP_COUNT], forces: [f64; HP_COUNT]) {
        self.encoders = encoders;
        self.forces = forces;
    }

    // ─── Queries ────────────────────────────────────────────────────

    /// Every load within the raise (or lower) force limits.
    pub fn forces_in_tolerance(&self, raising: bool) -> bool {
        let limits = if raising {
            self.settings.raise_force_limits
        } else {
            self.settings.lower_force_limits
        };
        self.forces.iter().all(|&f| limits.contains(f))
    }

    /// No hardpoint is stepping or testing.
    pub fn motion_complete(&self) -> bool {
        self.motion
            .iter()
            .all(|m| !matches!(m, HardpointMotion::Stepping | HardpointMotion::Testing))
    }

    fn require_standby(&self, hp: HardpointId) -> Result<(), HardpointError> {
        match self.motion[hp.index()] {
            HardpointMotion::Standby => Ok(()),
            motion => Err(HardpointError::Busy { hardpoint: hp, motion }),
        }
    }

    fn to_steps(&self, displacement: &[f64; 6]) -> Result<[i32; HP_COUNT], HardpointError> {
        let mut steps = [0; HP_COUNT];
        for hp in HardpointId::all() {
            let row = &self.settings.kinematics[hp.index()];
            let meters: f64 = row.iter().zip(displacement).map(|(k, d)| k * d).sum();
            let s = (meters * self.settings.steps_per_meter).round();
            if !s.is_finite() || s.abs() > f64::from(i32::MAX) {
                return Err(HardpointError::OutOfRange(hp));
            }
            steps[hp.index()] = s as i32;
        }
        Ok(steps)
    }

    fn publish_state(&self) {
        self.publisher.publish(Event::HardpointActuatorState {
            timestamp: self.time.now(),
            motion_state: self.motion,
            encoders: self.encoders,
        });
    }
}

impl std::fmt::Debug for PositionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PositionController")
            .field("motion", &self.motion)
            .field("queued", &self.queued)
            .field("encoders", &self.encoders)
            .field("forces", &self.forces)
            .finish()
    }
}
