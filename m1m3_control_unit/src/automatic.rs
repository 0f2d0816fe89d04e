//! Automatic raise and lower sequencing.
//!
//! Raising transfers the mirror weight from the static supports to the force
//! actuators in support-percentage steps, with the hardpoints chasing the
//! load so they stay unloaded. Lowering does the reverse. Every step waits
//! until the hardpoint loads (and, raising, the actuator following error)
//! are within tolerance; a step that cannot be taken before the configured
//! timeout is reported to the safety controller.

use std::sync::Arc;

use m1m3_common::settings::SafetyControllerSettings;
use tracing::{info, warn};

use crate::cycle::TimeSource;
use crate::force::ForceController;
use crate::hardpoint::PositionController;
use crate::publisher::{Event, OperationKind, OperationPhase, Publisher};
use crate::safety::SafetyController;
use crate::transport::IlcReadings;

/// Progress of the running automatic operation.
pub struct AutomaticOperationsController {
    raise_timeout_s: f64,
    lower_timeout_s: f64,
    publisher: Arc<dyn Publisher>,
    time: Arc<dyn TimeSource>,
    /// Start of the running operation [s].
    started_at: f64,
    bypass_move_to_reference: bool,
    raise_timed_out: bool,
    lower_timed_out: bool,
}

impl AutomaticOperationsController {
    pub fn new(
        settings: &SafetyControllerSettings,
        publisher: Arc<dyn Publisher>,
        time: Arc<dyn TimeSource>,
    ) -> Self {
        Self {
            raise_timeout_s: settings.raise_operation.timeout_s,
            lower_timeout_s: settings.lower_operation.timeout_s,
            publisher,
            time,
            started_at: 0.0,
            bypass_move_to_reference: false,
            raise_timed_out: false,
            lower_timed_out: false,
        }
    }

    #[inline]
    pub fn started_at(&self) -> f64 {
        self.started_at
    }

    #[inline]
    pub fn bypass_move_to_reference(&self) -> bool {
        self.bypass_move_to_reference
    }

    // ─── Raise ──────────────────────────────────────────────────────

    pub fn start_raise_operation(
        &mut self,
        bypass_move_to_reference: bool,
        force: &mut ForceController,
        hardpoints: &mut PositionController,
    ) {
        info!(bypass_move_to_reference, "Starting raise operation");
        self.raise_timed_out = false;
        self.bypass_move_to_reference = bypass_move_to_reference;
        hardpoints.stop_motion();
        hardpoints.enable_chase_all();
        force.apply_elevation_forces();
        force.zero_static_forces();
        force.zero_offset_forces();
        force.zero_active_optic_forces();
        force.zero_aberration_forces();
        force.zero_azimuth_forces();
        force.zero_thermal_forces();
        force.zero_dynamic_forces();
        force.zero_balance_forces();
        force.zero_support_percentage();
        self.started_at = self.time.now();
        self.publish(OperationKind::Raise, OperationPhase::Started, force);
    }

    /// Take one raise step if the mirror is ready for it.
    pub fn try_increment_support_percentage(
        &mut self,
        force: &mut ForceController,
        hardpoints: &mut PositionController,
        readings: &IlcReadings,
    ) {
        if force.support_percentage_filled()
            || !hardpoints.forces_in_tolerance(true)
            || !force.following_error_in_tolerance(readings)
        {
            return;
        }
        force.increment_support_percentage();
        if force.support_percentage_filled() {
            info!("Mirror weight fully transferred to the force actuators");
            hardpoints.disable_chase_all();
            if !self.bypass_move_to_reference {
                if let Err(e) = hardpoints.move_to_reference() {
                    warn!("Hardpoints cannot reach the reference position: {e}");
                }
            }
        }
    }

    pub fn check_raise_operation_complete(&self, force: &ForceController, hardpoints: &PositionController) -> bool {
        force.support_percentage_filled() && hardpoints.motion_complete()
    }

    pub fn complete_raise_operation(&mut self, force: &mut ForceController) {
        info!("Raise operation complete");
        force.zero_aberration_forces();
        force.zero_dynamic_forces();
        force.zero_active_optic_forces();
        force.zero_balance_forces();
        force.zero_offset_forces();
        force.apply_azimuth_forces();
        force.apply_elevation_forces();
        force.apply_static_forces();
        force.apply_thermal_forces();
        force.fill_support_percentage();
        self.publish(OperationKind::Raise, OperationPhase::Completed, force);
    }

    pub fn check_raise_operation_timeout(&self) -> bool {
        self.time.now() >= self.started_at + self.raise_timeout_s
    }

    /// Report the timeout; published once per operation.
    pub fn timeout_raise_operation(&mut self, force: &ForceController, safety: &mut SafetyController) {
        if !self.raise_timed_out {
            warn!(
                support_percentage = force.support_percentage(),
                "Raise operation timed out"
            );
            self.raise_timed_out = true;
            self.publish(OperationKind::Raise, OperationPhase::TimedOut, force);
        }
        safety.raise_operation_timeout(true);
    }

    /// Reverse a raise in progress: the lower starts from the current
    /// support percentage.
    pub fn abort_raise_m1m3(&mut self, force: &mut ForceController, hardpoints: &mut PositionController) {
        info!(
            support_percentage = force.support_percentage(),
            "Aborting raise operation"
        );
        self.publish(OperationKind::Raise, OperationPhase::Aborted, force);
        self.lower_timed_out = false;
        hardpoints.stop_motion();
        hardpoints.enable_chase_all();
        Self::elevation_only(force);
        self.started_at = self.time.now();
        self.publish(OperationKind::Lower, OperationPhase::Started, force);
    }

    // ─── Lower ──────────────────────────────────────────────────────

    pub fn start_lower_operation(&mut self, force: &mut ForceController, hardpoints: &mut PositionController) {
        info!("Starting lower operation");
        self.lower_timed_out = false;
        force.fill_support_percentage();
        hardpoints.stop_motion();
        hardpoints.enable_chase_all();
        Self::elevation_only(force);
        self.started_at = self.time.now();
        self.publish(OperationKind::Lower, OperationPhase::Started, force);
    }

    /// Take one lower step if the hardpoint loads allow it.
    pub fn try_decrement_support_percentage(&mut self, force: &mut ForceController, hardpoints: &PositionController) {
        if !force.support_percentage_zeroed() && hardpoints.forces_in_tolerance(false) {
            force.decrement_support_percentage();
        }
    }

    pub fn check_lower_operation_complete(&self, force: &ForceController) -> bool {
        force.support_percentage_zeroed()
    }

    pub fn complete_lower_operation(&mut self, force: &mut ForceController, hardpoints: &mut PositionController) {
        info!("Lower operation complete");
        hardpoints.disable_chase_all();
        Self::zero_all(force);
        force.zero_support_percentage();
        self.publish(OperationKind::Lower, OperationPhase::Completed, force);
    }

    pub fn check_lower_operation_timeout(&self) -> bool {
        self.time.now() >= self.started_at + self.lower_timeout_s
    }

    pub fn timeout_lower_operation(&mut self, force: &ForceController, safety: &mut SafetyController) {
        if !self.lower_timed_out {
            warn!(
                support_percentage = force.support_percentage(),
                "Lower operation timed out"
            );
            self.lower_timed_out = true;
            self.publish(OperationKind::Lower, OperationPhase::TimedOut, force);
        }
        safety.lower_operation_timeout(true);
    }

    // ─── Helpers ────────────────────────────────────────────────────

    fn elevation_only(force: &mut ForceController) {
        Self::zero_all(force);
        force.apply_elevation_forces();
    }

    fn zero_all(force: &mut ForceController) {
        force.zero_static_forces();
        force.zero_offset_forces();
        force.zero_active_optic_forces();
        force.zero_aberration_forces();
        force.zero_elevation_forces();
        force.zero_azimuth_forces();
        force.zero_thermal_forces();
        force.zero_dynamic_forces();
        force.zero_balance_forces();
    }

    fn publish(&self, operation: OperationKind, phase: OperationPhase, force: &ForceController) {
        self.publisher.publish(Event::AutomaticOperation {
            timestamp: self.time.now(),
            operation,
            phase,
            support_percentage: force.support_percentage() * 100.0,
        });
    }
}

impl std::fmt::Debug for AutomaticOperationsController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AutomaticOperationsController")
            .field("started_at", &self.started_at)
            .field("bypass_move_to_reference", &self.bypass_move_to_reference)
            .field("raise_timed_out", &self.raise_timed_out)
            .field("lower_timed_out", &self.lower_timed_out)
            .finish_non_exhaustive()
    }
}
