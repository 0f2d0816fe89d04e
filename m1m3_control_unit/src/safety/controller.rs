//! Fault latching and state override.

use std::sync::Arc;

use m1m3_common::fault::FaultCode;
use m1m3_common::settings::SafetyControllerSettings;
use m1m3_common::state::DetailedState;
use tracing::{error, info};

use super::window::SlidingWindow;
use crate::cycle::TimeSource;
use crate::publisher::{Event, Publisher};

/// Latches the first enabled fault until the next safety check.
pub struct SafetyController {
    settings: SafetyControllerSettings,
    publisher: Arc<dyn Publisher>,
    time: Arc<dyn TimeSource>,
    /// Fault waiting for [`check_safety`](Self::check_safety).
    pending: Option<FaultCode>,
    /// Last published error code.
    error_code: Option<FaultCode>,
    ilc_timeouts: SlidingWindow,
    following_errors: SlidingWindow,
}

impl SafetyController {
    pub fn new(
        settings: SafetyControllerSettings,
        publisher: Arc<dyn Publisher>,
        time: Arc<dyn TimeSource>,
    ) -> Self {
        Self {
            ilc_timeouts: SlidingWindow::new(settings.ilc_communication_timeout.period),
            following_errors: SlidingWindow::new(settings.force_actuator_following_error.period),
            settings,
            publisher,
            time,
            pending: None,
            error_code: None,
        }
    }

    #[inline]
    pub fn settings(&self) -> &SafetyControllerSettings {
        &self.settings
    }

    /// Fault latched and not yet acted on.
    #[inline]
    pub fn pending_fault(&self) -> Option<FaultCode> {
        self.pending
    }

    /// Current error code, kept until [`clear_error_code`](Self::clear_error_code).
    #[inline]
    pub fn error_code(&self) -> Option<FaultCode> {
        self.error_code
    }

    /// Drop the error code and publish the cleared state.
    pub fn clear_error_code(&mut self) {
        info!("Safety error code cleared");
        self.pending = None;
        self.error_code = None;
        self.ilc_timeouts.clear();
        self.following_errors.clear();
        self.publisher.publish(Event::ErrorCode {
            timestamp: self.time.now(),
            error_code: 0,
            error_report: String::new(),
        });
    }

    /// Report a force-controller condition.
    pub fn force_controller_notify(&mut self, code: FaultCode, condition: bool) {
        let f = &self.settings.force_controller;
        let enabled = match code {
            FaultCode::ForceControllerSafetyLimit => f.fault_on_safety_limit,
            FaultCode::ForceControllerXMomentLimit => f.fault_on_x_moment,
            FaultCode::ForceControllerYMomentLimit => f.fault_on_y_moment,
            FaultCode::ForceControllerZMomentLimit => f.fault_on_z_moment,
            FaultCode::ForceControllerNearNeighborCheck => f.fault_on_near_neighbor,
            FaultCode::ForceControllerMagnitudeLimit => f.fault_on_magnitude,
            FaultCode::ForceControllerFarNeighborCheck => f.fault_on_far_neighbor,
            FaultCode::ForceControllerElevationForceClipping => f.fault_on_elevation_clipping,
            FaultCode::ForceControllerAzimuthForceClipping => f.fault_on_azimuth_clipping,
            FaultCode::ForceControllerThermalForceClipping => f.fault_on_thermal_clipping,
            FaultCode::ForceControllerBalanceForceClipping => f.fault_on_balance_clipping,
            FaultCode::ForceControllerDynamicForceClipping => f.fault_on_dynamic_clipping,
            FaultCode::ForceControllerActiveOpticForceClipping => f.fault_on_active_optic_clipping,
            FaultCode::ForceControllerStaticForceClipping => f.fault_on_static_clipping,
            FaultCode::ForceControllerAberrationForceClipping => f.fault_on_aberration_clipping,
            FaultCode::ForceControllerOffsetForceClipping => f.fault_on_offset_clipping,
            _ => false,
        };
        self.update_override(code, enabled, condition, "force controller check failed");
    }

    pub fn raise_operation_timeout(&mut self, condition: bool) {
        let enabled = self.settings.raise_operation.fault_on_timeout;
        self.update_override(
            FaultCode::RaiseOperationTimeout,
            enabled,
            condition,
            "raise operation timed out",
        );
    }

    pub fn lower_operation_timeout(&mut self, condition: bool) {
        let enabled = self.settings.lower_operation.fault_on_timeout;
        self.update_override(
            FaultCode::LowerOperationTimeout,
            enabled,
            condition,
            "lower operation timed out",
        );
    }

    /// Operator panic. Always faults.
    pub fn user_panic(&mut self) {
        self.update_override(FaultCode::UserPanic, true, true, "panic requested");
    }

    /// One cycle's ILC communication result.
    pub fn ilc_communication_timeout(&mut self, timed_out: bool) {
        let window = self.settings.ilc_communication_timeout;
        let count = self.ilc_timeouts.push(timed_out);
        self.update_override(
            FaultCode::IlcCommunicationTimeout,
            window.fault_enabled,
            count >= window.threshold,
            "too many ILC communication timeouts",
        );
    }

    /// One cycle's following-error result.
    pub fn force_actuator_following_error(&mut self, exceeded: bool) {
        let window = self.settings.force_actuator_following_error;
        let count = self.following_errors.push(exceeded);
        self.update_override(
            FaultCode::ForceActuatorFollowingError,
            window.fault_enabled,
            count >= window.threshold,
            "force actuator following error",
        );
    }

    /// `LoweringFault` if a fault is pending, otherwise `preferred`.
    ///
    /// Consumes the pending fault; the error code stays set.
    pub fn check_safety(&mut self, preferred: DetailedState) -> DetailedState {
        match self.pending.take() {
            Some(code) => {
                error!(code = %code, "Safety override: {preferred} -> LoweringFault");
                DetailedState::LoweringFault
            }
            None => preferred,
        }
    }

    fn update_override(&mut self, code: FaultCode, enabled: bool, condition: bool, report: &str) {
        if !(enabled && condition) || self.pending.is_some() {
            return;
        }
        error!(code = %code, "{report}");
        self.pending = Some(code);
        self.error_code = Some(code);
        self.publisher.publish(Event::ErrorCode {
            timestamp: self.time.now(),
            error_code: code.code(),
            error_report: report.to_string(),
        });
    }
}

impl std::fmt::Debug for SafetyController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SafetyController")
            .field("pending", &self.pending)
            .field("error_code", &self.error_code)
            .field("ilc_timeouts", &self.ilc_timeouts.count())
            .field("following_errors", &self.following_errors.count())
            .finish()
    }
}
