//! Force controller.
//!
//! Owns the nine force components, sums the active ones every cycle and runs
//! the setpoint checks on the result. The outputs of a cycle are the
//! cylinder setpoints sent to the ILCs and the forces they apply.

use std::sync::Arc;

use m1m3_common::consts::BENDING_MODE_COUNT;
use m1m3_common::fault::{FaultCode, SetpointWarning};
use m1m3_common::geometry::MirrorGeometry;
use m1m3_common::settings::{PidParameters, Settings};
use tracing::{debug, info, warn};

use super::checks;
use super::component::{ComponentKind, ForceComponent};
use super::components::{self, BalanceController};
use super::distribution::ForceDistribution;
use super::{AxisForces, ForceError, MirrorForces};
use crate::cycle::TimeSource;
use crate::publisher::{Event, Publisher};
use crate::safety::SafetyController;
use crate::transport::{CylinderSetpoints, IlcReadings, SensorSample};

/// Sensor values driving the sensor-based components.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ForceInputs {
    /// Inclinometer elevation [deg].
    pub inclinometer_elevation: f64,
    /// Last TMA elevation sample [deg].
    pub tma_elevation: f64,
    /// Last TMA azimuth sample [deg].
    pub tma_azimuth: f64,
    /// Mirror temperature [°C].
    pub temperature: f64,
    /// Angular acceleration [rad/s²].
    pub angular_acceleration: [f64; 3],
    /// Angular velocity [rad/s].
    pub angular_velocity: [f64; 3],
    /// Hardpoint load cell forces [N].
    pub hardpoint_forces: [f64; 6],
}

impl Default for ForceInputs {
    fn default() -> Self {
        Self {
            inclinometer_elevation: 90.0,
            tma_elevation: 90.0,
            tma_azimuth: 0.0,
            temperature: 20.0,
            angular_acceleration: [0.0; 3],
            angular_velocity: [0.0; 3],
            hardpoint_forces: [0.0; 6],
        }
    }
}

/// Composes the force components into cylinder setpoints.
pub struct ForceController {
    settings: Arc<Settings>,
    geometry: Arc<MirrorGeometry>,
    distribution: ForceDistribution,
    publisher: Arc<dyn Publisher>,
    time: Arc<dyn TimeSource>,

    components: [ForceComponent; 9],
    balance: BalanceController,
    inputs: ForceInputs,
    support_percentage: f64,

    offset_clipped: bool,
    warnings: SetpointWarning,
    published_warnings: SetpointWarning,

    applied: AxisForces,
    mirror: MirrorForces,
    setpoints: CylinderSetpoints,
}

impl ForceController {
    pub fn new(
        settings: Arc<Settings>,
        geometry: Arc<MirrorGeometry>,
        publisher: Arc<dyn Publisher>,
        time: Arc<dyn TimeSource>,
    ) -> Self {
        let fc = &settings.force_controller;
        let components = ComponentKind::ALL.map(|kind| {
            let s = match kind {
                ComponentKind::Static => fc.static_component,
                ComponentKind::Offset => fc.offset_component,
                ComponentKind::ActiveOptic => fc.active_optic_component,
                ComponentKind::Aberration => fc.aberration_component,
                ComponentKind::Elevation => fc.elevation_component,
                ComponentKind::Azimuth => fc.azimuth_component,
                ComponentKind::Thermal => fc.thermal_component,
                ComponentKind::Dynamic => fc.dynamic_component,
                ComponentKind::Balance => fc.balance_component,
            };
            ForceComponent::new(kind, s)
        });
        let inputs = ForceInputs {
            inclinometer_elevation: fc.default_elevation,
            tma_elevation: fc.default_elevation,
            ..ForceInputs::default()
        };
        Self {
            balance: BalanceController::new(fc.balance_pids),
            distribution: ForceDistribution::new(&geometry),
            components,
            inputs,
            support_percentage: 0.0,
            offset_clipped: false,
            warnings: SetpointWarning::empty(),
            published_warnings: SetpointWarning::empty(),
            applied: AxisForces::zeros(),
            mirror: MirrorForces::default(),
            setpoints: CylinderSetpoints::default(),
            settings,
            geometry,
            publisher,
            time,
        }
    }

    #[inline]
    pub fn component(&self, kind: ComponentKind) -> &ForceComponent {
        &self.components[kind as usize]
    }

    #[inline]
    fn component_mut(&mut self, kind: ComponentKind) -> &mut ForceComponent {
        &mut self.components[kind as usize]
    }

    #[inline]
    pub fn distribution(&self) -> &ForceDistribution {
        &self.distribution
    }

    /// Forces applied by the last cycle's setpoints.
    #[inline]
    pub fn applied_forces(&self) -> &AxisForces {
        &self.applied
    }

    /// Net forces and moments of [`applied_forces`](Self::applied_forces).
    #[inline]
    pub fn mirror_forces(&self) -> MirrorForces {
        self.mirror
    }

    #[inline]
    pub fn setpoints(&self) -> &CylinderSetpoints {
        &self.setpoints
    }

    #[inline]
    pub fn warnings(&self) -> SetpointWarning {
        self.warnings
    }

    #[inline]
    pub fn inputs(&self) -> &ForceInputs {
        &self.inputs
    }

    /// Disable and zero every component without a ramp, then clear the
    /// support percentage and the outputs.
    pub fn reset(&mut self) {
        for c in self.components.iter_mut() {
            c.halt();
        }
        self.balance.reset_all();
        self.support_percentage = 0.0;
        self.offset_clipped = false;
        self.warnings = SetpointWarning::empty();
        self.applied = AxisForces::zeros();
        self.mirror = MirrorForces::default();
        self.setpoints = CylinderSetpoints::default();
    }

    // ─── Inputs ─────────────────────────────────────────────────────

    pub fn set_sensor_sample(&mut self, sample: &SensorSample) {
        self.inputs.inclinometer_elevation = sample.elevation;
        self.inputs.temperature = sample.mirror_temperature;
        self.inputs.angular_acceleration = sample.angular_acceleration;
        self.inputs.angular_velocity = sample.angular_velocity;
    }

    pub fn set_tma_elevation(&mut self, elevation: f64) {
        self.inputs.tma_elevation = elevation;
    }

    pub fn set_tma_azimuth(&mut self, azimuth: f64) {
        self.inputs.tma_azimuth = azimuth;
    }

    pub fn set_hardpoint_forces(&mut self, forces: [f64; 6]) {
        self.inputs.hardpoint_forces = forces;
    }

    /// Elevation the elevation component uses [deg].
    pub fn elevation_angle(&self) -> f64 {
        if self.settings.force_controller.use_tma_elevation {
            self.inputs.tma_elevation
        } else {
            self.inputs.inclinometer_elevation
        }
    }

    // ─── Support percentage ─────────────────────────────────────────

    #[inline]
    pub fn support_percentage(&self) -> f64 {
        self.support_percentage
    }

    pub fn increment_support_percentage(&mut self) {
        let step = self.settings.force_controller.raise_increment_percentage;
        self.support_percentage = (self.support_percentage + step).min(1.0);
    }

    pub fn decrement_support_percentage(&mut self) {
        let step = self.settings.force_controller.lower_decrement_percentage;
        self.support_percentage = (self.support_percentage - step).max(0.0);
    }

    pub fn zero_support_percentage(&mut self) {
        self.support_percentage = 0.0;
    }

    pub fn fill_support_percentage(&mut self) {
        self.support_percentage = 1.0;
    }

    #[inline]
    pub fn support_percentage_filled(&self) -> bool {
        self.support_percentage >= 1.0
    }

    #[inline]
    pub fn support_percentage_zeroed(&self) -> bool {
        self.support_percentage <= 0.0
    }

    /// Every measured cylinder force within the following-error limit of
    /// its setpoint.
    pub fn following_error_in_tolerance(&self, readings: &IlcReadings) -> bool {
        let limit = self.settings.force_controller.following_error_limit;
        self.geometry.actuators().enumerate().all(|(id, a)| {
            let primary = readings.primary_measured[id] - self.setpoints.primary[id];
            let secondary = if a.orientation.has_secondary() {
                readings.secondary_measured[id] - self.setpoints.secondary[id]
            } else {
                0.0
            };
            primary.abs() <= limit && secondary.abs() <= limit
        })
    }

    // ─── Component commands ─────────────────────────────────────────

    fn ensure_enabled(&mut self, kind: ComponentKind) {
        let c = self.component_mut(kind);
        if !c.is_enabled() {
            c.enable();
        }
    }

    fn zero(&mut self, kind: ComponentKind) {
        let c = self.component_mut(kind);
        if c.is_enabled() {
            info!("Zeroing {} forces", kind.name());
            c.disable();
        }
    }

    pub fn apply_static_forces(&mut self) {
        info!("Applying static forces");
        let target = components::static_forces(&self.geometry, &self.settings.tables);
        self.ensure_enabled(ComponentKind::Static);
        self.component_mut(ComponentKind::Static).set_target(target);
    }

    pub fn zero_static_forces(&mut self) {
        self.zero(ComponentKind::Static);
    }

    /// Offsets are clipped against the offset limits before they become
    /// the target; clipping raises the offset-clip warning next cycle.
    pub fn apply_offset_forces(&mut self, mut forces: AxisForces) {
        info!("Applying offset forces");
        let limits = self.settings.force_controller.offset_component.limits;
        let mut clipped = false;
        for (id, _) in self.geometry.actuators().enumerate() {
            let (x, cx) = limits.x.coerce(forces.x[id]);
            let (y, cy) = limits.y.coerce(forces.y[id]);
            let (z, cz) = limits.z.coerce(forces.z[id]);
            forces.x[id] = x;
            forces.y[id] = y;
            forces.z[id] = z;
            clipped |= cx || cy || cz;
        }
        if clipped {
            warn!("Offset forces clipped to the offset limits");
        }
        self.offset_clipped = clipped;
        self.ensure_enabled(ComponentKind::Offset);
        self.component_mut(ComponentKind::Offset).set_target(forces);
    }

    pub fn apply_offset_forces_by_mirror_force(&mut self, mirror: &MirrorForces) {
        let forces = self.distribution.distribute(mirror);
        self.apply_offset_forces(forces);
    }

    pub fn zero_offset_forces(&mut self) {
        self.zero(ComponentKind::Offset);
    }

    pub fn apply_active_optic_forces(&mut self, forces: AxisForces) {
        info!("Applying active optic forces");
        self.ensure_enabled(ComponentKind::ActiveOptic);
        self.component_mut(ComponentKind::ActiveOptic).set_target(forces);
    }

    pub fn apply_active_optic_forces_by_bending_modes(&mut self, coefficients: &[f64]) -> Result<(), ForceError> {
        let forces = self.bending_mode_forces(coefficients)?;
        self.apply_active_optic_forces(forces);
        Ok(())
    }

    pub fn zero_active_optic_forces(&mut self) {
        self.zero(ComponentKind::ActiveOptic);
    }

    pub fn apply_aberration_forces(&mut self, forces: AxisForces) {
        info!("Applying aberration forces");
        self.ensure_enabled(ComponentKind::Aberration);
        self.component_mut(ComponentKind::Aberration).set_target(forces);
    }

    pub fn apply_aberration_forces_by_bending_modes(&mut self, coefficients: &[f64]) -> Result<(), ForceError> {
        let forces = self.bending_mode_forces(coefficients)?;
        self.apply_aberration_forces(forces);
        Ok(())
    }

    pub fn zero_aberration_forces(&mut self) {
        self.zero(ComponentKind::Aberration);
    }

    fn bending_mode_forces(&self, coefficients: &[f64]) -> Result<AxisForces, ForceError> {
        let coefficients: &[f64; BENDING_MODE_COUNT] =
            coefficients.try_into().map_err(|_| ForceError::WrongLength {
                expected: BENDING_MODE_COUNT,
                actual: coefficients.len(),
            })?;
        if let Some(i) = coefficients.iter().position(|c| !c.is_finite()) {
            return Err(ForceError::NotFinite(i));
        }
        Ok(AxisForces::from_z(self.geometry.bending_mode_forces(coefficients)))
    }

    pub fn apply_elevation_forces(&mut self) {
        self.ensure_enabled(ComponentKind::Elevation);
    }

    pub fn zero_elevation_forces(&mut self) {
        self.zero(ComponentKind::Elevation);
    }

    pub fn apply_azimuth_forces(&mut self) {
        self.ensure_enabled(ComponentKind::Azimuth);
    }

    pub fn zero_azimuth_forces(&mut self) {
        self.zero(ComponentKind::Azimuth);
    }

    pub fn apply_thermal_forces(&mut self) {
        self.ensure_enabled(ComponentKind::Thermal);
    }

    pub fn zero_thermal_forces(&mut self) {
        self.zero(ComponentKind::Thermal);
    }

    pub fn apply_dynamic_forces(&mut self) {
        self.ensure_enabled(ComponentKind::Dynamic);
    }

    pub fn zero_dynamic_forces(&mut self) {
        self.zero(ComponentKind::Dynamic);
    }

    /// Enable hardpoint corrections. Restarts the PIDs from the profile.
    pub fn apply_balance_forces(&mut self) {
        if !self.component(ComponentKind::Balance).is_enabled() {
            info!("Enabling hardpoint corrections");
            self.component_mut(ComponentKind::Balance).enable();
            self.balance.reset_all();
        }
    }

    pub fn zero_balance_forces(&mut self) {
        self.zero(ComponentKind::Balance);
    }

    pub fn pid_parameters(&self, pid: u8) -> Result<PidParameters, ForceError> {
        self.balance.pid(pid).map(|p| *p.parameters())
    }

    pub fn update_pid(&mut self, pid: u8, parameters: PidParameters) -> Result<(), ForceError> {
        info!(pid, ?parameters, "Updating balance PID");
        self.balance.update_pid(pid, parameters)
    }

    pub fn reset_pid(&mut self, pid: u8) -> Result<(), ForceError> {
        info!(pid, "Restoring balance PID gains");
        self.balance.reset_pid(pid)
    }

    // ─── Cycle ──────────────────────────────────────────────────────

    /// Advance every component, sum, check and convert to setpoints.
    pub fn update_applied_forces(&mut self, safety: &mut SafetyController) {
        self.refresh_sensor_targets();

        let mut any_clipped = false;
        let mut clipped_components = Vec::new();
        for c in self.components.iter_mut() {
            let active = c.is_active();
            let clipped = c.update();
            if active {
                safety.force_controller_notify(c.kind().clipping_fault(), clipped);
            }
            if clipped {
                any_clipped = true;
                clipped_components.push(c.kind().name());
            }
        }

        let mut sum = AxisForces::zeros();
        for c in self.components.iter().filter(|c| c.is_active()) {
            let scale = if c.kind() == ComponentKind::Elevation {
                self.support_percentage
            } else {
                1.0
            };
            sum.add_scaled(c.current(), scale);
        }

        let fc = &self.settings.force_controller;
        let mut warnings = SetpointWarning::empty();
        if any_clipped {
            warnings |= SetpointWarning::ANY_COMPONENT_CLIP;
        }
        if std::mem::take(&mut self.offset_clipped) {
            warnings |= SetpointWarning::ANY_OFFSET_CLIP;
        }

        // Moments
        let net = self.distribution.mirror_forces(&sum);
        let (mx, x_bad) = fc.x_moment_limits.coerce(net.mx);
        let (my, y_bad) = fc.y_moment_limits.coerce(net.my);
        let (mz, z_bad) = fc.z_moment_limits.coerce(net.mz);
        warnings.set(SetpointWarning::X_MOMENT, x_bad);
        warnings.set(SetpointWarning::Y_MOMENT, y_bad);
        warnings.set(SetpointWarning::Z_MOMENT, z_bad);
        safety.force_controller_notify(FaultCode::ForceControllerXMomentLimit, x_bad);
        safety.force_controller_notify(FaultCode::ForceControllerYMomentLimit, y_bad);
        safety.force_controller_notify(FaultCode::ForceControllerZMomentLimit, z_bad);
        if x_bad || y_bad || z_bad {
            warn!(mx = net.mx, my = net.my, mz = net.mz, "Mirror moments out of range, correcting");
            let correction = self.distribution.distribute(&MirrorForces {
                mx: mx - net.mx,
                my: my - net.my,
                mz: mz - net.mz,
                ..MirrorForces::default()
            });
            sum.add_scaled(&correction, 1.0);
        }

        // Cylinders
        let conversion = checks::to_cylinders(
            &self.geometry,
            &sum,
            &fc.primary_cylinder_limits,
            &fc.secondary_cylinder_limits,
        );
        let safety_limit = !conversion.clipped.is_empty();
        warnings.set(SetpointWarning::ANY_SAFETY_LIMIT, safety_limit);
        safety.force_controller_notify(FaultCode::ForceControllerSafetyLimit, safety_limit);

        // Neighbors and magnitude
        let near = checks::near_neighbor_violations(
            &self.geometry,
            &conversion.applied.z,
            fc.mirror_weight,
            fc.near_neighbor_factor,
        );
        warnings.set(SetpointWarning::ANY_NEAR_NEIGHBOR, !near.is_empty());
        safety.force_controller_notify(FaultCode::ForceControllerNearNeighborCheck, !near.is_empty());

        let magnitude =
            checks::magnitude_violation(&conversion.applied, fc.mirror_weight, fc.mirror_weight_factor);
        warnings.set(SetpointWarning::MAGNITUDE, magnitude);
        safety.force_controller_notify(FaultCode::ForceControllerMagnitudeLimit, magnitude);

        let far = checks::far_neighbor_violations(&self.geometry, &conversion.applied, fc.far_neighbor_factor);
        warnings.set(SetpointWarning::ANY_FAR_NEIGHBOR, !far.is_empty());
        safety.force_controller_notify(FaultCode::ForceControllerFarNeighborCheck, !far.is_empty());

        self.setpoints = conversion.setpoints;
        self.applied = conversion.applied;
        self.mirror = self.distribution.mirror_forces(&self.applied);
        self.warnings = warnings;

        if warnings != self.published_warnings {
            if warnings.has_critical() {
                warn!(?warnings, "Critical force setpoint warning");
            } else {
                debug!(?warnings, "Force setpoint warning changed");
            }
            self.publisher.publish(Event::ForceSetpointWarning {
                timestamp: self.time.now(),
                flags: warnings,
                safety_limit: conversion.clipped,
                near_neighbor: near,
                far_neighbor: far,
                clipped_components,
            });
            self.published_warnings = warnings;
        }
    }

    fn refresh_sensor_targets(&mut self) {
        let weight = self.settings.force_controller.mirror_weight;
        let tables = &self.settings.tables;
        let geometry = &self.geometry;

        if self.components[ComponentKind::Elevation as usize].is_enabled() {
            let zenith = 90.0 - self.elevation_angle();
            let target = components::elevation_forces(geometry, weight, zenith);
            self.components[ComponentKind::Elevation as usize].set_target(target);
        }
        if self.components[ComponentKind::Azimuth as usize].is_enabled() {
            let target = components::azimuth_forces(geometry, tables, self.inputs.tma_azimuth);
            self.components[ComponentKind::Azimuth as usize].set_target(target);
        }
        if self.components[ComponentKind::Thermal as usize].is_enabled() {
            let target = components::thermal_forces(geometry, tables, self.inputs.temperature);
            self.components[ComponentKind::Thermal as usize].set_target(target);
        }
        if self.components[ComponentKind::Dynamic as usize].is_enabled() {
            let target = components::dynamic_forces(
                geometry,
                tables,
                self.inputs.angular_acceleration,
                self.inputs.angular_velocity,
            );
            self.components[ComponentKind::Dynamic as usize].set_target(target);
        }
        if self.components[ComponentKind::Balance as usize].is_enabled() {
            let measured = components::hardpoint_mirror_forces(
                &self.settings.force_controller.hardpoint_force_matrix,
                &self.inputs.hardpoint_forces,
            );
            let target = self.balance.process(&measured, &self.distribution);
            self.components[ComponentKind::Balance as usize].set_target(target);
        }
    }
}

impl std::fmt::Debug for ForceController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ForceController")
            .field("support_percentage", &self.support_percentage)
            .field("warnings", &self.warnings)
            .field("mirror", &self.mirror)
            .finish_non_exhaustive()
    }
}
