//! Rate-limited force component.
//!
//! Every contributor to the net force (static, offset, elevation, ...) is a
//! [`ForceComponent`]: a `target` set by commands or sensors, a `current`
//! value that ramps toward it at a bounded rate per cycle, and a lifecycle
//! `Initialising → Disabled ⇄ Enabled → Disabling → Disabled`.
//!
//! The ramp is uniform: the largest per-entry offset decides the scale, so
//! every entry reaches its target in the same cycle and none overshoots.

use m1m3_common::actuator::{ActuatorArray, ActuatorId};
use m1m3_common::fault::FaultCode;
use m1m3_common::settings::ComponentSettings;
use tracing::{debug, warn};

use super::AxisForces;

/// Which force component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentKind {
    Static,
    Offset,
    ActiveOptic,
    Aberration,
    Elevation,
    Azimuth,
    Thermal,
    Dynamic,
    Balance,
}

impl ComponentKind {
    /// All kinds in summation order.
    pub const ALL: [Self; 9] = [
        Self::Static,
        Self::Offset,
        Self::ActiveOptic,
        Self::Aberration,
        Self::Elevation,
        Self::Azimuth,
        Self::Thermal,
        Self::Dynamic,
        Self::Balance,
    ];

    /// Component name.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Static => "Static",
            Self::Offset => "Offset",
            Self::ActiveOptic => "ActiveOptic",
            Self::Aberration => "Aberration",
            Self::Elevation => "Elevation",
            Self::Azimuth => "Azimuth",
            Self::Thermal => "Thermal",
            Self::Dynamic => "Dynamic",
            Self::Balance => "Balance",
        }
    }

    /// Fault raised when this component clips.
    pub const fn clipping_fault(self) -> FaultCode {
        match self {
            Self::Static => FaultCode::ForceControllerStaticForceClipping,
            Self::Offset => FaultCode::ForceControllerOffsetForceClipping,
            Self::ActiveOptic => FaultCode::ForceControllerActiveOpticForceClipping,
            Self::Aberration => FaultCode::ForceControllerAberrationForceClipping,
            Self::Elevation => FaultCode::ForceControllerElevationForceClipping,
            Self::Azimuth => FaultCode::ForceControllerAzimuthForceClipping,
            Self::Thermal => FaultCode::ForceControllerThermalForceClipping,
            Self::Dynamic => FaultCode::ForceControllerDynamicForceClipping,
            Self::Balance => FaultCode::ForceControllerBalanceForceClipping,
        }
    }
}

/// Component lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ComponentState {
    #[default]
    Initialising,
    Disabled,
    Enabled,
    Disabling,
}

/// One force contributor.
#[derive(Debug, Clone)]
pub struct ForceComponent {
    kind: ComponentKind,
    state: ComponentState,
    settings: ComponentSettings,
    current: AxisForces,
    target: AxisForces,
    clipped: ActuatorArray<bool>,
    any_clipped: bool,
}

impl ForceComponent {
    /// New component in `Initialising`.
    pub fn new(kind: ComponentKind, settings: ComponentSettings) -> Self {
        Self {
            kind,
            state: ComponentState::Initialising,
            settings,
            current: AxisForces::zeros(),
            target: AxisForces::zeros(),
            clipped: ActuatorArray::splat(false),
            any_clipped: false,
        }
    }

    #[inline]
    pub fn kind(&self) -> ComponentKind {
        self.kind
    }

    #[inline]
    pub fn state(&self) -> ComponentState {
        self.state
    }

    #[inline]
    pub fn settings(&self) -> &ComponentSettings {
        &self.settings
    }

    /// Start contributing; the target starts at zero.
    pub fn enable(&mut self) {
        debug!("{} force component enabled", self.kind.name());
        self.state = ComponentState::Enabled;
        self.target = AxisForces::zeros();
    }

    /// Ramp to zero, then go `Disabled`.
    pub fn disable(&mut self) {
        debug!("{} force component disabling", self.kind.name());
        self.state = ComponentState::Disabling;
        self.target = AxisForces::zeros();
    }

    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.state == ComponentState::Enabled
    }

    #[inline]
    pub fn is_disabling(&self) -> bool {
        self.state == ComponentState::Disabling
    }

    /// Contributes to the net force this cycle.
    #[inline]
    pub fn is_active(&self) -> bool {
        matches!(
            self.state,
            ComponentState::Enabled | ComponentState::Disabling
        )
    }

    /// Zero current and target without a ramp.
    pub fn reset(&mut self) {
        self.current = AxisForces::zeros();
        self.target = AxisForces::zeros();
        self.clipped = ActuatorArray::splat(false);
        self.any_clipped = false;
    }

    /// Zero everything and go `Disabled` at once.
    pub fn halt(&mut self) {
        self.state = ComponentState::Disabled;
        self.reset();
    }

    /// Set the target. Ignored unless enabled.
    pub fn set_target(&mut self, target: AxisForces) {
        if self.is_enabled() {
            self.target = target;
        }
    }

    #[inline]
    pub fn current(&self) -> &AxisForces {
        &self.current
    }

    #[inline]
    pub fn target(&self) -> &AxisForces {
        &self.target
    }

    /// `target - current`.
    pub fn offset(&self) -> AxisForces {
        let mut offset = self.target;
        offset.add_scaled(&self.current, -1.0);
        offset
    }

    /// Actuators clipped by the last update.
    #[inline]
    pub fn clipped(&self) -> &ActuatorArray<bool> {
        &self.clipped
    }

    /// The last update clipped at least one value.
    #[inline]
    pub fn any_clipped(&self) -> bool {
        self.any_clipped
    }

    /// Advance one cycle. Returns whether any value was clipped.
    pub fn update(&mut self) -> bool {
        match self.state {
            ComponentState::Initialising => {
                self.state = ComponentState::Disabled;
                false
            }
            ComponentState::Disabled => false,
            ComponentState::Disabling if self.current.max_abs() < self.settings.near_zero_value => {
                debug!("{} force component disabled", self.kind.name());
                self.halt();
                false
            }
            ComponentState::Enabled | ComponentState::Disabling => {
                self.ramp();
                self.clip()
            }
        }
    }

    fn ramp(&mut self) {
        let offset = self.offset();
        let largest = offset.max_abs();
        let scalar = largest / self.settings.max_rate_of_change;
        if scalar > 1.0 {
            self.current.add_scaled(&offset, 1.0 / scalar);
        } else {
            self.current = self.target;
        }
    }

    fn clip(&mut self) -> bool {
        let limits = self.settings.limits;
        self.any_clipped = false;
        for id in ActuatorId::all() {
            let (x, cx) = limits.x.coerce(self.current.x[id]);
            let (y, cy) = limits.y.coerce(self.current.y[id]);
            let (z, cz) = limits.z.coerce(self.current.z[id]);
            self.current.x[id] = x;
            self.current.y[id] = y;
            self.current.z[id] = z;
            let clipped = cx || cy || cz;
            self.clipped[id] = clipped;
            self.any_clipped |= clipped;
        }
        if self.any_clipped {
            warn!("{} force component clipped", self.kind.name());
        }
        self.any_clipped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use m1m3_common::settings::AxisLimits;

    fn settings(rate: f64) -> ComponentSettings {
        ComponentSettings {
            max_rate_of_change: rate,
            near_zero_value: 0.5,
            limits: AxisLimits::lateral_vertical(1000.0, 1000.0),
        }
    }

    fn enabled(rate: f64) -> ForceComponent {
        let mut c = ForceComponent::new(ComponentKind::Offset, settings(rate));
        c.update();
        assert_eq!(c.state(), ComponentState::Disabled);
        c.enable();
        c
    }

    #[test]
    fn initialising_goes_disabled_on_first_update() {
        let mut c = ForceComponent::new(ComponentKind::Static, settings(10.0));
        assert_eq!(c.state(), ComponentState::Initialising);
        assert!(!c.is_active());
        c.update();
        assert_eq!(c.state(), ComponentState::Disabled);
    }

    #[test]
    fn uniform_ramp_reaches_target_together() {
        let mut c = enabled(10.0);
        let id_a = ActuatorId::new(3).unwrap();
        let id_b = ActuatorId::new(4).unwrap();
        let mut target = AxisForces::zeros();
        target.z[id_a] = 40.0;
        target.x[id_b] = -20.0;
        c.set_target(target);

        c.update();
        assert!((c.current().z[id_a] - 10.0).abs() < 1e-9);
        assert!((c.current().x[id_b] + 5.0).abs() < 1e-9);

        for _ in 0..3 {
            c.update();
        }
        assert_eq!(c.current(), &target);
        c.update();
        assert_eq!(c.current(), &target);
    }

    #[test]
    fn set_target_ignored_when_not_enabled() {
        let mut c = ForceComponent::new(ComponentKind::Offset, settings(10.0));
        c.set_target(AxisForces::from_z(ActuatorArray::splat(5.0)));
        assert_eq!(c.target().max_abs(), 0.0);
    }

    #[test]
    fn disabling_is_monotonic_and_ends_disabled() {
        let mut c = enabled(25.0);
        c.set_target(AxisForces::from_z(ActuatorArray::splat(100.0)));
        for _ in 0..4 {
            c.update();
        }
        assert_eq!(c.current().z.max_abs(), 100.0);

        c.disable();
        let mut last = c.current().max_abs();
        while c.state() == ComponentState::Disabling {
            c.update();
            let now = c.current().max_abs();
            assert!(now <= last);
            assert!(last - now <= 25.0 + 1e-9);
            last = now;
        }
        assert_eq!(c.state(), ComponentState::Disabled);
        assert_eq!(c.current().max_abs(), 0.0);
    }

    #[test]
    fn clipping_is_reported_per_actuator() {
        let mut c = enabled(10_000.0);
        let id = ActuatorId::new(10).unwrap();
        let mut target = AxisForces::zeros();
        target.z[id] = 1500.0;
        c.set_target(target);
        assert!(c.update());
        assert_eq!(c.current().z[id], 1000.0);
        assert!(c.clipped()[id]);
        assert!(!c.clipped()[ActuatorId::new(11).unwrap()]);
        assert_eq!(
            c.kind().clipping_fault(),
            FaultCode::ForceControllerOffsetForceClipping
        );
    }
}
