//! Settings profile structures.
//!
//! A profile is selected by `Start(settingsToApply)` and stays immutable for
//! the session. Profiles are TOML files named `<profile>.toml` in the settings
//! directory; the `Default` profile also exists in memory without a file.
//! Every field has a serde default so partial profiles load.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::actuator::ActuatorArray;
use crate::config::{ConfigError, ConfigLoader, Validate};
use crate::consts::{DEFAULT_SETTINGS_PROFILE, HP_COUNT, SAFETY_WINDOW_MAX};

// ─── Limits ─────────────────────────────────────────────────────────

/// Closed range `[low, high]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Limits {
    /// Lower bound.
    pub low: f64,
    /// Upper bound.
    pub high: f64,
}

impl Limits {
    /// Build a range. `low` must not exceed `high`.
    pub const fn new(low: f64, high: f64) -> Self {
        Self { low, high }
    }

    /// Symmetric range `[-bound, bound]`.
    pub const fn symmetric(bound: f64) -> Self {
        Self {
            low: -bound,
            high: bound,
        }
    }

    /// `value` lies inside the range.
    #[inline]
    pub fn contains(&self, value: f64) -> bool {
        value >= self.low && value <= self.high
    }

    /// Clamp `value` into the range. Returns the clamped value and whether
    /// clamping changed it.
    #[inline]
    pub fn coerce(&self, value: f64) -> (f64, bool) {
        if value < self.low {
            (self.low, true)
        } else if value > self.high {
            (self.high, true)
        } else {
            (value, false)
        }
    }

    fn check(&self, name: &str) -> Result<(), String> {
        if !(self.low.is_finite() && self.high.is_finite()) || self.low > self.high {
            return Err(format!(
                "{name}: invalid limits [{}, {}]",
                self.low, self.high
            ));
        }
        Ok(())
    }
}

/// Per-axis force limits for a component.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AxisLimits {
    /// X axis limits [N].
    pub x: Limits,
    /// Y axis limits [N].
    pub y: Limits,
    /// Z axis limits [N].
    pub z: Limits,
}

impl AxisLimits {
    /// Same symmetric bound on X and Y, another on Z.
    pub const fn lateral_vertical(lateral: f64, vertical: f64) -> Self {
        Self {
            x: Limits::symmetric(lateral),
            y: Limits::symmetric(lateral),
            z: Limits::symmetric(vertical),
        }
    }
}

// ─── Force Components ───────────────────────────────────────────────

/// Ramp and clipping parameters shared by every force component.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ComponentSettings {
    /// Largest change of any axis value per cycle [N].
    #[serde(default = "default_max_rate_of_change")]
    pub max_rate_of_change: f64,

    /// Below this magnitude a disabling component counts as zero [N].
    #[serde(default = "default_near_zero_value")]
    pub near_zero_value: f64,

    /// Clipping limits applied to `current` after each update.
    #[serde(default = "default_component_limits")]
    pub limits: AxisLimits,
}

fn default_max_rate_of_change() -> f64 {
    100.0
}
fn default_near_zero_value() -> f64 {
    1.0
}
fn default_component_limits() -> AxisLimits {
    AxisLimits::lateral_vertical(1000.0, 2000.0)
}

impl Default for ComponentSettings {
    fn default() -> Self {
        Self {
            max_rate_of_change: default_max_rate_of_change(),
            near_zero_value: default_near_zero_value(),
            limits: default_component_limits(),
        }
    }
}

impl ComponentSettings {
    const fn with_limits(limits: AxisLimits) -> Self {
        Self {
            max_rate_of_change: 100.0,
            near_zero_value: 1.0,
            limits,
        }
    }

    fn check(&self, name: &str) -> Result<(), String> {
        if !(self.max_rate_of_change > 0.0) {
            return Err(format!(
                "{name}.max_rate_of_change {} must be positive",
                self.max_rate_of_change
            ));
        }
        if !(self.near_zero_value > 0.0) {
            return Err(format!(
                "{name}.near_zero_value {} must be positive",
                self.near_zero_value
            ));
        }
        self.limits.x.check(&format!("{name}.limits.x"))?;
        self.limits.y.check(&format!("{name}.limits.y"))?;
        self.limits.z.check(&format!("{name}.limits.z"))
    }
}

/// Gains of one balance PID, in the bus representation.
///
/// `n` is the derivative filter coefficient; the filter time constant is
/// `1 / n` (`n = 0` disables the filter).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PidParameters {
    /// Sample period [s].
    pub timestep: f64,
    /// Proportional gain.
    pub p: f64,
    /// Integral gain.
    pub i: f64,
    /// Derivative gain.
    pub d: f64,
    /// Derivative filter coefficient.
    pub n: f64,
}

impl Default for PidParameters {
    fn default() -> Self {
        Self {
            timestep: 0.02,
            p: 0.5,
            i: 0.2,
            d: 0.0,
            n: 10.0,
        }
    }
}

impl PidParameters {
    /// Check gains and timestep.
    pub fn check(&self) -> Result<(), String> {
        if !(self.timestep > 0.0) {
            return Err(format!("PID timestep {} must be positive", self.timestep));
        }
        for (name, v) in [("p", self.p), ("i", self.i), ("d", self.d), ("n", self.n)] {
            if !v.is_finite() || v < 0.0 {
                return Err(format!("PID {name} {v} must be finite and non-negative"));
            }
        }
        Ok(())
    }
}

/// Per-actuator lookup tables for the table-driven components.
///
/// All tables default to zero.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ForceTables {
    /// Static forces applied at raise completion [N].
    #[serde(default)]
    pub static_x: ActuatorArray<f64>,
    #[serde(default)]
    pub static_y: ActuatorArray<f64>,
    #[serde(default)]
    pub static_z: ActuatorArray<f64>,

    /// Azimuth polynomial coefficients, lowest order first. Angle in degrees.
    #[serde(default)]
    pub azimuth_x: ActuatorArray<[f64; 4]>,
    #[serde(default)]
    pub azimuth_y: ActuatorArray<[f64; 4]>,
    #[serde(default)]
    pub azimuth_z: ActuatorArray<[f64; 4]>,

    /// Thermal polynomial coefficients, lowest order first. Temperature in °C.
    #[serde(default)]
    pub thermal_x: ActuatorArray<[f64; 4]>,
    #[serde(default)]
    pub thermal_y: ActuatorArray<[f64; 4]>,
    #[serde(default)]
    pub thermal_z: ActuatorArray<[f64; 4]>,

    /// Angular acceleration terms `[ax, ay, az]` per output axis [N·s²/rad].
    #[serde(default)]
    pub acceleration_x: ActuatorArray<[f64; 3]>,
    #[serde(default)]
    pub acceleration_y: ActuatorArray<[f64; 3]>,
    #[serde(default)]
    pub acceleration_z: ActuatorArray<[f64; 3]>,

    /// Angular velocity squared terms `[wx², wy², wz²]` per output axis [N·s²/rad²].
    #[serde(default)]
    pub velocity_x: ActuatorArray<[f64; 3]>,
    #[serde(default)]
    pub velocity_y: ActuatorArray<[f64; 3]>,
    #[serde(default)]
    pub velocity_z: ActuatorArray<[f64; 3]>,
}

/// Force controller settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForceControllerSettings {
    /// Mirror weight carried by the force actuators [N].
    #[serde(default = "default_mirror_weight")]
    pub mirror_weight: f64,

    /// Take elevation from the TMA sample instead of the inclinometer.
    #[serde(default)]
    pub use_tma_elevation: bool,

    /// Inclinometer reading assumed by the simulated transport [deg].
    #[serde(default = "default_elevation")]
    pub default_elevation: f64,

    #[serde(default = "default_static_settings")]
    pub static_component: ComponentSettings,
    #[serde(default = "default_offset_settings")]
    pub offset_component: ComponentSettings,
    #[serde(default = "default_optic_settings")]
    pub active_optic_component: ComponentSettings,
    #[serde(default = "default_optic_settings")]
    pub aberration_component: ComponentSettings,
    #[serde(default = "default_elevation_settings")]
    pub elevation_component: ComponentSettings,
    #[serde(default)]
    pub azimuth_component: ComponentSettings,
    #[serde(default)]
    pub thermal_component: ComponentSettings,
    #[serde(default)]
    pub dynamic_component: ComponentSettings,
    #[serde(default)]
    pub balance_component: ComponentSettings,

    /// Primary cylinder setpoint limits [N].
    #[serde(default = "default_primary_limits")]
    pub primary_cylinder_limits: Limits,
    /// Secondary cylinder setpoint limits [N].
    #[serde(default = "default_secondary_limits")]
    pub secondary_cylinder_limits: Limits,

    /// Net moment limits [N·m].
    #[serde(default = "default_moment_limits")]
    pub x_moment_limits: Limits,
    #[serde(default = "default_moment_limits")]
    pub y_moment_limits: Limits,
    #[serde(default = "default_moment_limits")]
    pub z_moment_limits: Limits,

    /// Near-neighbor tolerance as a fraction of the nominal actuator load.
    #[serde(default = "default_neighbor_factor")]
    pub near_neighbor_factor: f64,
    /// Far-neighbor tolerance as a fraction of the global average magnitude.
    #[serde(default = "default_neighbor_factor")]
    pub far_neighbor_factor: f64,
    /// Total force magnitude limit as a multiple of the mirror weight.
    #[serde(default = "default_magnitude_factor")]
    pub mirror_weight_factor: f64,

    /// Support percentage increment per raise cycle.
    #[serde(default = "default_support_step")]
    pub raise_increment_percentage: f64,
    /// Support percentage decrement per lower cycle.
    #[serde(default = "default_support_step")]
    pub lower_decrement_percentage: f64,

    /// Largest tolerated |measured - commanded| per cylinder [N].
    #[serde(default = "default_following_error_limit")]
    pub following_error_limit: f64,

    /// Gains of the fx, fy, fz, mx, my, mz balance PIDs.
    #[serde(default = "default_balance_pids")]
    pub balance_pids: [PidParameters; 6],

    /// Maps hardpoint axial forces to mirror forces (fx, fy, fz, mx, my, mz).
    #[serde(default = "default_hardpoint_force_matrix")]
    pub hardpoint_force_matrix: [[f64; HP_COUNT]; 6],
}

fn default_mirror_weight() -> f64 {
    170_000.0
}
fn default_elevation() -> f64 {
    90.0
}
fn default_static_settings() -> ComponentSettings {
    ComponentSettings::with_limits(AxisLimits::lateral_vertical(500.0, 1000.0))
}
fn default_offset_settings() -> ComponentSettings {
    ComponentSettings::with_limits(AxisLimits::lateral_vertical(500.0, 1000.0))
}
fn default_optic_settings() -> ComponentSettings {
    ComponentSettings::with_limits(AxisLimits::lateral_vertical(0.0, 1000.0))
}
fn default_elevation_settings() -> ComponentSettings {
    ComponentSettings {
        max_rate_of_change: 2000.0,
        near_zero_value: 1.0,
        limits: AxisLimits::lateral_vertical(2500.0, 3500.0),
    }
}
fn default_primary_limits() -> Limits {
    Limits::new(-1500.0, 4000.0)
}
fn default_secondary_limits() -> Limits {
    Limits::symmetric(2500.0)
}
fn default_moment_limits() -> Limits {
    Limits::symmetric(20_000.0)
}
fn default_neighbor_factor() -> f64 {
    0.6
}
fn default_magnitude_factor() -> f64 {
    1.5
}
fn default_support_step() -> f64 {
    0.01
}
fn default_following_error_limit() -> f64 {
    50.0
}
fn default_balance_pids() -> [PidParameters; 6] {
    [PidParameters::default(); 6]
}
fn default_hardpoint_force_matrix() -> [[f64; HP_COUNT]; 6] {
    let mut m = [[0.0; HP_COUNT]; 6];
    for (i, row) in m.iter_mut().enumerate() {
        row[i] = 1.0;
    }
    m
}

impl Default for ForceControllerSettings {
    fn default() -> Self {
        Self {
            mirror_weight: default_mirror_weight(),
            use_tma_elevation: false,
            default_elevation: default_elevation(),
            static_component: default_static_settings(),
            offset_component: default_offset_settings(),
            active_optic_component: default_optic_settings(),
            aberration_component: default_optic_settings(),
            elevation_component: default_elevation_settings(),
            azimuth_component: ComponentSettings::default(),
            thermal_component: ComponentSettings::default(),
            dynamic_component: ComponentSettings::default(),
            balance_component: ComponentSettings::default(),
            primary_cylinder_limits: default_primary_limits(),
            secondary_cylinder_limits: default_secondary_limits(),
            x_moment_limits: default_moment_limits(),
            y_moment_limits: default_moment_limits(),
            z_moment_limits: default_moment_limits(),
            near_neighbor_factor: default_neighbor_factor(),
            far_neighbor_factor: default_neighbor_factor(),
            mirror_weight_factor: default_magnitude_factor(),
            raise_increment_percentage: default_support_step(),
            lower_decrement_percentage: default_support_step(),
            following_error_limit: default_following_error_limit(),
            balance_pids: default_balance_pids(),
            hardpoint_force_matrix: default_hardpoint_force_matrix(),
        }
    }
}

impl Validate for ForceControllerSettings {
    fn validate(&self) -> Result<(), String> {
        if !(self.mirror_weight > 0.0) {
            return Err(format!(
                "mirror_weight {} must be positive",
                self.mirror_weight
            ));
        }
        if !(-90.0..=90.0).contains(&self.default_elevation) {
            return Err(format!(
                "default_elevation {} out of range [-90, 90]",
                self.default_elevation
            ));
        }
        self.static_component.check("static_component")?;
        self.offset_component.check("offset_component")?;
        self.active_optic_component.check("active_optic_component")?;
        self.aberration_component.check("aberration_component")?;
        self.elevation_component.check("elevation_component")?;
        self.azimuth_component.check("azimuth_component")?;
        self.thermal_component.check("thermal_component")?;
        self.dynamic_component.check("dynamic_component")?;
        self.balance_component.check("balance_component")?;
        self.primary_cylinder_limits.check("primary_cylinder_limits")?;
        self.secondary_cylinder_limits.check("secondary_cylinder_limits")?;
        self.x_moment_limits.check("x_moment_limits")?;
        self.y_moment_limits.check("y_moment_limits")?;
        self.z_moment_limits.check("z_moment_limits")?;
        for (name, v) in [
            ("near_neighbor_factor", self.near_neighbor_factor),
            ("far_neighbor_factor", self.far_neighbor_factor),
            ("mirror_weight_factor", self.mirror_weight_factor),
            ("following_error_limit", self.following_error_limit),
        ] {
            if !(v > 0.0) {
                return Err(format!("{name} {v} must be positive"));
            }
        }
        for (name, v) in [
            ("raise_increment_percentage", self.raise_increment_percentage),
            ("lower_decrement_percentage", self.lower_decrement_percentage),
        ] {
            if !(v > 0.0 && v <= 1.0) {
                return Err(format!("{name} {v} out of range (0, 1]"));
            }
        }
        for pid in &self.balance_pids {
            pid.check()?;
        }
        Ok(())
    }
}

// ─── Hardpoints ─────────────────────────────────────────────────────

/// Hardpoint position controller settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionControllerSettings {
    /// Encoder steps per meter of hardpoint travel.
    #[serde(default = "default_steps_per_meter")]
    pub steps_per_meter: f64,

    /// Largest move per cycle [steps].
    #[serde(default = "default_max_steps_per_cycle")]
    pub max_steps_per_cycle: i32,

    /// Chase gain [steps/N].
    #[serde(default = "default_chase_gain")]
    pub chase_gain: f64,

    /// Reference encoder positions [steps].
    #[serde(default)]
    pub reference_position: [i32; HP_COUNT],

    /// Hardpoint force tolerance while raising [N].
    #[serde(default = "default_raise_force_limits")]
    pub raise_force_limits: Limits,

    /// Hardpoint force tolerance while lowering [N].
    #[serde(default = "default_lower_force_limits")]
    pub lower_force_limits: Limits,

    /// Travel of the TestHardpoint excursion [steps].
    #[serde(default = "default_test_travel")]
    pub test_travel_steps: i32,

    /// Maps the mirror displacement (x, y, z [m], rx, ry, rz [rad]) to
    /// hardpoint displacements [m].
    #[serde(default = "default_kinematics")]
    pub kinematics: [[f64; 6]; HP_COUNT],
}

fn default_steps_per_meter() -> f64 {
    31_800_000.0
}
fn default_max_steps_per_cycle() -> i32 {
    250
}
fn default_chase_gain() -> f64 {
    0.5
}
fn default_raise_force_limits() -> Limits {
    Limits::symmetric(3000.0)
}
fn default_lower_force_limits() -> Limits {
    Limits::symmetric(3000.0)
}
fn default_test_travel() -> i32 {
    1000
}
fn default_kinematics() -> [[f64; 6]; HP_COUNT] {
    let mut m = [[0.0; 6]; HP_COUNT];
    for (i, row) in m.iter_mut().enumerate() {
        row[i] = 1.0;
    }
    m
}

impl Default for PositionControllerSettings {
    fn default() -> Self {
        Self {
            steps_per_meter: default_steps_per_meter(),
            max_steps_per_cycle: default_max_steps_per_cycle(),
            chase_gain: default_chase_gain(),
            reference_position: [0; HP_COUNT],
            raise_force_limits: default_raise_force_limits(),
            lower_force_limits: default_lower_force_limits(),
            test_travel_steps: default_test_travel(),
            kinematics: default_kinematics(),
        }
    }
}

impl Validate for PositionControllerSettings {
    fn validate(&self) -> Result<(), String> {
        if !(self.steps_per_meter > 0.0) {
            return Err(format!(
                "steps_per_meter {} must be positive",
                self.steps_per_meter
            ));
        }
        if self.max_steps_per_cycle <= 0 {
            return Err(format!(
                "max_steps_per_cycle {} must be positive",
                self.max_steps_per_cycle
            ));
        }
        if !(self.chase_gain >= 0.0) {
            return Err(format!("chase_gain {} must be >= 0", self.chase_gain));
        }
        if self.test_travel_steps <= 0 {
            return Err(format!(
                "test_travel_steps {} must be positive",
                self.test_travel_steps
            ));
        }
        self.raise_force_limits.check("raise_force_limits")?;
        self.lower_force_limits.check("lower_force_limits")
    }
}

// ─── Safety ─────────────────────────────────────────────────────────

/// Which force-controller conditions escalate to a fault.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForceControllerFaults {
    pub fault_on_safety_limit: bool,
    pub fault_on_x_moment: bool,
    pub fault_on_y_moment: bool,
    pub fault_on_z_moment: bool,
    pub fault_on_near_neighbor: bool,
    pub fault_on_magnitude: bool,
    pub fault_on_far_neighbor: bool,
    pub fault_on_elevation_clipping: bool,
    pub fault_on_azimuth_clipping: bool,
    pub fault_on_thermal_clipping: bool,
    pub fault_on_balance_clipping: bool,
    pub fault_on_dynamic_clipping: bool,
    pub fault_on_active_optic_clipping: bool,
    pub fault_on_static_clipping: bool,
    pub fault_on_aberration_clipping: bool,
    pub fault_on_offset_clipping: bool,
}

/// Timeout handling of one automatic operation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OperationTimeout {
    /// Fault when the operation times out.
    #[serde(default)]
    pub fault_on_timeout: bool,
    /// Operation duration limit [s].
    #[serde(default = "default_operation_timeout")]
    pub timeout_s: f64,
}

fn default_operation_timeout() -> f64 {
    300.0
}

impl Default for OperationTimeout {
    fn default() -> Self {
        Self {
            fault_on_timeout: false,
            timeout_s: default_operation_timeout(),
        }
    }
}

/// Sliding-window fault source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowSettings {
    /// Fault when the count threshold is reached.
    #[serde(default = "default_true")]
    pub fault_enabled: bool,
    /// Window length [cycles].
    #[serde(default = "default_window_period")]
    pub period: usize,
    /// Events in the window that raise the fault.
    #[serde(default = "default_window_threshold")]
    pub threshold: usize,
}

fn default_true() -> bool {
    true
}
fn default_window_period() -> usize {
    50
}
fn default_window_threshold() -> usize {
    10
}

impl Default for WindowSettings {
    fn default() -> Self {
        Self {
            fault_enabled: true,
            period: default_window_period(),
            threshold: default_window_threshold(),
        }
    }
}

impl WindowSettings {
    fn check(&self, name: &str) -> Result<(), String> {
        if self.period == 0 || self.period > SAFETY_WINDOW_MAX {
            return Err(format!(
                "{name}.period {} out of range [1, {SAFETY_WINDOW_MAX}]",
                self.period
            ));
        }
        if self.threshold == 0 || self.threshold > self.period {
            return Err(format!(
                "{name}.threshold {} out of range [1, {}]",
                self.threshold, self.period
            ));
        }
        Ok(())
    }
}

/// Safety controller settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SafetyControllerSettings {
    #[serde(default)]
    pub force_controller: ForceControllerFaults,
    #[serde(default)]
    pub raise_operation: OperationTimeout,
    #[serde(default)]
    pub lower_operation: OperationTimeout,
    #[serde(default)]
    pub ilc_communication_timeout: WindowSettings,
    #[serde(default)]
    pub force_actuator_following_error: WindowSettings,
}

impl Validate for SafetyControllerSettings {
    fn validate(&self) -> Result<(), String> {
        for (name, op) in [
            ("raise_operation", &self.raise_operation),
            ("lower_operation", &self.lower_operation),
        ] {
            if !(op.timeout_s > 0.0) {
                return Err(format!("{name}.timeout_s {} must be positive", op.timeout_s));
            }
        }
        self.ilc_communication_timeout
            .check("ilc_communication_timeout")?;
        self.force_actuator_following_error
            .check("force_actuator_following_error")
    }
}

// ─── Profile ────────────────────────────────────────────────────────

/// Complete settings profile.
///
/// # TOML Example
///
/// ```toml
/// [force_controller]
/// mirror_weight = 165000.0
///
/// [safety_controller.raise_operation]
/// fault_on_timeout = true
/// timeout_s = 600.0
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Profile name (the file stem, or `Default`).
    #[serde(default = "default_profile_name")]
    pub name: String,
    #[serde(default)]
    pub force_controller: ForceControllerSettings,
    #[serde(default)]
    pub position_controller: PositionControllerSettings,
    #[serde(default)]
    pub safety_controller: SafetyControllerSettings,
    #[serde(default)]
    pub tables: ForceTables,
}

fn default_profile_name() -> String {
    DEFAULT_SETTINGS_PROFILE.to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            name: default_profile_name(),
            force_controller: ForceControllerSettings::default(),
            position_controller: PositionControllerSettings::default(),
            safety_controller: SafetyControllerSettings::default(),
            tables: ForceTables::default(),
        }
    }
}

impl Settings {
    /// Load `<dir>/<name>.toml`.
    ///
    /// The `Default` profile falls back to the built-in values when no file
    /// exists. Any other missing profile is `ConfigError::UnknownProfile`.
    pub fn load_profile(dir: &Path, name: &str) -> Result<Self, ConfigError> {
        if name.is_empty() || name.contains(['/', '\\']) || name.starts_with('.') {
            return Err(ConfigError::UnknownProfile(name.to_string()));
        }
        let path = dir.join(format!("{name}.toml"));
        let mut settings = match Self::load_validated(&path) {
            Ok(settings) => settings,
            Err(ConfigError::FileNotFound) if name == DEFAULT_SETTINGS_PROFILE => {
                debug!("No {} found, using built-in defaults", path.display());
                Self::default()
            }
            Err(ConfigError::FileNotFound) => {
                return Err(ConfigError::UnknownProfile(name.to_string()));
            }
            Err(e) => return Err(e),
        };
        settings.name = name.to_string();
        info!("Loaded settings profile '{name}'");
        Ok(settings)
    }
}

impl Validate for Settings {
    fn validate(&self) -> Result<(), String> {
        if self.name.is_empty() {
            return Err("settings profile name cannot be empty".to_string());
        }
        self.force_controller
            .validate()
            .map_err(|e| format!("force_controller: {e}"))?;
        self.position_controller
            .validate()
            .map_err(|e| format!("position_controller: {e}"))?;
        self.safety_controller
            .validate()
            .map_err(|e| format!("safety_controller: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limits_coerce() {
        let l = Limits::new(-10.0, 20.0);
        assert_eq!(l.coerce(5.0), (5.0, false));
        assert_eq!(l.coerce(25.0), (20.0, true));
        assert_eq!(l.coerce(-11.0), (-10.0, true));
        assert!(l.contains(20.0));
        assert!(!l.contains(20.1));
    }

    #[test]
    fn defaults_validate() {
        assert!(Settings::default().validate().is_ok());
    }

    #[test]
    fn partial_profile_loads_with_defaults() {
        let s: Settings = toml::from_str(
            r#"
            [force_controller]
            mirror_weight = 100000.0

            [safety_controller.raise_operation]
            fault_on_timeout = true
            "#,
        )
        .unwrap();
        assert_eq!(s.force_controller.mirror_weight, 100_000.0);
        assert_eq!(s.force_controller.near_neighbor_factor, 0.6);
        assert!(s.safety_controller.raise_operation.fault_on_timeout);
        assert_eq!(s.safety_controller.raise_operation.timeout_s, 300.0);
        assert!(s.safety_controller.ilc_communication_timeout.fault_enabled);
        assert_eq!(s.name, DEFAULT_SETTINGS_PROFILE);
    }

    #[test]
    fn rejects_bad_window() {
        let mut s = Settings::default();
        s.safety_controller.ilc_communication_timeout.threshold = 0;
        assert!(s.validate().unwrap_err().contains("threshold"));

        let mut s = Settings::default();
        s.safety_controller.force_actuator_following_error.period = SAFETY_WINDOW_MAX + 1;
        assert!(s.validate().is_err());
    }

    #[test]
    fn rejects_inverted_limits() {
        let mut s = Settings::default();
        s.force_controller.x_moment_limits = Limits::new(10.0, -10.0);
        assert!(s.validate().unwrap_err().contains("x_moment_limits"));
    }

    #[test]
    fn rejects_zero_rate() {
        let mut s = Settings::default();
        s.force_controller.offset_component.max_rate_of_change = 0.0;
        assert!(s.validate().unwrap_err().contains("offset_component"));
    }
}
