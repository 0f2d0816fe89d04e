//! Everything the states act on.
//!
//! The [`Model`] owns the controllers, the hardware transport and the cell
//! outputs. It is built from explicitly injected collaborators (publisher,
//! transport, time source) and rebuilt in place when a settings profile is
//! applied. The controllers are public fields so a state handler can borrow
//! several of them at once.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use m1m3_common::config::ConfigError;
use m1m3_common::consts::{DEFAULT_SETTINGS_PROFILE, HP_COUNT};
use m1m3_common::fault::{CellOutputs, PowerNetworks};
use m1m3_common::geometry::MirrorGeometry;
use m1m3_common::settings::Settings;
use tracing::{info, trace, warn};

use crate::automatic::AutomaticOperationsController;
use crate::cycle::TimeSource;
use crate::force::ForceController;
use crate::hardpoint::PositionController;
use crate::publisher::{Event, Publisher};
use crate::safety::SafetyController;
use crate::transport::{CylinderSetpoints, IlcReadings, IlcTransport, TransportError};

/// Runtime knobs of the model that do not belong to a settings profile.
#[derive(Debug, Clone)]
pub struct ModelOptions {
    /// Directory holding `<profile>.toml` settings files.
    pub settings_dir: Option<PathBuf>,
    /// Publish applied forces every N cycles (0 disables).
    pub telemetry_interval: u32,
    /// Deadline for the ILC subnets to answer.
    pub subnet_timeout: Duration,
}

impl Default for ModelOptions {
    fn default() -> Self {
        Self {
            settings_dir: None,
            telemetry_interval: 1,
            subnet_timeout: Duration::from_millis(5),
        }
    }
}

/// Controllers, transport and cell outputs.
pub struct Model {
    options: ModelOptions,
    settings: Arc<Settings>,
    geometry: Arc<MirrorGeometry>,
    publisher: Arc<dyn Publisher>,
    time: Arc<dyn TimeSource>,
    transport: Box<dyn IlcTransport>,

    pub force: ForceController,
    pub hardpoints: PositionController,
    pub safety: SafetyController,
    pub automatic: AutomaticOperationsController,

    outputs: CellOutputs,
    power: PowerNetworks,
    readings: IlcReadings,
    cycle: u64,
}

impl Model {
    /// Model running the built-in `Default` profile.
    pub fn new(
        options: ModelOptions,
        geometry: Arc<MirrorGeometry>,
        transport: Box<dyn IlcTransport>,
        publisher: Arc<dyn Publisher>,
        time: Arc<dyn TimeSource>,
    ) -> Self {
        let settings = Arc::new(Settings::default());
        let (force, hardpoints, safety, automatic) = build_controllers(&settings, &geometry, &publisher, &time);
        Self {
            options,
            settings,
            geometry,
            publisher,
            time,
            transport,
            force,
            hardpoints,
            safety,
            automatic,
            outputs: CellOutputs::empty(),
            power: PowerNetworks::empty(),
            readings: IlcReadings::default(),
            cycle: 0,
        }
    }

    #[inline]
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    #[inline]
    pub fn geometry(&self) -> &MirrorGeometry {
        &self.geometry
    }

    #[inline]
    pub fn publisher(&self) -> &Arc<dyn Publisher> {
        &self.publisher
    }

    #[inline]
    pub fn now(&self) -> f64 {
        self.time.now()
    }

    /// Readings of the last bus transaction.
    #[inline]
    pub fn readings(&self) -> &IlcReadings {
        &self.readings
    }

    #[inline]
    pub fn outputs(&self) -> CellOutputs {
        self.outputs
    }

    #[inline]
    pub fn power(&self) -> PowerNetworks {
        self.power
    }

    // ─── Settings ───────────────────────────────────────────────────

    /// Resolve a profile name against the settings directory.
    ///
    /// `Default` always resolves, to the built-in values when no file
    /// exists.
    pub fn load_settings(&self, name: &str) -> Result<Settings, ConfigError> {
        match &self.options.settings_dir {
            Some(dir) => Settings::load_profile(dir, name),
            None => Self::builtin_profile(name),
        }
    }

    fn builtin_profile(name: &str) -> Result<Settings, ConfigError> {
        if name == DEFAULT_SETTINGS_PROFILE {
            Ok(Settings::default())
        } else {
            Err(ConfigError::UnknownProfile(name.to_string()))
        }
    }

    /// Replace the profile and rebuild every controller from it.
    pub fn apply_settings(&mut self, settings: Settings) {
        info!(profile = %settings.name, "Applying settings profile");
        self.settings = Arc::new(settings);
        let (force, hardpoints, safety, automatic) =
            build_controllers(&self.settings, &self.geometry, &self.publisher, &self.time);
        self.force = force;
        self.hardpoints = hardpoints;
        self.safety = safety;
        self.automatic = automatic;
        self.readings = IlcReadings::default();
        self.publisher.publish(Event::SettingsApplied {
            timestamp: self.time.now(),
            settings_version: self.settings.name.clone(),
        });
    }

    /// Settings directory in use, if any.
    pub fn settings_dir(&self) -> Option<&Path> {
        self.options.settings_dir.as_deref()
    }

    // ─── Cell I/O ───────────────────────────────────────────────────

    pub fn turn_air_on(&mut self) -> Result<(), TransportError> {
        self.write_outputs(self.outputs | CellOutputs::AIR_SUPPLY, self.power)
    }

    pub fn turn_air_off(&mut self) -> Result<(), TransportError> {
        self.write_outputs(self.outputs - CellOutputs::AIR_SUPPLY, self.power)
    }

    pub fn turn_lights_on(&mut self) -> Result<(), TransportError> {
        self.write_outputs(self.outputs | CellOutputs::CELL_LIGHTS, self.power)
    }

    pub fn turn_lights_off(&mut self) -> Result<(), TransportError> {
        self.write_outputs(self.outputs - CellOutputs::CELL_LIGHTS, self.power)
    }

    pub fn turn_power_on(&mut self, networks: PowerNetworks) -> Result<(), TransportError> {
        self.write_outputs(self.outputs, self.power | networks)
    }

    pub fn turn_power_off(&mut self, networks: PowerNetworks) -> Result<(), TransportError> {
        self.write_outputs(self.outputs, self.power - networks)
    }

    /// Air off, lights off, every network unpowered.
    pub fn turn_everything_off(&mut self) -> Result<(), TransportError> {
        self.write_outputs(CellOutputs::empty(), PowerNetworks::empty())
    }

    fn write_outputs(&mut self, outputs: CellOutputs, power: PowerNetworks) -> Result<(), TransportError> {
        if let Err(e) = self.transport.write_outputs(outputs, power) {
            self.transport_warning(&e);
            return Err(e);
        }
        if (outputs, power) != (self.outputs, self.power) {
            info!(?outputs, ?power, "Cell outputs changed");
            self.outputs = outputs;
            self.power = power;
            self.publisher.publish(Event::CellOutputs {
                timestamp: self.time.now(),
                air_supply: outputs.contains(CellOutputs::AIR_SUPPLY),
                cell_lights: outputs.contains(CellOutputs::CELL_LIGHTS),
                power_networks: power,
            });
        }
        Ok(())
    }

    // ─── ILC maintenance ────────────────────────────────────────────

    pub fn program_ilc(&mut self, ilc_id: u16, file_path: &Path) -> Result<(), TransportError> {
        info!(ilc_id, file = %file_path.display(), "Programming ILC");
        self.transport
            .program_ilc(ilc_id, file_path)
            .inspect_err(|e| self.transport_warning(e))
    }

    pub fn modbus_transmit(&mut self, ilc_id: u16, function_code: u8, data: &[u8]) -> Result<(), TransportError> {
        info!(ilc_id, function_code, len = data.len(), "Modbus transmit");
        self.transport
            .modbus_transmit(ilc_id, function_code, data)
            .inspect_err(|e| self.transport_warning(e))
    }

    fn transport_warning(&self, e: &TransportError) {
        warn!("Transport error: {e}");
        self.publisher.publish(Event::TransportWarning {
            timestamp: self.time.now(),
            reason: e.to_string(),
        });
    }

    // ─── Cycle ──────────────────────────────────────────────────────

    /// Force recomputation, one bus transaction and the hardpoint cycle.
    ///
    /// Transport failures are published and counted as ILC communication
    /// timeouts; the cycle then ends without new readings.
    pub fn enabled_update(&mut self) {
        self.cycle += 1;
        match self.transport.read_sensors() {
            Ok(sample) => self.force.set_sensor_sample(&sample),
            Err(e) => self.transport_warning(&e),
        }

        self.force.update_applied_forces(&mut self.safety);
        let steps = self.hardpoints.cycle_steps();

        let readings = match transact(
            self.transport.as_mut(),
            self.force.setpoints(),
            &steps,
            self.options.subnet_timeout,
        ) {
            Ok(readings) => readings,
            Err(e) => {
                self.transport_warning(&e);
                self.safety.ilc_communication_timeout(true);
                return;
            }
        };
        trace!(cycle = self.cycle, ilc_timeouts = readings.ilc_timeouts, "ILC transaction");

        self.safety.ilc_communication_timeout(readings.ilc_timeouts > 0);
        self.hardpoints
            .update_measurements(readings.hardpoint_encoders, readings.hardpoint_forces);
        self.force.set_hardpoint_forces(readings.hardpoint_forces);
        let following = self.force.following_error_in_tolerance(&readings);
        self.safety.force_actuator_following_error(!following);
        self.readings = readings;

        self.publish_telemetry();
    }

    /// Sensor sample and one bus transaction with zero setpoints and no
    /// hardpoint steps. Forces are not recomputed.
    ///
    /// Keeps the ILC communication window fed and telemetry flowing while
    /// the mirror is not supported (Disabled, Fault).
    pub fn telemetry_update(&mut self) {
        self.cycle += 1;
        match self.transport.read_sensors() {
            Ok(sample) => self.force.set_sensor_sample(&sample),
            Err(e) => self.transport_warning(&e),
        }

        let readings = match transact(
            self.transport.as_mut(),
            &CylinderSetpoints::default(),
            &[0; HP_COUNT],
            self.options.subnet_timeout,
        ) {
            Ok(readings) => readings,
            Err(e) => {
                self.transport_warning(&e);
                self.safety.ilc_communication_timeout(true);
                return;
            }
        };
        self.safety.ilc_communication_timeout(readings.ilc_timeouts > 0);
        self.hardpoints
            .update_measurements(readings.hardpoint_encoders, readings.hardpoint_forces);
        self.readings = readings;

        self.publish_telemetry();
    }

    fn publish_telemetry(&self) {
        let interval = u64::from(self.options.telemetry_interval);
        if interval != 0 && self.cycle % interval == 0 {
            self.publish_applied_forces();
        }
    }

    fn publish_applied_forces(&self) {
        let applied = self.force.applied_forces();
        let m = self.force.mirror_forces();
        self.publisher.publish(Event::AppliedForces {
            timestamp: self.time.now(),
            x_forces: Box::new(applied.x),
            y_forces: Box::new(applied.y),
            z_forces: Box::new(applied.z),
            fx: m.fx,
            fy: m.fy,
            fz: m.fz,
            mx: m.mx,
            my: m.my,
            mz: m.mz,
        });
    }

    /// Remove every force at once and stop the hardpoints.
    pub fn zero_all_forces(&mut self) {
        self.hardpoints.stop_motion();
        self.force.reset();
    }
}

fn build_controllers(
    settings: &Arc<Settings>,
    geometry: &Arc<MirrorGeometry>,
    publisher: &Arc<dyn Publisher>,
    time: &Arc<dyn TimeSource>,
) -> (
    ForceController,
    PositionController,
    SafetyController,
    AutomaticOperationsController,
) {
    (
        ForceController::new(settings.clone(), geometry.clone(), publisher.clone(), time.clone()),
        PositionController::new(settings.position_controller.clone(), publisher.clone(), time.clone()),
        SafetyController::new(settings.safety_controller.clone(), publisher.clone(), time.clone()),
        AutomaticOperationsController::new(&settings.safety_controller, publisher.clone(), time.clone()),
    )
}

/// Write, trigger, wait, read.
fn transact(
    transport: &mut dyn IlcTransport,
    setpoints: &CylinderSetpoints,
    steps: &[i32; HP_COUNT],
    timeout: Duration,
) -> Result<IlcReadings, TransportError> {
    transport.write_control_list(setpoints, steps)?;
    transport.trigger()?;
    transport.wait_for_subnets(timeout)?;
    transport.read_all()
}

impl std::fmt::Debug for Model {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Model")
            .field("profile", &self.settings.name)
            .field("cycle", &self.cycle)
            .field("outputs", &self.outputs)
            .field("power", &self.power)
            .field("force", &self.force)
            .field("safety", &self.safety)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cycle::ManualTimeSource;
    use crate::force::AxisForces;
    use crate::publisher::RecordingPublisher;
    use m1m3_common::actuator::ActuatorArray;
    use crate::transport::{SimulatedTransport, SimulationHandle};

    fn model(options: ModelOptions) -> (Model, SimulationHandle, Arc<RecordingPublisher>) {
        let (transport, sim) = SimulatedTransport::new();
        let publisher = Arc::new(RecordingPublisher::new());
        let model = Model::new(
            options,
            Arc::new(MirrorGeometry::default_layout()),
            Box::new(transport),
            publisher.clone(),
            Arc::new(ManualTimeSource::new(0.0)),
        );
        (model, sim, publisher)
    }

    #[test]
    fn outputs_reach_the_transport() {
        let (mut m, sim, publisher) = model(ModelOptions::default());
        m.turn_power_on(PowerNetworks::MAIN).unwrap();
        m.turn_air_on().unwrap();
        m.turn_air_on().unwrap();
        let snapshot = sim.snapshot();
        assert_eq!(snapshot.power, PowerNetworks::MAIN);
        assert!(snapshot.outputs.contains(CellOutputs::AIR_SUPPLY));
        assert_eq!(publisher.count(|e| matches!(e, Event::CellOutputs { .. })), 2);

        m.turn_everything_off().unwrap();
        assert!(sim.snapshot().power.is_empty());
    }

    #[test]
    fn builtin_profile_only_knows_default() {
        let (m, _, _) = model(ModelOptions::default());
        assert!(m.load_settings("Default").is_ok());
        assert_eq!(
            m.load_settings("Other").unwrap_err(),
            ConfigError::UnknownProfile("Other".to_string())
        );
    }

    #[test]
    fn update_runs_one_transaction_and_publishes_telemetry() {
        let (mut m, sim, publisher) = model(ModelOptions {
            telemetry_interval: 2,
            ..ModelOptions::default()
        });
        m.enabled_update();
        m.enabled_update();
        assert_eq!(sim.snapshot().transactions, 2);
        assert_eq!(publisher.count(|e| matches!(e, Event::AppliedForces { .. })), 1);
    }

    #[test]
    fn subnet_failure_feeds_the_ilc_window() {
        let (mut m, sim, publisher) = model(ModelOptions::default());
        sim.lock().failing_subnet = Some(2);
        let threshold = m.settings().safety_controller.ilc_communication_timeout.threshold;
        for _ in 0..threshold {
            m.enabled_update();
        }
        assert!(m.safety.pending_fault().is_some());
        assert!(publisher.count(|e| matches!(e, Event::TransportWarning { .. })) >= threshold);
    }

    #[test]
    fn telemetry_update_polls_with_zero_setpoints() {
        let (mut m, sim, publisher) = model(ModelOptions::default());
        m.force
            .apply_offset_forces(AxisForces::from_z(ActuatorArray::splat(50.0)));
        m.enabled_update();
        assert_ne!(sim.snapshot().last_setpoints, CylinderSetpoints::default());

        m.telemetry_update();
        let snapshot = sim.snapshot();
        assert_eq!(snapshot.transactions, 2);
        assert_eq!(snapshot.last_setpoints, CylinderSetpoints::default());
        assert_eq!(publisher.count(|e| matches!(e, Event::AppliedForces { .. })), 2);
    }

    #[test]
    fn telemetry_update_feeds_the_ilc_window() {
        let (mut m, sim, _) = model(ModelOptions::default());
        sim.lock().failing_subnet = Some(1);
        let threshold = m.settings().safety_controller.ilc_communication_timeout.threshold;
        for _ in 0..threshold {
            m.telemetry_update();
        }
        assert_eq!(
            m.safety.pending_fault(),
            Some(m1m3_common::fault::FaultCode::IlcCommunicationTimeout)
        );
    }

    #[test]
    fn following_error_is_reported() {
        let (mut m, sim, _) = model(ModelOptions::default());
        sim.lock().following_error = 500.0;
        let threshold = m.settings().safety_controller.force_actuator_following_error.threshold;
        for _ in 0..threshold {
            m.enabled_update();
        }
        assert_eq!(
            m.safety.pending_fault(),
            Some(m1m3_common::fault::FaultCode::ForceActuatorFollowingError)
        );
    }
}
