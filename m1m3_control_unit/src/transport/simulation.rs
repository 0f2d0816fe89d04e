//! Simulated cell hardware.
//!
//! Force actuators follow their setpoints exactly (plus an injectable
//! following error); hardpoints integrate the commanded steps and report a
//! load proportional to their displacement. A [`SimulationHandle`] lets the
//! binary and the tests inspect outputs and inject faults while the worker
//! thread owns the transport.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use m1m3_common::consts::{FA_COUNT, FA_ID_MIN, HP_COUNT};
use m1m3_common::fault::{CellOutputs, PowerNetworks};
use tracing::trace;

use super::{CylinderSetpoints, IlcReadings, IlcTransport, SensorSample, TransportError};

/// Observable and injectable simulator state.
#[derive(Debug, Clone, Default)]
pub struct SimState {
    /// Sensor values returned by `read_sensors`.
    pub sensors: SensorSample,
    /// Added to every measured primary cylinder force [N].
    pub following_error: f64,
    /// ILC timeouts reported by every `read_all`.
    pub ilc_timeouts: usize,
    /// Subnet that fails `wait_for_subnets`.
    pub failing_subnet: Option<u8>,
    /// Constant load on each hardpoint [N].
    pub hardpoint_force_offsets: [f64; HP_COUNT],
    /// Load change per encoder step [N/step].
    pub hardpoint_stiffness: f64,
    /// Hardpoint encoder positions [steps].
    pub encoders: [i32; HP_COUNT],
    /// Makes `write_outputs` fail.
    pub outputs_fail: bool,
    /// Last written digital outputs.
    pub outputs: CellOutputs,
    /// Last written power networks.
    pub power: PowerNetworks,
    /// Setpoints of the last control list.
    pub last_setpoints: CylinderSetpoints,
    /// Completed bus transactions.
    pub transactions: u64,
    /// Modbus requests sent `(ilc, function, data)`.
    pub modbus_log: Vec<(u16, u8, Vec<u8>)>,
    /// ILCs reprogrammed `(ilc, file)`.
    pub programmed: Vec<(u16, PathBuf)>,
}

/// Shared view of the simulator.
#[derive(Debug, Clone, Default)]
pub struct SimulationHandle {
    state: Arc<Mutex<SimState>>,
}

impl SimulationHandle {
    /// Lock the simulator state.
    pub fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Copy of the simulator state.
    pub fn snapshot(&self) -> SimState {
        self.lock().clone()
    }
}

/// [`IlcTransport`] backed by [`SimState`].
#[derive(Debug, Default)]
pub struct SimulatedTransport {
    handle: SimulationHandle,
    setpoints: CylinderSetpoints,
    steps: [i32; HP_COUNT],
    triggered: bool,
}

impl SimulatedTransport {
    /// New simulator and a handle to it.
    pub fn new() -> (Self, SimulationHandle) {
        let transport = Self::default();
        let handle = transport.handle.clone();
        (transport, handle)
    }

    fn check_ilc(ilc_id: u16) -> Result<(), TransportError> {
        let fa = FA_ID_MIN..FA_ID_MIN + FA_COUNT as u16;
        let hp = 1..=HP_COUNT as u16;
        if fa.contains(&ilc_id) || hp.contains(&ilc_id) {
            Ok(())
        } else {
            Err(TransportError::UnknownIlc(ilc_id))
        }
    }
}

impl IlcTransport for SimulatedTransport {
    fn write_control_list(
        &mut self,
        setpoints: &CylinderSetpoints,
        hardpoint_steps: &[i32; HP_COUNT],
    ) -> Result<(), TransportError> {
        self.setpoints = *setpoints;
        self.steps = *hardpoint_steps;
        Ok(())
    }

    fn trigger(&mut self) -> Result<(), TransportError> {
        self.triggered = true;
        let mut sim = self.handle.lock();
        for (encoder, step) in sim.encoders.iter_mut().zip(self.steps) {
            *encoder = encoder.saturating_add(step);
        }
        sim.last_setpoints = self.setpoints;
        Ok(())
    }

    fn wait_for_subnets(&mut self, timeout: Duration) -> Result<(), TransportError> {
        match self.handle.lock().failing_subnet {
            Some(subnet) => Err(TransportError::SubnetTimeout { subnet, timeout }),
            None => Ok(()),
        }
    }

    fn read_all(&mut self) -> Result<IlcReadings, TransportError> {
        if !std::mem::take(&mut self.triggered) {
            return Err(TransportError::Rejected(
                "read_all without a triggered transaction".to_string(),
            ));
        }
        let mut sim = self.handle.lock();
        sim.transactions += 1;
        let error = sim.following_error;
        let mut hardpoint_forces = [0.0; HP_COUNT];
        for (i, force) in hardpoint_forces.iter_mut().enumerate() {
            *force = sim.hardpoint_force_offsets[i] + sim.hardpoint_stiffness * sim.encoders[i] as f64;
        }
        trace!(transaction = sim.transactions, "simulated bus transaction");
        Ok(IlcReadings {
            primary_measured: self.setpoints.primary.map(|f| f + error),
            secondary_measured: self.setpoints.secondary,
            ilc_timeouts: sim.ilc_timeouts,
            hardpoint_forces,
            hardpoint_encoders: sim.encoders,
        })
    }

    fn read_sensors(&mut self) -> Result<SensorSample, TransportError> {
        Ok(self.handle.lock().sensors)
    }

    fn write_outputs(
        &mut self,
        outputs: CellOutputs,
        power: PowerNetworks,
    ) -> Result<(), TransportError> {
        let mut sim = self.handle.lock();
        if sim.outputs_fail {
            return Err(TransportError::Io("digital output write failed".to_string()));
        }
        sim.outputs = outputs;
        sim.power = power;
        Ok(())
    }

    fn modbus_transmit(
        &mut self,
        ilc_id: u16,
        function_code: u8,
        data: &[u8],
    ) -> Result<(), TransportError> {
        Self::check_ilc(ilc_id)?;
        self.handle
            .lock()
            .modbus_log
            .push((ilc_id, function_code, data.to_vec()));
        Ok(())
    }

    fn program_ilc(&mut self, ilc_id: u16, file_path: &Path) -> Result<(), TransportError> {
        Self::check_ilc(ilc_id)?;
        self.handle
            .lock()
            .programmed
            .push((ilc_id, file_path.to_path_buf()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use m1m3_common::actuator::ActuatorArray;

    #[test]
    fn measured_forces_follow_setpoints() {
        let (mut t, handle) = SimulatedTransport::new();
        handle.lock().following_error = 5.0;
        let setpoints = CylinderSetpoints {
            primary: ActuatorArray::splat(100.0),
            secondary: ActuatorArray::splat(-20.0),
        };
        t.write_control_list(&setpoints, &[0; HP_COUNT]).unwrap();
        t.trigger().unwrap();
        t.wait_for_subnets(Duration::from_millis(5)).unwrap();
        let r = t.read_all().unwrap();
        assert!(r.primary_measured.iter().all(|&f| f == 105.0));
        assert!(r.secondary_measured.iter().all(|&f| f == -20.0));
        assert_eq!(handle.snapshot().transactions, 1);
    }

    #[test]
    fn read_requires_trigger() {
        let (mut t, _) = SimulatedTransport::new();
        assert!(matches!(t.read_all(), Err(TransportError::Rejected(_))));
    }

    #[test]
    fn hardpoint_steps_integrate_into_encoders() {
        let (mut t, handle) = SimulatedTransport::new();
        handle.lock().hardpoint_stiffness = 2.0;
        let steps = [10, -10, 0, 0, 0, 5];
        t.write_control_list(&CylinderSetpoints::default(), &steps).unwrap();
        t.trigger().unwrap();
        let r = t.read_all().unwrap();
        assert_eq!(r.hardpoint_encoders, steps);
        assert_eq!(r.hardpoint_forces[0], 20.0);
        assert_eq!(r.hardpoint_forces[1], -20.0);
    }

    #[test]
    fn failing_subnet_times_out() {
        let (mut t, handle) = SimulatedTransport::new();
        handle.lock().failing_subnet = Some(3);
        let err = t.wait_for_subnets(Duration::from_millis(1)).unwrap_err();
        assert!(matches!(err, TransportError::SubnetTimeout { subnet: 3, .. }));
    }

    #[test]
    fn modbus_checks_address() {
        let (mut t, handle) = SimulatedTransport::new();
        t.modbus_transmit(FA_ID_MIN, 17, &[1, 2]).unwrap();
        assert_eq!(
            t.modbus_transmit(999, 17, &[]),
            Err(TransportError::UnknownIlc(999))
        );
        assert_eq!(handle.snapshot().modbus_log, vec![(FA_ID_MIN, 17, vec![1, 2])]);
    }
}
