//! Hardware transport boundary.
//!
//! The ILC bus and the cell FPGA are reached through [`IlcTransport`]: write
//! the control list, trigger, wait for the subnets, read everything back.
//! Register access and Modbus framing are the transport's concern; the core
//! only sees the decoded [`IlcReadings`] and [`SensorSample`].

pub mod simulation;

use std::path::Path;
use std::time::Duration;

use m1m3_common::actuator::ActuatorArray;
use m1m3_common::consts::HP_COUNT;
use m1m3_common::fault::{CellOutputs, PowerNetworks};
use thiserror::Error;

pub use simulation::{SimulatedTransport, SimulationHandle};

/// Transport failure.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TransportError {
    /// A subnet did not answer before the deadline.
    #[error("subnet {subnet} timed out after {timeout:?}")]
    SubnetTimeout {
        /// Subnet number (1-based).
        subnet: u8,
        /// Deadline that elapsed.
        timeout: Duration,
    },
    /// No ILC with this bus address.
    #[error("unknown ILC address {0}")]
    UnknownIlc(u16),
    /// The device refused the request.
    #[error("request rejected: {0}")]
    Rejected(String),
    /// Low-level I/O failure.
    #[error("transport I/O error: {0}")]
    Io(String),
}

/// Cylinder force setpoints for one cycle [N].
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CylinderSetpoints {
    /// Primary (vertical) cylinder setpoints.
    pub primary: ActuatorArray<f64>,
    /// Secondary (45°) cylinder setpoints; zero for single-axis actuators.
    pub secondary: ActuatorArray<f64>,
}

/// Everything read back from the ILCs in one cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct IlcReadings {
    /// Measured primary cylinder forces [N].
    pub primary_measured: ActuatorArray<f64>,
    /// Measured secondary cylinder forces [N].
    pub secondary_measured: ActuatorArray<f64>,
    /// ILCs that did not answer this cycle.
    pub ilc_timeouts: usize,
    /// Hardpoint load cell forces [N].
    pub hardpoint_forces: [f64; HP_COUNT],
    /// Hardpoint encoder positions [steps].
    pub hardpoint_encoders: [i32; HP_COUNT],
}

/// Inclinometer, accelerometer, gyro and thermal readings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorSample {
    /// Mirror elevation angle [deg].
    pub elevation: f64,
    /// Angular acceleration (x, y, z) [rad/s²].
    pub angular_acceleration: [f64; 3],
    /// Angular velocity (x, y, z) [rad/s].
    pub angular_velocity: [f64; 3],
    /// Mirror temperature [°C].
    pub mirror_temperature: f64,
}

impl Default for SensorSample {
    fn default() -> Self {
        Self {
            elevation: 90.0,
            angular_acceleration: [0.0; 3],
            angular_velocity: [0.0; 3],
            mirror_temperature: 20.0,
        }
    }
}

/// Opaque hardware transport.
pub trait IlcTransport: Send {
    /// Queue the force and hardpoint step commands for the next trigger.
    fn write_control_list(
        &mut self,
        setpoints: &CylinderSetpoints,
        hardpoint_steps: &[i32; HP_COUNT],
    ) -> Result<(), TransportError>;

    /// Start the bus transaction.
    fn trigger(&mut self) -> Result<(), TransportError>;

    /// Block until every subnet has answered or `timeout` elapsed.
    fn wait_for_subnets(&mut self, timeout: Duration) -> Result<(), TransportError>;

    /// Decode the responses of the last transaction.
    fn read_all(&mut self) -> Result<IlcReadings, TransportError>;

    /// Sample the cell sensors.
    fn read_sensors(&mut self) -> Result<SensorSample, TransportError>;

    /// Drive the cell digital outputs and power networks.
    fn write_outputs(
        &mut self,
        outputs: CellOutputs,
        power: PowerNetworks,
    ) -> Result<(), TransportError>;

    /// Send a raw Modbus request to one ILC.
    fn modbus_transmit(
        &mut self,
        ilc_id: u16,
        function_code: u8,
        data: &[u8],
    ) -> Result<(), TransportError>;

    /// Reprogram one ILC from a firmware file.
    fn program_ilc(&mut self, ilc_id: u16, file_path: &Path) -> Result<(), TransportError>;
}
