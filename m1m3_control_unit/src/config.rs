//! Cell configuration file.
//!
//! ```toml
//! cycle_time_us = 20000
//! telemetry_interval = 1
//! settings_dir = "settings"
//! default_profile = "Default"
//! transport = "simulated"
//!
//! [shared]
//! service_name = "m1m3-control-unit"
//! ```
//!
//! Every key has a default, so a partial file loads.
//! Settings profiles themselves live in `settings_dir` and are selected by
//! the `start` command.

use std::path::{Path, PathBuf};
use std::time::Duration;

use m1m3_common::config::{ConfigError, ConfigLoader, SharedConfig, Validate};
use m1m3_common::consts::{CYCLE_TIME_US, CYCLE_TIME_US_MAX, CYCLE_TIME_US_MIN, DEFAULT_SETTINGS_PROFILE};
use serde::{Deserialize, Serialize};

use crate::model::ModelOptions;

/// Which ILC transport the binary drives.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// In-process cell simulation.
    #[default]
    Simulated,
}

/// Top-level cell configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CellConfig {
    #[serde(default)]
    pub shared: SharedConfig,

    /// Outer-loop period [µs].
    #[serde(default = "default_cycle_time_us")]
    pub cycle_time_us: u64,

    /// Publish applied forces every N cycles; 0 disables.
    #[serde(default = "default_telemetry_interval")]
    pub telemetry_interval: u32,

    /// Per-cycle `outerLoopData` events on the output stream.
    #[serde(default)]
    pub publish_cycle_data: bool,

    /// Directory holding `<profile>.toml` settings files.
    #[serde(default)]
    pub settings_dir: Option<PathBuf>,

    /// Profile the binary starts with when told to start on its own.
    #[serde(default = "default_profile")]
    pub default_profile: String,

    /// Longest wait for the ILC subnets each cycle [ms].
    #[serde(default = "default_subnet_timeout_ms")]
    pub subnet_timeout_ms: u64,

    #[serde(default)]
    pub transport: TransportKind,
}

fn default_cycle_time_us() -> u64 {
    CYCLE_TIME_US
}
fn default_telemetry_interval() -> u32 {
    1
}
fn default_profile() -> String {
    DEFAULT_SETTINGS_PROFILE.to_string()
}
fn default_subnet_timeout_ms() -> u64 {
    5
}

impl Default for CellConfig {
    fn default() -> Self {
        Self {
            shared: SharedConfig::default(),
            cycle_time_us: default_cycle_time_us(),
            telemetry_interval: default_telemetry_interval(),
            publish_cycle_data: false,
            settings_dir: None,
            default_profile: default_profile(),
            subnet_timeout_ms: default_subnet_timeout_ms(),
            transport: TransportKind::default(),
        }
    }
}

impl Validate for CellConfig {
    fn validate(&self) -> Result<(), String> {
        self.shared.validate().map_err(|e| e.to_string())?;
        if !(CYCLE_TIME_US_MIN..=CYCLE_TIME_US_MAX).contains(&self.cycle_time_us) {
            return Err(format!(
                "cycle_time_us {} outside [{CYCLE_TIME_US_MIN}, {CYCLE_TIME_US_MAX}]",
                self.cycle_time_us
            ));
        }
        if self.default_profile.is_empty() {
            return Err("default_profile cannot be empty".to_string());
        }
        if self.subnet_timeout_ms == 0 || self.subnet_timeout_ms * 1000 >= self.cycle_time_us {
            return Err(format!(
                "subnet_timeout_ms {} must be positive and shorter than the cycle",
                self.subnet_timeout_ms
            ));
        }
        Ok(())
    }
}

impl CellConfig {
    #[inline]
    pub const fn cycle_time(&self) -> Duration {
        Duration::from_micros(self.cycle_time_us)
    }

    /// Model options derived from this file.
    pub fn model_options(&self) -> ModelOptions {
        ModelOptions {
            settings_dir: self.settings_dir.clone(),
            telemetry_interval: self.telemetry_interval,
            subnet_timeout: Duration::from_millis(self.subnet_timeout_ms),
        }
    }
}

/// Load and validate the cell configuration.
///
/// A relative `settings_dir` is resolved against the file's directory.
pub fn load_config(path: &Path) -> Result<CellConfig, ConfigError> {
    let mut config = CellConfig::load_validated(path)?;
    if let (Some(dir), Some(base)) = (config.settings_dir.as_ref(), path.parent()) {
        if dir.is_relative() {
            config.settings_dir = Some(base.join(dir));
        }
    }
    Ok(config)
}
