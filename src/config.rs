use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

use crate::error::Result;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DevcamConfig {
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub device: DeviceConfig,
    #[serde(default)]
    pub system: SystemConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CaptureConfig {
    /// Base path for captured images, metadata and reports
    #[serde(default = "default_output_path")]
    pub output_path: String,

    /// Directory holding capture design JSON files
    #[serde(default = "default_design_path")]
    pub design_path: String,

    /// Write the per-frame metadata JSON file for each run
    #[serde(default = "default_save_metadata")]
    pub save_metadata: bool,

    /// Write the plain-text report of the requested design for each run
    #[serde(default = "default_write_report")]
    pub write_report: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DeviceConfig {
    /// Camera identifier as reported by the backend
    #[serde(default = "default_camera_id")]
    pub camera_id: String,

    /// Milliseconds to wait for exclusive device access before failing
    #[serde(default = "default_open_timeout_ms")]
    pub open_timeout_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SystemConfig {
    /// Capacity hint for the completion-event channels
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

fn default_output_path() -> String {
    "./captures".to_string()
}

fn default_design_path() -> String {
    "./designs".to_string()
}

fn default_save_metadata() -> bool {
    true
}

fn default_write_report() -> bool {
    true
}

fn default_camera_id() -> String {
    "0".to_string()
}

fn default_open_timeout_ms() -> u64 {
    2500
}

fn default_event_channel_capacity() -> usize {
    64
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            output_path: default_output_path(),
            design_path: default_design_path(),
            save_metadata: default_save_metadata(),
            write_report: default_write_report(),
        }
    }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            camera_id: default_camera_id(),
            open_timeout_ms: default_open_timeout_ms(),
        }
    }
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            event_channel_capacity: default_event_channel_capacity(),
        }
    }
}

impl Default for DevcamConfig {
    fn default() -> Self {
        Self {
            capture: CaptureConfig::default(),
            device: DeviceConfig::default(),
            system: SystemConfig::default(),
        }
    }
}

impl DevcamConfig {
    /// Load configuration from a TOML file, with `DEVCAM_*` environment
    /// variables overriding individual fields. A missing file yields the
    /// defaults.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let mut builder = Config::builder();
        if path.exists() {
            debug!("Loading configuration from {}", path.display());
            builder = builder.add_source(File::from(path));
        } else {
            info!(
                "Configuration file {} not found, using defaults",
                path.display()
            );
        }

        let settings = builder
            .add_source(Environment::with_prefix("DEVCAM").separator("__"))
            .build()?;

        let config: DevcamConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.capture.output_path.is_empty() {
            return Err(crate::error::DevcamError::system(
                "capture.output_path must not be empty",
            ));
        }
        if self.device.open_timeout_ms == 0 {
            return Err(crate::error::DevcamError::system(
                "device.open_timeout_ms must be greater than 0",
            ));
        }
        if self.system.event_channel_capacity == 0 {
            return Err(crate::error::DevcamError::system(
                "system.event_channel_capacity must be greater than 0",
            ));
        }
        Ok(())
    }

    /// Default configuration rendered as TOML, for `--print-config`.
    pub fn default_toml() -> String {
        toml::to_string_pretty(&DevcamConfig::default())
            .expect("default config serializes")
    }
}
