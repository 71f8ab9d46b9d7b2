//! Pendant configuration loaded from `~/.config/jogpad/config.toml`.
//!
//! Every field has a serde default, so a missing or partial file always
//! yields a usable configuration.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(default)]
pub struct PendantConfig {
    /// Joystick character device to read 8-byte records from.
    pub device_path: String,

    /// Address of the grbl bridge the command channel connects to.
    pub channel_addr: String,

    /// Destination port identifier passed with every named command.
    pub port_id: String,

    /// Axis readings with |value| below this are clamped to zero.
    pub deadzone: i16,

    /// Minimum delta before a new nonzero axis reading is forwarded.
    pub sensitivity: i16,

    /// Full-scale axis magnitude of the device.
    pub axis_max: i16,

    /// Hold duration separating a short press from a long press.
    pub press_timeout_ms: u64,

    /// Interval of the continuous-jog evaluator.
    pub jog_tick_ms: u64,

    /// How long an unacknowledged jog blocks the next one.
    pub jog_in_flight_timeout_ms: u64,

    /// Interval of the spindle-speed evaluator.
    pub spindle_tick_ms: u64,

    /// Interval of the device reconnect poll.
    pub reconnect_tick_ms: u64,

    /// Selectable step-jog distances, in machine units.
    pub step_distances: Vec<f64>,

    /// Selectable step-jog feedrates, in units per minute.
    pub step_feedrates: Vec<f64>,

    /// Feedrate commanded at full stick deflection.
    pub max_jog_feedrate: f64,

    /// Spindle speed range `[min, max]` the trigger maps into.
    pub spindle_speed_range: [f64; 2],
}

impl Default for PendantConfig {
    fn default() -> Self {
        Self {
            device_path: "/dev/input/js0".to_string(),
            channel_addr: "127.0.0.1:8000".to_string(),
            port_id: "/dev/ttyUSB0".to_string(),
            deadzone: 650,
            sensitivity: 100,
            axis_max: i16::MAX,
            press_timeout_ms: 500,
            jog_tick_ms: 75,
            jog_in_flight_timeout_ms: 1000,
            spindle_tick_ms: 5000,
            reconnect_tick_ms: 3000,
            step_distances: vec![0.01, 0.1, 1.0, 10.0],
            step_feedrates: vec![100.0, 500.0, 1000.0, 2000.0],
            max_jog_feedrate: 3000.0,
            spindle_speed_range: [0.0, 24000.0],
        }
    }
}

impl PendantConfig {
    /// Loads the configuration file, falling back to defaults when it is
    /// missing or unreadable.
    pub fn load() -> Self {
        let path = config_path();
        match fs::read_to_string(&path) {
            Ok(raw) => match toml::from_str::<PendantConfig>(&raw) {
                Ok(config) => {
                    info!("Loaded configuration from {}", path.display());
                    config.sanitized()
                }
                Err(e) => {
                    warn!("Invalid configuration in {}: {}", path.display(), e);
                    Self::default()
                }
            },
            Err(_) => {
                info!("No configuration at {}, using defaults", path.display());
                Self::default()
            }
        }
    }
}

impl PendantConfig {
    /// The selectors require non-empty option lists.
    fn sanitized(mut self) -> Self {
        let defaults = Self::default();
        if self.step_distances.is_empty() {
            warn!("step_distances is empty, using defaults");
            self.step_distances = defaults.step_distances;
        }
        if self.step_feedrates.is_empty() {
            warn!("step_feedrates is empty, using defaults");
            self.step_feedrates = defaults.step_feedrates;
        }
        self
    }
}

fn config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("jogpad")
        .join("config.toml")
}
