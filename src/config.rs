//! Monitor configuration
//!
//! Loaded from `<config_dir>/deckbuttons/config.toml`. Every field has a default,
//! so a missing file or a partial file is fine; only a malformed file is an error.

use crate::monitor::MonitorError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

const CONFIG_DIR: &str = "deckbuttons";
const CONFIG_FILE: &str = "config.toml";

/// Valve Corporation
pub const VALVE_VENDOR_ID: u16 = 0x28DE;
/// Steam Deck built-in controller
pub const STEAM_DECK_PRODUCT_ID: u16 = 0x1205;

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(default)]
pub struct MonitorConfig {
    /// Upper bound on waiting for a worker thread to exit on stop
    pub join_timeout_ms: u64,
    pub hidraw: HidrawConfig,
    pub gamepads: GamepadConfig,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            join_timeout_ms: 2000,
            hidraw: HidrawConfig::default(),
            gamepads: GamepadConfig::default(),
        }
    }
}

/// Built-in controller (hidraw) settings
#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(default)]
pub struct HidrawConfig {
    pub vendor_id: u16,
    pub product_id: u16,
    /// Nodes `hidraw0..hidraw{max_nodes-1}` are considered during discovery
    pub max_nodes: u32,
    pub packet_size: usize,
    pub poll_timeout_ms: u64,
    /// Readiness wait used by the data-probe discovery fallback
    pub probe_timeout_ms: u64,
    pub max_consecutive_errors: u32,
    pub reconnect_delay_ms: u64,
    pub queue_capacity: usize,
    pub dev_dir: PathBuf,
    pub class_dir: PathBuf,
}

impl Default for HidrawConfig {
    fn default() -> Self {
        Self {
            vendor_id: VALVE_VENDOR_ID,
            product_id: STEAM_DECK_PRODUCT_ID,
            max_nodes: 10,
            packet_size: 64,
            poll_timeout_ms: 100,
            probe_timeout_ms: 100,
            max_consecutive_errors: 10,
            reconnect_delay_ms: 2000,
            queue_capacity: 100,
            dev_dir: PathBuf::from("/dev"),
            class_dir: PathBuf::from("/sys/class/hidraw"),
        }
    }
}

impl HidrawConfig {
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }
}

/// External evdev gamepad settings
#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(default)]
pub struct GamepadConfig {
    pub enabled: bool,
    pub input_dir: PathBuf,
    pub poll_timeout_ms: u64,
    pub scan_interval_ms: u64,
    pub rejection_reset_ms: u64,
    pub liveness_interval_ms: u64,
}

impl Default for GamepadConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            input_dir: PathBuf::from("/dev/input"),
            poll_timeout_ms: 100,
            scan_interval_ms: 5000,
            rejection_reset_ms: 60_000,
            liveness_interval_ms: 5000,
        }
    }
}

impl GamepadConfig {
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }

    pub fn scan_interval(&self) -> Duration {
        Duration::from_millis(self.scan_interval_ms)
    }

    pub fn rejection_reset(&self) -> Duration {
        Duration::from_millis(self.rejection_reset_ms)
    }

    pub fn liveness_interval(&self) -> Duration {
        Duration::from_millis(self.liveness_interval_ms)
    }
}

impl MonitorConfig {
    pub fn join_timeout(&self) -> Duration {
        Duration::from_millis(self.join_timeout_ms)
    }

    /// `<config_dir>/deckbuttons/config.toml`, falling back to the working directory.
    pub fn default_path() -> PathBuf {
        let base = dirs::config_dir().unwrap_or_else(|| {
            warn!("Could not determine config directory, using current directory");
            PathBuf::from(".")
        });
        base.join(CONFIG_DIR).join(CONFIG_FILE)
    }

    pub fn from_toml(content: &str) -> Result<Self, MonitorError> {
        Ok(toml::from_str(content)?)
    }

    /// Loads `path`, or the defaults when it does not exist.
    pub fn load(path: &Path) -> Result<Self, MonitorError> {
        if !path.exists() {
            info!(
                "Config file {} does not exist, using defaults",
                path.display()
            );
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|e| {
            MonitorError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let config = Self::from_toml(&content)?;
        debug!("Loaded config from {}: {:?}", path.display(), config);
        Ok(config)
    }
}
