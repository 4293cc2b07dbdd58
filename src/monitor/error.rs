//! Error definitions for the monitor subsystem

use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced by the button monitors and their coordinator
///
/// None of these are fatal to the host: every background failure is logged and
/// folded into the reconnect cycle, and a failed `start` can simply be retried.
#[derive(Debug, Error)]
pub enum MonitorError {
    /// No hidraw node matched the controller's vendor and product ids
    #[error("No controller device found (vendor {vendor_id:04x}, product {product_id:04x})")]
    NoDevice { vendor_id: u16, product_id: u16 },

    /// A device node was found but could not be opened
    #[error("Failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The feature-report ioctl was rejected
    #[error("Feature report 0x{command:02x} failed: {source}")]
    FeatureReport {
        command: u8,
        #[source]
        source: std::io::Error,
    },

    /// Read or poll failure on an open descriptor
    #[error("Device I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The background worker thread could not be spawned
    #[error("Failed to spawn worker thread: {0}")]
    Spawn(String),

    /// Configuration file could not be read or parsed
    #[error("Configuration error: {0}")]
    Config(String),

    /// A worker from an earlier run still holds its device
    #[error("Previous {0} worker is still shutting down")]
    Busy(&'static str),

    /// State was requested while no monitor is running
    #[error("Monitor not running")]
    NotRunning,

    /// Generic gamepad support is missing on this build or host
    #[error("Generic gamepad support unavailable: {0}")]
    Unavailable(String),
}

impl From<toml::de::Error> for MonitorError {
    fn from(err: toml::de::Error) -> Self {
        MonitorError::Config(err.to_string())
    }
}
