//! Hidraw device access and controller initialization
//!
//! [`ReportDevice`] and [`HidrawOpener`] are the seams between the polling loop
//! and the kernel, so the loop can be driven by in-memory devices in tests.
//!
//! # Session lifecycle
//!
//! ```text
//! open ──► ControllerSession<Opened> ──configure()──► ControllerSession<Configured>
//!                                      (feature reports)
//! ```

use super::discovery;
use crate::config::HidrawConfig;
use crate::monitor::sys;
use crate::monitor::MonitorError;
use statum::{machine, state};
use std::fs::{File, OpenOptions};
use std::io::{self, Read};
use std::os::unix::io::AsFd;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Feature reports are always sent padded to this size
pub const FEATURE_REPORT_SIZE: usize = 64;

pub const ID_CLEAR_DIGITAL_MAPPINGS: u8 = 0x81;
pub const ID_SET_SETTINGS_VALUES: u8 = 0x87;

const SETTING_LEFT_TRACKPAD_MODE: u8 = 0x07;
const SETTING_RIGHT_TRACKPAD_MODE: u8 = 0x08;
const SETTING_STEAM_WATCHDOG_ENABLE: u8 = 0x2D;
const TRACKPAD_NONE: u8 = 0x07;

/// Zero-pads `payload` to a full feature report.
pub fn pad_report(payload: &[u8]) -> [u8; FEATURE_REPORT_SIZE] {
    let mut report = [0u8; FEATURE_REPORT_SIZE];
    let len = payload.len().min(FEATURE_REPORT_SIZE);
    report[..len].copy_from_slice(&payload[..len]);
    report
}

/// Disables the default keyboard/mouse emulation of the buttons.
pub fn clear_digital_mappings_report() -> [u8; FEATURE_REPORT_SIZE] {
    pad_report(&[ID_CLEAR_DIGITAL_MAPPINGS])
}

/// Turns off trackpad mouse emulation on both pads and the Steam watchdog.
pub fn disable_emulation_report() -> [u8; FEATURE_REPORT_SIZE] {
    let settings: [(u8, u8); 3] = [
        (SETTING_LEFT_TRACKPAD_MODE, TRACKPAD_NONE),
        (SETTING_RIGHT_TRACKPAD_MODE, TRACKPAD_NONE),
        (SETTING_STEAM_WATCHDOG_ENABLE, 0),
    ];

    let mut payload = vec![ID_SET_SETTINGS_VALUES, settings.len() as u8];
    for (key, value) in settings {
        payload.push(key);
        payload.push(value);
    }
    pad_report(&payload)
}

/// An open report-producing device
pub trait ReportDevice: Send {
    fn path(&self) -> &Path;

    /// Waits up to `timeout`; `Ok(false)` means nothing arrived.
    fn wait_readable(&mut self, timeout: Duration) -> io::Result<bool>;

    fn read_report(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    fn send_feature_report(&mut self, report: &[u8]) -> io::Result<()>;
}

/// Finds and opens the controller device
pub trait HidrawOpener: Send + Sync {
    fn discover(&self) -> Result<PathBuf, MonitorError>;

    fn open(&self, path: &Path) -> Result<Box<dyn ReportDevice>, MonitorError>;
}

/// `/dev/hidrawN` opened read-write
pub struct HidrawDevice {
    file: File,
    path: PathBuf,
}

impl HidrawDevice {
    pub fn open(path: &Path) -> Result<Self, MonitorError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|source| MonitorError::Open {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }
}

impl ReportDevice for HidrawDevice {
    fn path(&self) -> &Path {
        &self.path
    }

    fn wait_readable(&mut self, timeout: Duration) -> io::Result<bool> {
        sys::wait_readable(self.file.as_fd(), timeout)
    }

    fn read_report(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read(buf)
    }

    fn send_feature_report(&mut self, report: &[u8]) -> io::Result<()> {
        sys::send_feature_report(self.file.as_fd(), report)
    }
}

/// Discovers through sysfs and opens real hidraw nodes
pub struct SystemOpener {
    config: HidrawConfig,
}

impl SystemOpener {
    pub fn new(config: HidrawConfig) -> Self {
        Self { config }
    }
}

impl HidrawOpener for SystemOpener {
    fn discover(&self) -> Result<PathBuf, MonitorError> {
        discovery::discover(&self.config)
    }

    fn open(&self, path: &Path) -> Result<Box<dyn ReportDevice>, MonitorError> {
        Ok(Box::new(HidrawDevice::open(path)?))
    }
}

#[state]
#[derive(Debug, Clone)]
pub enum SessionState {
    Opened,
    Configured,
}

/// An opened controller on its way to full-button mode
#[machine]
pub struct ControllerSession<S: SessionState> {
    device: Box<dyn ReportDevice>,
    failed_reports: Vec<u8>,
}

impl ControllerSession<Opened> {
    /// Discovers (unless `known_path` is given) and opens the controller.
    pub fn connect(
        opener: &dyn HidrawOpener,
        known_path: Option<&Path>,
    ) -> Result<Self, MonitorError> {
        let path = match known_path {
            Some(path) => path.to_path_buf(),
            None => opener.discover()?,
        };

        let device = opener.open(&path).map_err(|e| {
            error!("Failed to open hidraw device: {}", e);
            e
        })?;
        info!("Opened {} for hidraw monitoring", path.display());
        Ok(Self::new(device, Vec::new()))
    }

    fn send(&mut self, command: u8, report: &[u8; FEATURE_REPORT_SIZE]) {
        match self.device.send_feature_report(report) {
            Ok(()) => debug!("Feature report 0x{:02x} sent", command),
            Err(source) => {
                let err = MonitorError::FeatureReport { command, source };
                warn!("{}", err);
                self.failed_reports.push(command);
            }
        }
    }

    /// Sends the full-button-mode feature reports.
    ///
    /// Failures leave the controller in its default (partially intercepted) mode
    /// but never abort the session.
    pub fn configure(mut self) -> ControllerSession<Configured> {
        self.send(ID_CLEAR_DIGITAL_MAPPINGS, &clear_digital_mappings_report());
        self.send(ID_SET_SETTINGS_VALUES, &disable_emulation_report());

        if self.failed_reports.is_empty() {
            info!("Steam Deck controller initialized for full button access");
        } else {
            warn!(
                "Controller running in degraded mode, failed reports: {:02x?}",
                self.failed_reports
            );
        }
        self.transition()
    }
}

impl ControllerSession<Configured> {
    /// Commands whose feature report was rejected
    pub fn failed_reports(&self) -> &[u8] {
        &self.failed_reports
    }

    pub fn into_device(self) -> Box<dyn ReportDevice> {
        self.device
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clear_mappings_is_single_command_byte() {
        let report = clear_digital_mappings_report();
        assert_eq!(report.len(), 64);
        assert_eq!(report[0], 0x81);
        assert!(report[1..].iter().all(|&b| b == 0));
    }

    #[test]
    fn settings_report_layout() {
        let report = disable_emulation_report();
        assert_eq!(
            &report[..8],
            &[0x87, 3, 0x07, 0x07, 0x08, 0x07, 0x2D, 0x00]
        );
        assert!(report[8..].iter().all(|&b| b == 0));
    }

    #[test]
    fn oversized_payload_is_truncated() {
        let report = pad_report(&[0xAA; 80]);
        assert_eq!(report, [0xAA; 64]);
    }
}
