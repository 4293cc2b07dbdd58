//! Input-event device access
//!
//! [`InputDevice`] and [`InputOpener`] sit between the pad tracker and evdev, so
//! hot-plug and device loss can be exercised with in-memory devices.

use super::CandidateProbe;
use evdev::{Device, EventType};
use std::io;
use std::os::unix::io::{AsFd, BorrowedFd};
use std::path::Path;

/// An open `/dev/input/event*` node
pub trait InputDevice: Send {
    /// Identity and capabilities reported at open time
    fn capabilities(&self) -> CandidateProbe;

    /// Descriptor used for readiness polling
    fn fd(&self) -> BorrowedFd<'_>;

    /// Reads pending events and returns the key events as `(code, value)`.
    fn fetch_keys(&mut self) -> io::Result<Vec<(u16, i32)>>;
}

/// Opens event nodes found by the scan
pub trait InputOpener: Send + Sync {
    fn open(&self, path: &Path) -> io::Result<Box<dyn InputDevice>>;
}

pub struct EvdevDevice {
    device: Device,
}

impl InputDevice for EvdevDevice {
    fn capabilities(&self) -> CandidateProbe {
        let supported = self.device.supported_events();
        CandidateProbe {
            name: self.device.name().unwrap_or_default().to_string(),
            physical_path: self.device.physical_path().map(str::to_string),
            vendor_id: self.device.input_id().vendor(),
            has_keys: supported.contains(EventType::KEY),
            has_absolute_axes: supported.contains(EventType::ABSOLUTE),
        }
    }

    fn fd(&self) -> BorrowedFd<'_> {
        self.device.as_fd()
    }

    fn fetch_keys(&mut self) -> io::Result<Vec<(u16, i32)>> {
        Ok(self
            .device
            .fetch_events()?
            .filter(|event| event.event_type() == EventType::KEY)
            .map(|event| (event.code(), event.value()))
            .collect())
    }
}

#[derive(Debug, Default)]
pub struct EvdevOpener;

impl InputOpener for EvdevOpener {
    fn open(&self, path: &Path) -> io::Result<Box<dyn InputDevice>> {
        Ok(Box::new(EvdevDevice {
            device: Device::open(path)?,
        }))
    }
}
