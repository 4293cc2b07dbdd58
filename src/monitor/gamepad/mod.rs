//! External gamepad monitor over the kernel input-event interface
//!
//! Unlike the built-in controller there may be any number of these attached at
//! once. They are found by a periodic scan of `/dev/input/event*`, filtered by
//! capability, and only their key events are turned into button state. No event
//! queue is kept for them: consumers see live state only.

#[cfg(feature = "generic-gamepads")]
pub mod device;
#[cfg(feature = "generic-gamepads")]
mod monitor;

#[cfg(feature = "generic-gamepads")]
pub use device::{EvdevOpener, InputDevice, InputOpener};
#[cfg(feature = "generic-gamepads")]
pub use monitor::GamepadMonitor;

use crate::config::GamepadConfig;
use crate::monitor::buttons::{ButtonId, ButtonSet};
use crate::monitor::{ButtonMonitor, MonitorError};
use std::fmt;
use std::time::{Duration, Instant};

/// Whether evdev support was compiled into this build
pub const SUPPORT_COMPILED: bool = cfg!(feature = "generic-gamepads");

pub const EV_KEY_PRESS: i32 = 1;
pub const EV_KEY_RELEASE: i32 = 0;

/// Key codes consumed from generic gamepads (`linux/input-event-codes.h`)
pub const KEY_CODES: [(u16, ButtonId); 13] = [
    (0x130, ButtonId::A),      // BTN_SOUTH
    (0x131, ButtonId::B),      // BTN_EAST
    (0x133, ButtonId::X),      // BTN_NORTH
    (0x134, ButtonId::Y),      // BTN_WEST
    (0x136, ButtonId::L1),     // BTN_TL
    (0x137, ButtonId::R1),     // BTN_TR
    (0x138, ButtonId::L2),     // BTN_TL2
    (0x139, ButtonId::R2),     // BTN_TR2
    (0x13a, ButtonId::Select), // BTN_SELECT
    (0x13b, ButtonId::Start),  // BTN_START
    (0x13c, ButtonId::Steam),  // BTN_MODE
    (0x13d, ButtonId::L3),     // BTN_THUMBL
    (0x13e, ButtonId::R3),     // BTN_THUMBR
];

pub fn button_for_key(code: u16) -> Option<ButtonId> {
    KEY_CODES
        .iter()
        .find(|(key, _)| *key == code)
        .map(|(_, button)| *button)
}

/// Applies one key event to `state`; autorepeat (value 2) and unknown codes are ignored.
///
/// Returns the button if the state changed.
pub fn apply_key_event(state: &mut ButtonSet, code: u16, value: i32) -> Option<ButtonId> {
    let button = button_for_key(code)?;
    let changed = match value {
        EV_KEY_PRESS => state.insert(button),
        EV_KEY_RELEASE => state.remove(&button),
        _ => false,
    };
    changed.then_some(button)
}

/// What a freshly opened input device reports about itself
#[derive(Clone, Debug, Default)]
pub struct CandidateProbe {
    pub name: String,
    pub physical_path: Option<String>,
    pub vendor_id: u16,
    pub has_keys: bool,
    pub has_absolute_axes: bool,
}

/// Why an input device was not tracked
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Rejection {
    OpenFailed(String),
    Virtual,
    BuiltInController,
    NotGamepad,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::OpenFailed(reason) => write!(f, "cannot open: {}", reason),
            Rejection::Virtual => f.write_str("no physical path (virtual device)"),
            Rejection::BuiltInController => f.write_str("built-in controller vendor"),
            Rejection::NotGamepad => f.write_str("no key or absolute-axis capability"),
        }
    }
}

/// Decides whether a probed device is an external gamepad.
pub fn classify(probe: &CandidateProbe, excluded_vendor: u16) -> Result<(), Rejection> {
    let physical = probe
        .physical_path
        .as_deref()
        .map(str::trim)
        .unwrap_or_default();
    if physical.is_empty() {
        return Err(Rejection::Virtual);
    }
    if probe.vendor_id == excluded_vendor {
        return Err(Rejection::BuiltInController);
    }
    if !probe.has_keys && !probe.has_absolute_axes {
        return Err(Rejection::NotGamepad);
    }
    Ok(())
}

/// Timers driving the scan / rejection-reset / liveness cycle
#[derive(Debug)]
pub struct ScanSchedule {
    scan_interval: Duration,
    rejection_reset: Duration,
    liveness_interval: Duration,
    next_scan: Instant,
    next_rejection_reset: Instant,
    next_liveness: Instant,
}

impl ScanSchedule {
    /// The first scan is due immediately.
    pub fn new(config: &GamepadConfig, now: Instant) -> Self {
        Self {
            scan_interval: config.scan_interval(),
            rejection_reset: config.rejection_reset(),
            liveness_interval: config.liveness_interval(),
            next_scan: now,
            next_rejection_reset: now + config.rejection_reset(),
            next_liveness: now + config.liveness_interval(),
        }
    }

    pub fn scan_due(&mut self, now: Instant) -> bool {
        Self::fire(&mut self.next_scan, self.scan_interval, now)
    }

    pub fn rejection_reset_due(&mut self, now: Instant) -> bool {
        Self::fire(&mut self.next_rejection_reset, self.rejection_reset, now)
    }

    pub fn liveness_due(&mut self, now: Instant) -> bool {
        Self::fire(&mut self.next_liveness, self.liveness_interval, now)
    }

    fn fire(deadline: &mut Instant, interval: Duration, now: Instant) -> bool {
        if now < *deadline {
            return false;
        }
        *deadline = now + interval;
        true
    }
}

/// Builds the gamepad monitor, or explains why this build/host cannot have one.
pub fn create(
    config: &GamepadConfig,
    excluded_vendor: u16,
    join_timeout: Duration,
) -> Result<Box<dyn ButtonMonitor>, MonitorError> {
    #[cfg(feature = "generic-gamepads")]
    {
        Ok(Box::new(GamepadMonitor::new(
            config.clone(),
            excluded_vendor,
            join_timeout,
        )))
    }

    #[cfg(not(feature = "generic-gamepads"))]
    {
        let _ = (config, excluded_vendor, join_timeout);
        Err(MonitorError::Unavailable(
            "built without the generic-gamepads feature".to_string(),
        ))
    }
}
