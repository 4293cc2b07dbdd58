//! Button monitoring for the Steam Deck and attached gamepads
//!
//! Two device classes feed one logical button namespace:
//!
//! - **hidraw**: the built-in controller, read as 64-byte vendor reports after
//!   switching it out of keyboard/mouse emulation. Produces transition events.
//! - **gamepads**: external evdev devices, tracked as live state only.
//!
//! [`MonitorCoordinator`] owns both and is the single entry point for consumers.
//!
//! ```text
//! ┌───────────────┐  reports   ┌──────────────┐  events/state
//! │ /dev/hidrawN  │──────────►│ HidrawMonitor │──────────┐
//! └───────────────┘           └──────────────┘          ▼
//!                                                  ┌────────────────────┐
//! ┌───────────────┐  EV_KEY   ┌──────────────┐    │ MonitorCoordinator │
//! │ /dev/input/*  │──────────►│GamepadMonitor │───►└────────────────────┘
//! └───────────────┘           └──────────────┘        state only
//! ```

pub mod buttons;
pub mod coordinator;
pub mod error;
pub mod event_queue;
pub mod gamepad;
pub mod hidraw;
pub mod packet;
pub mod shared;
pub mod sys;

pub use buttons::{ButtonEvent, ButtonId, ButtonSet, UnknownButton};
pub use coordinator::{CoordinatorStatus, MonitorCoordinator};
pub use error::MonitorError;
pub use event_queue::EventQueue;
pub use hidraw::HidrawMonitor;
pub use shared::{MonitorPhase, MonitorStatus};

/// Common surface of both monitor kinds
///
/// `start` and `stop` are called from the owning thread; every accessor is safe
/// to call while the background worker is running.
pub trait ButtonMonitor: Send {
    /// Short name used in logs and status output
    fn name(&self) -> &'static str;

    /// Opens the device(s) and spawns the background worker.
    ///
    /// Calling `start` on a running monitor does nothing.
    fn start(&mut self) -> Result<(), MonitorError>;

    /// Stops the worker and clears all button state. Idempotent.
    fn stop(&mut self);

    fn is_running(&self) -> bool;

    /// Snapshot of the buttons currently held
    fn button_state(&self) -> ButtonSet;

    fn status(&self) -> MonitorStatus;

    /// Removes up to `max_events` queued transitions, oldest first.
    ///
    /// Monitors that only track state return nothing.
    fn drain_events(&self, _max_events: usize) -> Vec<ButtonEvent> {
        Vec::new()
    }
}
