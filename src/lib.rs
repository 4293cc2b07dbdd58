//! Low-level button monitoring for the Steam Deck
//!
//! Reads the built-in controller through its vendor hidraw interface, which
//! exposes the back grips, Steam and QAM buttons that the regular input layer
//! never sees, and merges in any external evdev gamepads.
//!
//! ```no_run
//! use deckbuttons::config::MonitorConfig;
//! use deckbuttons::monitor::MonitorCoordinator;
//!
//! let mut coordinator = MonitorCoordinator::new(&MonitorConfig::default());
//! if coordinator.start() {
//!     for event in coordinator.get_events(10) {
//!         println!("{} pressed={}", event.button, event.pressed);
//!     }
//!     coordinator.stop();
//! }
//! ```

pub mod config;
pub mod monitor;

pub use config::MonitorConfig;
pub use monitor::{
    ButtonEvent, ButtonId, ButtonMonitor, ButtonSet, CoordinatorStatus, MonitorCoordinator,
    MonitorError, MonitorStatus,
};
