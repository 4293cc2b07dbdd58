//! Built-in controller monitor over the vendor raw-HID interface
//!
//! Steam normally consumes the back grips, Steam and QAM buttons before any
//! application sees them. Reading `/dev/hidrawN` directly, after switching the
//! controller out of its keyboard/mouse emulation, exposes every button.

pub mod device;
pub mod discovery;
pub mod monitor;

pub use device::{HidrawDevice, HidrawOpener, ReportDevice, SystemOpener};
pub use discovery::{discover, Candidate, DiscoveryStrategy};
pub use monitor::HidrawMonitor;
