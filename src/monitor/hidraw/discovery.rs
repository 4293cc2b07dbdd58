//! Locating the controller's gamepad hidraw node
//!
//! The Steam Deck controller exposes three hidraw interfaces sharing one
//! vendor/product pair; only USB interface `1.2` carries button reports.
//! Candidates are collected from the numbered nodes and handed to an ordered
//! list of [`DiscoveryStrategy`]s, the first match wins:
//!
//! 1. [`InterfaceSymlink`]: the sysfs class link points at interface `:1.2/`
//! 2. [`DataProbe`]: the node delivers a report within a short wait
//! 3. [`HighestNumbered`]: the last candidate, usually the gamepad interface

use crate::config::HidrawConfig;
use crate::monitor::sys;
use crate::monitor::MonitorError;
use nix::fcntl::OFlag;
use std::fs::{self, OpenOptions};
use std::io::Read;
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::AsFd;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Sysfs path fragment identifying the gamepad USB interface
pub const GAMEPAD_INTERFACE: &str = ":1.2/";

/// A hidraw node whose uevent matched the wanted vendor and product
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Candidate {
    pub index: u32,
    /// `/dev/hidrawN`
    pub dev_path: PathBuf,
    /// `/sys/class/hidraw/hidrawN`
    pub class_path: PathBuf,
}

/// Case-insensitive match of both 4-digit hex ids in a uevent file.
pub fn uevent_matches(content: &str, vendor_id: u16, product_id: u16) -> bool {
    let content = content.to_ascii_uppercase();
    content.contains(&format!("{:04X}", vendor_id))
        && content.contains(&format!("{:04X}", product_id))
}

/// Collects matching nodes among `hidraw0..hidraw{max_nodes-1}`, in index order.
pub fn enumerate_candidates(config: &HidrawConfig) -> Vec<Candidate> {
    let mut candidates = Vec::new();

    for index in 0..config.max_nodes {
        let name = format!("hidraw{}", index);
        let dev_path = config.dev_dir.join(&name);
        if !dev_path.exists() {
            continue;
        }

        let class_path = config.class_dir.join(&name);
        let uevent_path = class_path.join("device").join("uevent");
        match fs::read_to_string(&uevent_path) {
            Ok(content) if uevent_matches(&content, config.vendor_id, config.product_id) => {
                debug!("Found controller candidate at {}", dev_path.display());
                candidates.push(Candidate {
                    index,
                    dev_path,
                    class_path,
                });
            }
            Ok(_) => {}
            Err(e) => debug!("Cannot read uevent for {}: {}", name, e),
        }
    }

    candidates
}

/// One way of picking the gamepad node among candidates
pub trait DiscoveryStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn select(&self, candidates: &[Candidate]) -> Option<PathBuf>;
}

/// Picks the candidate whose class symlink resolves through the gamepad interface.
pub struct InterfaceSymlink {
    pub interface: &'static str,
}

impl Default for InterfaceSymlink {
    fn default() -> Self {
        Self {
            interface: GAMEPAD_INTERFACE,
        }
    }
}

impl DiscoveryStrategy for InterfaceSymlink {
    fn name(&self) -> &'static str {
        "interface-symlink"
    }

    fn select(&self, candidates: &[Candidate]) -> Option<PathBuf> {
        candidates.iter().find_map(|candidate| {
            match fs::read_link(&candidate.class_path) {
                Ok(target) if target.to_string_lossy().contains(self.interface) => {
                    Some(candidate.dev_path.clone())
                }
                Ok(_) => None,
                Err(e) => {
                    debug!(
                        "Cannot read symlink {}: {}",
                        candidate.class_path.display(),
                        e
                    );
                    None
                }
            }
        })
    }
}

/// Picks the first candidate that delivers data within `timeout`.
pub struct DataProbe {
    pub timeout: Duration,
    pub packet_size: usize,
}

impl DataProbe {
    fn has_data(&self, path: &Path) -> std::io::Result<bool> {
        let mut file = OpenOptions::new()
            .read(true)
            .custom_flags(OFlag::O_NONBLOCK.bits())
            .open(path)?;

        if !sys::wait_readable(file.as_fd(), self.timeout)? {
            return Ok(false);
        }
        let mut buf = vec![0u8; self.packet_size.max(1)];
        let _ = file.read(&mut buf)?;
        Ok(true)
    }
}

impl DiscoveryStrategy for DataProbe {
    fn name(&self) -> &'static str {
        "data-probe"
    }

    fn select(&self, candidates: &[Candidate]) -> Option<PathBuf> {
        candidates.iter().find_map(|candidate| {
            match self.has_data(&candidate.dev_path) {
                Ok(true) => Some(candidate.dev_path.clone()),
                Ok(false) => None,
                Err(e) => {
                    debug!("Cannot probe {}: {}", candidate.dev_path.display(), e);
                    None
                }
            }
        })
    }
}

/// Picks the highest-numbered candidate.
pub struct HighestNumbered;

impl DiscoveryStrategy for HighestNumbered {
    fn name(&self) -> &'static str {
        "highest-numbered"
    }

    fn select(&self, candidates: &[Candidate]) -> Option<PathBuf> {
        candidates
            .iter()
            .max_by_key(|candidate| candidate.index)
            .map(|candidate| candidate.dev_path.clone())
    }
}

pub fn default_strategies(config: &HidrawConfig) -> Vec<Box<dyn DiscoveryStrategy>> {
    vec![
        Box::new(InterfaceSymlink::default()),
        Box::new(DataProbe {
            timeout: config.probe_timeout(),
            packet_size: config.packet_size,
        }),
        Box::new(HighestNumbered),
    ]
}

/// Runs `strategies` in order over `candidates`.
pub fn select_device(
    candidates: &[Candidate],
    strategies: &[Box<dyn DiscoveryStrategy>],
) -> Option<PathBuf> {
    if candidates.is_empty() {
        return None;
    }
    strategies.iter().find_map(|strategy| {
        let selected = strategy.select(candidates);
        if let Some(path) = &selected {
            info!(
                "Selected controller at {} ({})",
                path.display(),
                strategy.name()
            );
        }
        selected
    })
}

/// Finds the controller's gamepad node with the default strategy chain.
pub fn discover(config: &HidrawConfig) -> Result<PathBuf, MonitorError> {
    let candidates = enumerate_candidates(config);
    let not_found = MonitorError::NoDevice {
        vendor_id: config.vendor_id,
        product_id: config.product_id,
    };

    if candidates.is_empty() {
        warn!("Steam Deck controller hidraw device not found");
        return Err(not_found);
    }

    select_device(&candidates, &default_strategies(config)).ok_or(not_found)
}
