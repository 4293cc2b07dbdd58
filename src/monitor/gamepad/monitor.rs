use super::device::{EvdevOpener, InputDevice, InputOpener};
use super::{apply_key_event, classify, Rejection, ScanSchedule};
use crate::config::GamepadConfig;
use crate::monitor::buttons::ButtonSet;
use crate::monitor::shared::{lock, MonitorPhase, MonitorStatus, Worker};
use crate::monitor::sys;
use crate::monitor::{ButtonMonitor, MonitorError};
use std::collections::HashSet;
use std::fs;
use std::os::unix::io::{AsRawFd, BorrowedFd};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const MONITOR_NAME: &str = "gamepads";

#[derive(Debug, Default)]
struct GamepadShared {
    buttons: ButtonSet,
    device_paths: Vec<PathBuf>,
    error_count: u32,
    phase: MonitorPhase,
    /// Bumped by every `start` and `stop`
    generation: u64,
}

/// Monitor for externally attached evdev gamepads
pub struct GamepadMonitor {
    config: GamepadConfig,
    excluded_vendor: u16,
    join_timeout: Duration,
    opener: Arc<dyn InputOpener>,
    shared: Arc<Mutex<GamepadShared>>,
    running: Arc<AtomicBool>,
    worker: Option<Worker>,
    lingering: Option<Worker>,
}

impl GamepadMonitor {
    pub fn new(config: GamepadConfig, excluded_vendor: u16, join_timeout: Duration) -> Self {
        Self::with_opener(config, excluded_vendor, join_timeout, Arc::new(EvdevOpener))
    }

    /// Builds a monitor over a custom device source.
    pub fn with_opener(
        config: GamepadConfig,
        excluded_vendor: u16,
        join_timeout: Duration,
        opener: Arc<dyn InputOpener>,
    ) -> Self {
        Self {
            config,
            excluded_vendor,
            join_timeout,
            opener,
            shared: Arc::new(Mutex::new(GamepadShared::default())),
            running: Arc::new(AtomicBool::new(false)),
            worker: None,
            lingering: None,
        }
    }
}

impl ButtonMonitor for GamepadMonitor {
    fn name(&self) -> &'static str {
        MONITOR_NAME
    }

    fn start(&mut self) -> Result<(), MonitorError> {
        if self.is_running() {
            debug!("GamepadMonitor already running");
            return Ok(());
        }
        if !self.config.input_dir.is_dir() {
            return Err(MonitorError::Unavailable(format!(
                "{} does not exist",
                self.config.input_dir.display()
            )));
        }
        if let Some(mut worker) = self.lingering.take() {
            if !worker.stop(self.join_timeout) {
                self.lingering = Some(worker);
                return Err(MonitorError::Busy(MONITOR_NAME));
            }
        }

        let generation = {
            let mut shared = lock(&self.shared);
            *shared = GamepadShared {
                phase: MonitorPhase::Running,
                generation: shared.generation + 1,
                ..GamepadShared::default()
            };
            shared.generation
        };

        self.running = Arc::new(AtomicBool::new(false));
        let tracker = PadTracker::new(
            self.config.clone(),
            self.excluded_vendor,
            self.opener.clone(),
            self.shared.clone(),
            generation,
            self.running.clone(),
        );
        let worker = Worker::spawn("gamepad-monitor", self.running.clone(), move || {
            tracker.run()
        })?;
        self.worker = Some(worker);
        info!("GamepadMonitor started");
        Ok(())
    }

    fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(mut worker) = self.worker.take() {
            if !worker.stop(self.join_timeout) {
                self.lingering = Some(worker);
            }
            info!("GamepadMonitor stopped");
        }

        let mut shared = lock(&self.shared);
        *shared = GamepadShared {
            generation: shared.generation + 1,
            ..GamepadShared::default()
        };
    }

    fn is_running(&self) -> bool {
        self.worker.is_some() && self.running.load(Ordering::SeqCst)
    }

    fn button_state(&self) -> ButtonSet {
        lock(&self.shared).buttons.clone()
    }

    fn status(&self) -> MonitorStatus {
        let running = self.is_running();
        let shared = lock(&self.shared);
        MonitorStatus {
            monitor: MONITOR_NAME,
            running,
            initialized: running,
            phase: shared.phase,
            device_paths: shared.device_paths.clone(),
            error_count: shared.error_count,
            queue_size: 0,
            current_buttons: shared.buttons.iter().copied().collect(),
            last_buttons_l: None,
            last_buttons_h: None,
        }
    }
}

impl Drop for GamepadMonitor {
    fn drop(&mut self) {
        if self.worker.is_some() {
            self.stop();
        }
    }
}

struct TrackedPad {
    path: PathBuf,
    device: Box<dyn InputDevice>,
    /// Buttons this pad currently holds
    held: ButtonSet,
}

/// Worker-side state: open pads and the rejection cache
struct PadTracker {
    config: GamepadConfig,
    excluded_vendor: u16,
    opener: Arc<dyn InputOpener>,
    shared: Arc<Mutex<GamepadShared>>,
    generation: u64,
    running: Arc<AtomicBool>,
    pads: Vec<TrackedPad>,
    rejected: HashSet<PathBuf>,
}

/// Locks `shared` unless a newer run owns it; a stale tracker stops itself.
fn current<'a>(
    shared: &'a Mutex<GamepadShared>,
    generation: u64,
    running: &AtomicBool,
) -> Option<MutexGuard<'a, GamepadShared>> {
    let guard = lock(shared);
    if guard.generation == generation {
        return Some(guard);
    }
    debug!("GamepadMonitor loop generation {} superseded", generation);
    running.store(false, Ordering::SeqCst);
    None
}

impl PadTracker {
    fn new(
        config: GamepadConfig,
        excluded_vendor: u16,
        opener: Arc<dyn InputOpener>,
        shared: Arc<Mutex<GamepadShared>>,
        generation: u64,
        running: Arc<AtomicBool>,
    ) -> Self {
        Self {
            config,
            excluded_vendor,
            opener,
            shared,
            generation,
            running,
            pads: Vec::new(),
            rejected: HashSet::new(),
        }
    }

    fn run(mut self) {
        info!("GamepadMonitor loop started");
        let mut schedule = ScanSchedule::new(&self.config, Instant::now());

        while self.running.load(Ordering::SeqCst) {
            let now = Instant::now();
            if schedule.rejection_reset_due(now) {
                self.reset_rejections();
            }
            if schedule.scan_due(now) {
                self.scan();
            }
            if schedule.liveness_due(now) {
                self.prune_dead();
            }

            if self.pads.is_empty() {
                thread::sleep(self.config.poll_timeout());
                continue;
            }
            self.poll_once();
        }

        self.pads.clear();
        info!("GamepadMonitor loop ended");
    }

    fn reset_rejections(&mut self) {
        if !self.rejected.is_empty() {
            debug!("Clearing {} rejected input devices", self.rejected.len());
            self.rejected.clear();
        }
    }

    fn event_nodes(&self) -> Vec<PathBuf> {
        let entries = match fs::read_dir(&self.config.input_dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Cannot list {}: {}", self.config.input_dir.display(), e);
                return Vec::new();
            }
        };

        let mut nodes: Vec<PathBuf> = entries
            .flatten()
            .filter(|entry| entry.file_name().to_string_lossy().starts_with("event"))
            .map(|entry| entry.path())
            .collect();
        nodes.sort();
        nodes
    }

    /// Opens and classifies every untracked, unrejected event node.
    ///
    /// Returns the number of newly tracked pads.
    fn scan(&mut self) -> usize {
        let mut added = 0;
        for path in self.event_nodes() {
            if self.rejected.contains(&path) || self.pads.iter().any(|pad| pad.path == path) {
                continue;
            }

            match self.open_candidate(&path) {
                Ok(device) => {
                    info!(
                        "Tracking gamepad {} ({})",
                        path.display(),
                        device.capabilities().name
                    );
                    self.pads.push(TrackedPad {
                        path,
                        device,
                        held: ButtonSet::new(),
                    });
                    added += 1;
                }
                Err(reason) => {
                    debug!("Skipping {}: {}", path.display(), reason);
                    self.rejected.insert(path);
                }
            }
        }

        if added > 0 {
            self.publish();
        }
        added
    }

    fn open_candidate(&self, path: &Path) -> Result<Box<dyn InputDevice>, Rejection> {
        let device = self
            .opener
            .open(path)
            .map_err(|e| Rejection::OpenFailed(e.to_string()))?;
        classify(&device.capabilities(), self.excluded_vendor)?;
        Ok(device)
    }

    fn poll_once(&mut self) {
        let fds: Vec<BorrowedFd<'_>> = self.pads.iter().map(|pad| pad.device.fd()).collect();
        let readiness = match sys::poll_many(&fds, self.config.poll_timeout()) {
            Ok(readiness) => readiness,
            Err(e) => {
                warn!("Gamepad poll failed: {}", e);
                if let Some(mut shared) = current(&self.shared, self.generation, &self.running) {
                    shared.error_count += 1;
                }
                thread::sleep(self.config.poll_timeout());
                return;
            }
        };

        let mut lost = Vec::new();
        let mut changed = false;
        for (index, ready) in readiness.iter().enumerate() {
            if ready.readable {
                match self.read_pad(index) {
                    Ok(pad_changed) => changed |= pad_changed,
                    Err(e) => {
                        warn!("Read error on {}: {}", self.pads[index].path.display(), e);
                        lost.push(index);
                    }
                }
            } else if ready.is_dead() {
                warn!("Gamepad {} is no longer valid", self.pads[index].path.display());
                lost.push(index);
            }
        }

        if !lost.is_empty() {
            if let Some(mut shared) = current(&self.shared, self.generation, &self.running) {
                shared.error_count += lost.len() as u32;
            }
            self.remove(&lost);
        } else if changed {
            self.publish();
        }
    }

    /// Applies one pad's pending key events; returns whether its held set changed.
    fn read_pad(&mut self, index: usize) -> std::io::Result<bool> {
        let pad = &mut self.pads[index];
        let mut changed = false;
        for (code, value) in pad.device.fetch_keys()? {
            if let Some(button) = apply_key_event(&mut pad.held, code, value) {
                debug!(
                    "Gamepad button {} {}",
                    button,
                    if value == 1 { "pressed" } else { "released" }
                );
                changed = true;
            }
        }
        Ok(changed)
    }

    /// Drops pads whose descriptor or device node is gone.
    fn prune_dead(&mut self) {
        let dead: Vec<usize> = self
            .pads
            .iter()
            .enumerate()
            .filter(|(_, pad)| {
                !sys::descriptor_is_open(pad.device.fd().as_raw_fd()) || !pad.path.exists()
            })
            .map(|(index, _)| index)
            .collect();

        if !dead.is_empty() {
            self.remove(&dead);
        }
    }

    fn remove(&mut self, indices: &[usize]) {
        let mut sorted = indices.to_vec();
        sorted.sort_unstable();
        sorted.dedup();

        for index in sorted.into_iter().rev() {
            let pad = self.pads.remove(index);
            info!("Stopped tracking gamepad {}", pad.path.display());
        }
        self.publish();
    }

    /// Publishes the tracked paths and the union of every pad's held buttons.
    fn publish(&self) {
        let Some(mut shared) = current(&self.shared, self.generation, &self.running) else {
            return;
        };
        shared.buttons = self
            .pads
            .iter()
            .flat_map(|pad| pad.held.iter().copied())
            .collect();
        shared.device_paths = self.pads.iter().map(|pad| pad.path.clone()).collect();
    }
}
