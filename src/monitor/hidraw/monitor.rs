//! Background monitor for the built-in controller
//!
//! ```text
//! Stopped ──start()──► Initializing ──► Running ◄──► Reconnecting
//!    ▲                                     │              │
//!    └──────────────── stop() ─────────────┴──────────────┘
//! ```
//!
//! The worker owns the device descriptor. Every read error bumps a counter; when it
//! reaches `max_consecutive_errors` the descriptor is dropped, the discovered path
//! is forgotten and, after `reconnect_delay`, the controller is discovered and
//! initialized from scratch.
//!
//! Each `start` arms a fresh stop flag and bumps a generation counter in the
//! shared state. A worker that outlived its `stop` can never be re-armed, drops
//! its writes once the generation moved on, and must exit before the next
//! `start` may open the device again.

use super::device::{ControllerSession, HidrawOpener, ReportDevice, SystemOpener};
use crate::config::HidrawConfig;
use crate::monitor::buttons::{transitions, ButtonEvent, ButtonSet};
use crate::monitor::event_queue::EventQueue;
use crate::monitor::packet::{ButtonWords, MIN_REPORT_SIZE};
use crate::monitor::shared::{lock, sleep_while_running, MonitorPhase, MonitorStatus, Worker};
use crate::monitor::{ButtonMonitor, MonitorError};
use chrono::{DateTime, Local};
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

const MONITOR_NAME: &str = "hidraw";

/// Everything readers may observe, guarded by one mutex
#[derive(Debug)]
pub(crate) struct HidrawShared {
    pub buttons: ButtonSet,
    pub queue: EventQueue,
    pub last_words: Option<ButtonWords>,
    pub phase: MonitorPhase,
    pub initialized: bool,
    pub device_path: Option<PathBuf>,
    pub error_count: u32,
    /// Bumped by every `start` and `stop`; stale workers compare against it
    pub generation: u64,
}

impl HidrawShared {
    pub fn new(queue_capacity: usize) -> Self {
        Self {
            buttons: ButtonSet::new(),
            queue: EventQueue::new(queue_capacity),
            last_words: None,
            phase: MonitorPhase::Stopped,
            initialized: false,
            device_path: None,
            error_count: 0,
            generation: 0,
        }
    }

    /// Decodes `report`, updates the live state and queues the transitions.
    ///
    /// Returns the transitions emitted; short reports and reports with unchanged
    /// button words emit nothing.
    pub fn apply_report(
        &mut self,
        report: &[u8],
        at: Instant,
        captured_at: DateTime<Local>,
    ) -> Vec<ButtonEvent> {
        let Some(words) = ButtonWords::from_report(report) else {
            return Vec::new();
        };
        if self.last_words == Some(words) {
            return Vec::new();
        }

        let buttons = words.buttons();
        let events = transitions(&self.buttons, &buttons, at, captured_at);
        for event in &events {
            debug!(
                "Button {} {}",
                event.button,
                if event.pressed { "pressed" } else { "released" }
            );
            self.queue.push(event.clone());
        }
        self.buttons = buttons;
        self.last_words = Some(words);
        events
    }

    fn reset(&mut self) {
        self.buttons.clear();
        self.queue.clear();
        self.last_words = None;
        self.error_count = 0;
    }
}

/// Monitor for the Steam Deck built-in controller's hidraw interface
pub struct HidrawMonitor {
    config: HidrawConfig,
    join_timeout: Duration,
    opener: Arc<dyn HidrawOpener>,
    shared: Arc<Mutex<HidrawShared>>,
    running: Arc<AtomicBool>,
    worker: Option<Worker>,
    /// Worker that missed its join timeout and has not exited yet
    lingering: Option<Worker>,
}

impl HidrawMonitor {
    pub fn new(config: HidrawConfig, join_timeout: Duration) -> Self {
        let opener = Arc::new(SystemOpener::new(config.clone()));
        Self::with_opener(config, join_timeout, opener)
    }

    /// Builds a monitor over a custom device source.
    pub fn with_opener(
        config: HidrawConfig,
        join_timeout: Duration,
        opener: Arc<dyn HidrawOpener>,
    ) -> Self {
        let shared = Arc::new(Mutex::new(HidrawShared::new(config.queue_capacity)));
        Self {
            config,
            join_timeout,
            opener,
            shared,
            running: Arc::new(AtomicBool::new(false)),
            worker: None,
            lingering: None,
        }
    }

    pub fn get_events(&self, max_events: usize) -> Vec<ButtonEvent> {
        lock(&self.shared).queue.drain(max_events)
    }

    fn initialize(&self) -> Result<Box<dyn ReportDevice>, MonitorError> {
        let known_path = lock(&self.shared).device_path.clone();
        let session = ControllerSession::connect(self.opener.as_ref(), known_path.as_deref())?;
        Ok(session.configure().into_device())
    }

    /// Waits for a worker left over from a timed-out stop.
    fn reap_lingering(&mut self) -> Result<(), MonitorError> {
        if let Some(mut worker) = self.lingering.take() {
            if !worker.stop(self.join_timeout) {
                self.lingering = Some(worker);
                return Err(MonitorError::Busy(MONITOR_NAME));
            }
        }
        Ok(())
    }
}

impl ButtonMonitor for HidrawMonitor {
    fn name(&self) -> &'static str {
        MONITOR_NAME
    }

    fn start(&mut self) -> Result<(), MonitorError> {
        if self.is_running() {
            warn!("HidrawMonitor already running");
            return Ok(());
        }
        self.reap_lingering()?;

        let generation = {
            let mut shared = lock(&self.shared);
            shared.reset();
            shared.generation += 1;
            shared.phase = MonitorPhase::Initializing;
            shared.generation
        };

        let device = match self.initialize() {
            Ok(device) => device,
            Err(e) => {
                error!("Failed to initialize device, cannot start monitor: {}", e);
                let mut shared = lock(&self.shared);
                shared.phase = MonitorPhase::Stopped;
                shared.initialized = false;
                shared.device_path = None;
                return Err(e);
            }
        };

        {
            let mut shared = lock(&self.shared);
            shared.device_path = Some(device.path().to_path_buf());
            shared.initialized = true;
            shared.phase = MonitorPhase::Running;
        }

        self.running = Arc::new(AtomicBool::new(false));
        let poll_loop = PollLoop {
            config: self.config.clone(),
            opener: self.opener.clone(),
            shared: self.shared.clone(),
            generation,
            running: self.running.clone(),
            device: Some(device),
        };
        match Worker::spawn("hidraw-monitor", self.running.clone(), move || poll_loop.run()) {
            Ok(worker) => {
                self.worker = Some(worker);
                info!("HidrawMonitor started");
                Ok(())
            }
            Err(e) => {
                error!("{}", e);
                let mut shared = lock(&self.shared);
                shared.phase = MonitorPhase::Stopped;
                shared.initialized = false;
                Err(e)
            }
        }
    }

    fn stop(&mut self) {
        info!("Stopping HidrawMonitor");
        self.running.store(false, Ordering::SeqCst);
        if let Some(mut worker) = self.worker.take() {
            if !worker.stop(self.join_timeout) {
                self.lingering = Some(worker);
            }
        }

        let mut shared = lock(&self.shared);
        shared.generation += 1;
        shared.buttons.clear();
        shared.queue.clear();
        shared.last_words = None;
        shared.initialized = false;
        shared.phase = MonitorPhase::Stopped;
        info!("HidrawMonitor stopped");
    }

    fn is_running(&self) -> bool {
        self.worker.is_some() && self.running.load(Ordering::SeqCst)
    }

    fn button_state(&self) -> ButtonSet {
        lock(&self.shared).buttons.clone()
    }

    fn drain_events(&self, max_events: usize) -> Vec<ButtonEvent> {
        self.get_events(max_events)
    }

    fn status(&self) -> MonitorStatus {
        let running = self.is_running();
        let shared = lock(&self.shared);
        MonitorStatus {
            monitor: MONITOR_NAME,
            running,
            initialized: shared.initialized,
            phase: shared.phase,
            device_paths: shared.device_path.iter().cloned().collect(),
            error_count: shared.error_count,
            queue_size: shared.queue.len(),
            current_buttons: shared.buttons.iter().copied().collect(),
            last_buttons_l: shared.last_words.map(|w| format!("0x{:08x}", w.low)),
            last_buttons_h: shared.last_words.map(|w| format!("0x{:08x}", w.high)),
        }
    }
}

impl Drop for HidrawMonitor {
    fn drop(&mut self) {
        if self.worker.is_some() {
            self.stop();
        }
    }
}

/// State owned by the worker thread
struct PollLoop {
    config: HidrawConfig,
    opener: Arc<dyn HidrawOpener>,
    shared: Arc<Mutex<HidrawShared>>,
    generation: u64,
    running: Arc<AtomicBool>,
    device: Option<Box<dyn ReportDevice>>,
}

impl PollLoop {
    /// Locks the shared state unless a newer run owns it; a stale loop stops itself.
    fn shared(&self) -> Option<MutexGuard<'_, HidrawShared>> {
        let shared = lock(&self.shared);
        if shared.generation == self.generation {
            return Some(shared);
        }
        debug!("HidrawMonitor loop generation {} superseded", self.generation);
        self.running.store(false, Ordering::SeqCst);
        None
    }

    fn run(mut self) {
        info!("HidrawMonitor loop started");
        let mut buf = vec![0u8; self.config.packet_size.max(MIN_REPORT_SIZE)];

        while self.running.load(Ordering::SeqCst) {
            if self.device.is_none() && !self.reconnect() {
                continue;
            }
            let Some(device) = self.device.as_mut() else {
                continue;
            };

            let read = match device.wait_readable(self.config.poll_timeout()) {
                Ok(false) => continue,
                Ok(true) => device.read_report(&mut buf),
                Err(e) => Err(e),
            };

            match read {
                Ok(len) if len >= MIN_REPORT_SIZE => {
                    if let Some(mut shared) = self.shared() {
                        shared.apply_report(&buf[..len], Instant::now(), Local::now());
                        shared.error_count = 0;
                    }
                }
                Ok(len) => debug!("Discarding short report ({} bytes)", len),
                Err(e) => self.record_error(e),
            }
        }

        // Dropping the device closes the descriptor.
        self.device = None;
        info!("HidrawMonitor loop ended");
    }

    fn record_error(&mut self, err: io::Error) {
        if err.kind() == io::ErrorKind::Interrupted || err.kind() == io::ErrorKind::WouldBlock {
            return;
        }

        let count = match self.shared() {
            Some(mut shared) => {
                shared.error_count += 1;
                shared.error_count
            }
            None => return,
        };
        warn!("Hidraw read error ({}): {}", count, err);

        if count >= self.config.max_consecutive_errors {
            error!("Too many errors, closing device for reconnection");
            self.close_device();
            sleep_while_running(
                &self.running,
                self.config.reconnect_delay(),
                self.config.poll_timeout(),
            );
        }
    }

    fn close_device(&mut self) {
        self.device = None;
        let Some(mut shared) = self.shared() else {
            return;
        };
        shared.initialized = false;
        shared.device_path = None;
        shared.phase = MonitorPhase::Reconnecting;
    }

    /// One reconnect attempt; sleeps the reconnect delay on failure.
    fn reconnect(&mut self) -> bool {
        info!("Attempting to reconnect to hidraw device");
        match self.shared() {
            Some(mut shared) => shared.phase = MonitorPhase::Reconnecting,
            None => return false,
        }

        let attempt = ControllerSession::connect(self.opener.as_ref(), None)
            .map(|session| session.configure().into_device());
        match attempt {
            Ok(device) => {
                let Some(mut shared) = self.shared() else {
                    return false;
                };
                shared.device_path = Some(device.path().to_path_buf());
                shared.initialized = true;
                shared.error_count = 0;
                shared.phase = MonitorPhase::Running;
                drop(shared);
                self.device = Some(device);
                true
            }
            Err(e) => {
                warn!("Reconnect failed: {}", e);
                sleep_while_running(
                    &self.running,
                    self.config.reconnect_delay(),
                    self.config.poll_timeout(),
                );
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::buttons::ButtonId;
    use crate::monitor::packet::REPORT_SIZE;
    use std::collections::VecDeque;
    use std::path::Path;
    use std::sync::atomic::AtomicUsize;
    use std::thread;

    fn report(low: u32, high: u32) -> Vec<u8> {
        let mut buf = vec![0u8; REPORT_SIZE];
        buf[8..12].copy_from_slice(&low.to_le_bytes());
        buf[12..16].copy_from_slice(&high.to_le_bytes());
        buf
    }

    enum Step {
        Report(Vec<u8>),
        Fail(io::ErrorKind),
    }

    struct FakeDevice {
        path: PathBuf,
        script: VecDeque<Step>,
        pending: Option<Step>,
        feature_reports: Arc<Mutex<Vec<Vec<u8>>>>,
        reject_features: bool,
        wait_delay: Duration,
        closed: Arc<AtomicUsize>,
    }

    impl ReportDevice for FakeDevice {
        fn path(&self) -> &Path {
            &self.path
        }

        fn wait_readable(&mut self, timeout: Duration) -> io::Result<bool> {
            // Models a wait that overruns the join timeout.
            thread::sleep(self.wait_delay);
            match self.script.pop_front() {
                Some(step) => {
                    self.pending = Some(step);
                    Ok(true)
                }
                None => {
                    thread::sleep(timeout.min(Duration::from_millis(5)));
                    Ok(false)
                }
            }
        }

        fn read_report(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.pending.take() {
                Some(Step::Report(bytes)) => {
                    buf[..bytes.len()].copy_from_slice(&bytes);
                    Ok(bytes.len())
                }
                Some(Step::Fail(kind)) => Err(io::Error::from(kind)),
                None => Err(io::Error::from(io::ErrorKind::WouldBlock)),
            }
        }

        fn send_feature_report(&mut self, report: &[u8]) -> io::Result<()> {
            if self.reject_features {
                return Err(io::Error::from(nix::errno::Errno::EPIPE));
            }
            self.feature_reports.lock().unwrap().push(report.to_vec());
            Ok(())
        }
    }

    impl Drop for FakeDevice {
        fn drop(&mut self) {
            self.closed.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Hands out one scripted device per open call
    #[derive(Default)]
    struct FakeOpener {
        scripts: Mutex<VecDeque<Vec<Step>>>,
        discoverable: bool,
        reject_features: bool,
        wait_delay: Duration,
        opens: AtomicUsize,
        closed: Arc<AtomicUsize>,
        feature_reports: Arc<Mutex<Vec<Vec<u8>>>>,
    }

    impl FakeOpener {
        fn with_scripts(scripts: Vec<Vec<Step>>) -> Self {
            Self {
                scripts: Mutex::new(scripts.into()),
                discoverable: true,
                ..Self::default()
            }
        }
    }

    impl HidrawOpener for FakeOpener {
        fn discover(&self) -> Result<PathBuf, MonitorError> {
            if self.discoverable {
                Ok(PathBuf::from("/dev/hidraw2"))
            } else {
                Err(MonitorError::NoDevice {
                    vendor_id: 0x28DE,
                    product_id: 0x1205,
                })
            }
        }

        fn open(&self, path: &Path) -> Result<Box<dyn ReportDevice>, MonitorError> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            let script = self.scripts.lock().unwrap().pop_front().unwrap_or_default();
            Ok(Box::new(FakeDevice {
                path: path.to_path_buf(),
                script: script.into(),
                pending: None,
                feature_reports: self.feature_reports.clone(),
                reject_features: self.reject_features,
                wait_delay: self.wait_delay,
                closed: self.closed.clone(),
            }))
        }
    }

    impl FakeOpener {
        fn live_handles(&self) -> usize {
            self.opens.load(Ordering::SeqCst) - self.closed.load(Ordering::SeqCst)
        }
    }

    fn test_config() -> HidrawConfig {
        HidrawConfig {
            poll_timeout_ms: 5,
            reconnect_delay_ms: 20,
            ..HidrawConfig::default()
        }
    }

    fn monitor_with(opener: Arc<FakeOpener>) -> HidrawMonitor {
        HidrawMonitor::with_opener(test_config(), Duration::from_secs(2), opener)
    }

    fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        condition()
    }

    #[test]
    fn steady_state_packets_emit_nothing() {
        let mut shared = HidrawShared::new(100);
        let packet = report(0x80 | 0x4000, 0);

        assert_eq!(shared.apply_report(&packet, Instant::now(), Local::now()).len(), 2);
        assert!(shared
            .apply_report(&packet, Instant::now(), Local::now())
            .is_empty());
        assert_eq!(shared.queue.len(), 2);
    }

    #[test]
    fn a_press_emits_exactly_one_event() {
        let mut shared = HidrawShared::new(100);
        let events = shared.apply_report(&report(0x80, 0), Instant::now(), Local::now());

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].button, ButtonId::A);
        assert!(events[0].pressed);
    }

    #[test]
    fn simultaneous_release_and_press() {
        let mut shared = HidrawShared::new(100);
        shared.apply_report(&report(0x80, 0), Instant::now(), Local::now());
        let events = shared.apply_report(&report(0x1, 0), Instant::now(), Local::now());

        assert_eq!(events.len(), 2);
        assert!(events.iter().any(|e| e.button == ButtonId::A && !e.pressed));
        assert!(events.iter().any(|e| e.button == ButtonId::R2 && e.pressed));
        assert_eq!(shared.buttons, [ButtonId::R2].into_iter().collect());
    }

    #[test]
    fn short_packets_are_ignored() {
        let mut shared = HidrawShared::new(100);
        assert!(shared
            .apply_report(&[0xFF; 12], Instant::now(), Local::now())
            .is_empty());
        assert!(shared.buttons.is_empty());
        assert!(shared.last_words.is_none());
    }

    #[test]
    fn start_fails_without_device() {
        let opener = Arc::new(FakeOpener::default());
        let mut monitor = monitor_with(opener.clone());

        assert!(matches!(monitor.start(), Err(MonitorError::NoDevice { .. })));
        assert!(!monitor.is_running());
        assert_eq!(monitor.status().phase, MonitorPhase::Stopped);
        assert_eq!(opener.opens.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn start_sends_both_feature_reports() {
        let opener = Arc::new(FakeOpener::with_scripts(vec![vec![]]));
        let mut monitor = monitor_with(opener.clone());
        monitor.start().unwrap();

        let reports = opener.feature_reports.lock().unwrap().clone();
        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0][0], 0x81);
        assert_eq!(reports[1][..2], [0x87, 3]);
        assert!(reports.iter().all(|r| r.len() == 64));

        let status = monitor.status();
        assert!(status.running);
        assert!(status.initialized);
        assert_eq!(status.device_paths, vec![PathBuf::from("/dev/hidraw2")]);
        monitor.stop();
    }

    #[test]
    fn rejected_feature_reports_are_not_fatal() {
        let opener = Arc::new(FakeOpener {
            reject_features: true,
            ..FakeOpener::with_scripts(vec![vec![Step::Report(report(0x80, 0))]])
        });
        let mut monitor = monitor_with(opener);

        assert!(monitor.start().is_ok());
        assert!(wait_until(|| monitor.button_state().contains(&ButtonId::A)));
        monitor.stop();
    }

    #[test]
    fn reports_flow_into_queue_and_state() {
        let opener = Arc::new(FakeOpener::with_scripts(vec![vec![
            Step::Report(report(0x80, 0)),
            Step::Report(report(0x80, 0)),
            Step::Report(vec![0u8; 8]),
            Step::Report(report(0x80 | 0x4000, 0x40000)),
        ]]));
        let mut monitor = monitor_with(opener);
        monitor.start().unwrap();

        assert!(wait_until(|| monitor.status().queue_size == 3));
        assert_eq!(
            monitor.button_state(),
            [ButtonId::A, ButtonId::Start, ButtonId::Qam]
                .into_iter()
                .collect()
        );

        let first = monitor.get_events(1);
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].button, ButtonId::A);
        let rest = monitor.get_events(10);
        assert_eq!(rest.len(), 2);
        assert!(rest.iter().all(|e| e.pressed));

        let status = monitor.status();
        assert_eq!(status.last_buttons_l.as_deref(), Some("0x00004080"));
        assert_eq!(status.last_buttons_h.as_deref(), Some("0x00040000"));
        monitor.stop();
    }

    #[test]
    fn persistent_errors_force_reconnect() {
        let failing = (0..10)
            .map(|_| Step::Fail(io::ErrorKind::BrokenPipe))
            .collect();
        let opener = Arc::new(FakeOpener::with_scripts(vec![
            failing,
            vec![Step::Report(report(0x200, 0))],
        ]));
        let mut monitor = monitor_with(opener.clone());
        monitor.start().unwrap();
        assert_eq!(opener.opens.load(Ordering::SeqCst), 1);

        assert!(wait_until(|| opener.closed.load(Ordering::SeqCst) == 1));
        assert!(wait_until(|| opener.opens.load(Ordering::SeqCst) == 2));
        assert!(wait_until(|| monitor
            .button_state()
            .contains(&ButtonId::DpadRight)));

        let status = monitor.status();
        assert_eq!(status.phase, MonitorPhase::Running);
        assert_eq!(status.error_count, 0);
        monitor.stop();
        assert_eq!(opener.closed.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn transient_errors_below_threshold_keep_device() {
        let mut script: Vec<Step> = (0..9)
            .map(|_| Step::Fail(io::ErrorKind::BrokenPipe))
            .collect();
        script.push(Step::Report(report(0x20, 0)));
        let opener = Arc::new(FakeOpener::with_scripts(vec![script]));
        let mut monitor = monitor_with(opener.clone());
        monitor.start().unwrap();

        assert!(wait_until(|| monitor.button_state().contains(&ButtonId::B)));
        assert_eq!(opener.opens.load(Ordering::SeqCst), 1);
        assert_eq!(monitor.status().error_count, 0);
        monitor.stop();
    }

    #[test]
    fn stop_is_idempotent_and_clears_state() {
        let opener = Arc::new(FakeOpener::with_scripts(vec![vec![Step::Report(
            report(0x80, 0),
        )]]));
        let mut monitor = monitor_with(opener.clone());
        monitor.start().unwrap();
        assert!(wait_until(|| !monitor.button_state().is_empty()));

        monitor.stop();
        assert!(!monitor.status().running);
        monitor.stop();
        let status = monitor.status();
        assert!(!status.running);
        assert_eq!(status.phase, MonitorPhase::Stopped);
        assert!(status.current_buttons.is_empty());
        assert_eq!(status.queue_size, 0);
        assert_eq!(opener.closed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn second_start_is_a_no_op() {
        let opener = Arc::new(FakeOpener::with_scripts(vec![vec![]]));
        let mut monitor = monitor_with(opener.clone());
        monitor.start().unwrap();
        monitor.start().unwrap();
        assert_eq!(opener.opens.load(Ordering::SeqCst), 1);
        monitor.stop();
    }

    #[test]
    fn restart_waits_for_a_worker_that_missed_its_join() {
        let opener = Arc::new(FakeOpener {
            wait_delay: Duration::from_millis(100),
            ..FakeOpener::with_scripts(vec![
                vec![Step::Report(report(0x80, 0))],
                vec![],
            ])
        });
        let mut monitor =
            HidrawMonitor::with_opener(test_config(), Duration::from_millis(10), opener.clone());

        monitor.start().unwrap();
        thread::sleep(Duration::from_millis(20));
        monitor.stop();
        assert!(!monitor.status().running);

        // The old worker still holds the first device.
        assert!(matches!(monitor.start(), Err(MonitorError::Busy("hidraw"))));
        assert_eq!(opener.opens.load(Ordering::SeqCst), 1);

        // Its pending report lands after stop and must be discarded.
        assert!(wait_until(|| opener.live_handles() == 0));
        assert!(monitor.button_state().is_empty());
        assert_eq!(monitor.status().queue_size, 0);

        monitor.start().unwrap();
        assert_eq!(opener.opens.load(Ordering::SeqCst), 2);
        for _ in 0..30 {
            assert!(opener.live_handles() <= 1);
            thread::sleep(Duration::from_millis(10));
        }
        monitor.stop();
    }
}
