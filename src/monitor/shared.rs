//! State shared between a monitor's owner and its background worker

use super::buttons::ButtonId;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use super::MonitorError;

/// Lifecycle phase of a monitor
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub enum MonitorPhase {
    #[default]
    Stopped,
    Initializing,
    Running,
    Reconnecting,
}

/// Diagnostic snapshot of one monitor, rebuilt on every request
#[derive(Clone, Debug, Serialize)]
pub struct MonitorStatus {
    pub monitor: &'static str,
    pub running: bool,
    pub initialized: bool,
    pub phase: MonitorPhase,
    pub device_paths: Vec<PathBuf>,
    pub error_count: u32,
    pub queue_size: usize,
    pub current_buttons: Vec<ButtonId>,
    /// Last raw `ButtonsL` word, hex formatted (hidraw only)
    pub last_buttons_l: Option<String>,
    /// Last raw `ButtonsH` word, hex formatted (hidraw only)
    pub last_buttons_h: Option<String>,
}

impl MonitorStatus {
    pub fn stopped(monitor: &'static str) -> Self {
        Self {
            monitor,
            running: false,
            initialized: false,
            phase: MonitorPhase::Stopped,
            device_paths: Vec::new(),
            error_count: 0,
            queue_size: 0,
            current_buttons: Vec::new(),
            last_buttons_l: None,
            last_buttons_h: None,
        }
    }
}

/// Locks `mutex`, recovering the data if a previous holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Sleeps for `total`, waking every `slice` to check `running`.
///
/// Returns `false` if the flag was cleared before the full delay elapsed.
pub(crate) fn sleep_while_running(running: &AtomicBool, total: Duration, slice: Duration) -> bool {
    let deadline = Instant::now() + total;
    let slice = slice.max(Duration::from_millis(1));
    loop {
        if !running.load(Ordering::SeqCst) {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        thread::sleep(slice.min(deadline - now));
    }
}

// Signals the owner when the worker closure returns or unwinds.
struct ExitSignal(mpsc::Sender<()>);

impl Drop for ExitSignal {
    fn drop(&mut self) {
        let _ = self.0.send(());
    }
}

/// Background thread plus its cooperative stop flag
pub(crate) struct Worker {
    name: String,
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
    exited: mpsc::Receiver<()>,
}

impl Worker {
    /// Sets `running` and spawns `body` on a named thread.
    pub fn spawn<F>(name: &str, running: Arc<AtomicBool>, body: F) -> Result<Self, MonitorError>
    where
        F: FnOnce() + Send + 'static,
    {
        let (exit_tx, exited) = mpsc::channel();
        running.store(true, Ordering::SeqCst);

        let spawned = thread::Builder::new().name(name.to_string()).spawn(move || {
            let _signal = ExitSignal(exit_tx);
            body();
        });

        match spawned {
            Ok(thread) => Ok(Self {
                name: name.to_string(),
                running,
                thread: Some(thread),
                exited,
            }),
            Err(e) => {
                running.store(false, Ordering::SeqCst);
                Err(MonitorError::Spawn(e.to_string()))
            }
        }
    }

    /// Clears the stop flag and waits up to `timeout` for the thread to exit.
    ///
    /// Returns `false` if the thread is still running; the worker can then be
    /// kept and stopped again later.
    pub fn stop(&mut self, timeout: Duration) -> bool {
        self.running.store(false, Ordering::SeqCst);
        let Some(thread) = self.thread.take() else {
            return true;
        };

        match self.exited.recv_timeout(timeout) {
            Ok(()) | Err(mpsc::RecvTimeoutError::Disconnected) => {
                if thread.join().is_err() {
                    warn!("Worker {} panicked before exiting", self.name);
                }
                debug!("Worker {} joined", self.name);
                true
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {
                warn!(
                    "Worker {} did not exit within {:?}, leaving it to finish",
                    self.name, timeout
                );
                self.thread = Some(thread);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worker_observes_stop_flag() {
        let running = Arc::new(AtomicBool::new(false));
        let flag = running.clone();
        let mut worker = Worker::spawn("test-worker", running.clone(), move || {
            while flag.load(Ordering::SeqCst) {
                thread::sleep(Duration::from_millis(5));
            }
        })
        .unwrap();

        assert!(running.load(Ordering::SeqCst));
        assert!(worker.stop(Duration::from_secs(2)));
        assert!(!running.load(Ordering::SeqCst));
    }

    #[test]
    fn slow_worker_can_be_stopped_again() {
        let running = Arc::new(AtomicBool::new(false));
        let mut worker = Worker::spawn("slow-worker", running, || {
            thread::sleep(Duration::from_millis(150));
        })
        .unwrap();

        assert!(!worker.stop(Duration::from_millis(20)));
        assert!(worker.stop(Duration::from_secs(2)));
        assert!(worker.stop(Duration::from_millis(1)));
    }

    #[test]
    fn interrupted_sleep_reports_early_exit() {
        let running = AtomicBool::new(false);
        let started = Instant::now();
        assert!(!sleep_while_running(
            &running,
            Duration::from_secs(2),
            Duration::from_millis(10)
        ));
        assert!(started.elapsed() < Duration::from_secs(1));

        let running = AtomicBool::new(true);
        assert!(sleep_while_running(
            &running,
            Duration::from_millis(20),
            Duration::from_millis(5)
        ));
    }
}
