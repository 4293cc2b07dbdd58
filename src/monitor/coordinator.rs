//! Monitor Coordinator - single entry point over both device classes
//!
//! Owns the built-in controller monitor (required) and the external gamepad
//! monitor (best-effort), and merges their state for consumers. The coordinator
//! itself performs no I/O; each monitor polls on its own worker thread.

use super::buttons::{ButtonEvent, ButtonSet};
use super::gamepad;
use super::hidraw::HidrawMonitor;
use super::shared::MonitorStatus;
use super::{ButtonMonitor, MonitorError};
use crate::config::MonitorConfig;
use serde::Serialize;
use tracing::{error, info, warn};

/// Composite diagnostic snapshot
#[derive(Clone, Debug, Serialize)]
pub struct CoordinatorStatus {
    pub hidraw: MonitorStatus,
    /// `None` when no gamepad monitor exists in this process
    pub gamepads: Option<MonitorStatus>,
    /// Whether external gamepad support is available at all
    pub gamepad_support: bool,
    /// Why gamepad support is missing, if it is
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gamepad_unavailable: Option<String>,
}

pub struct MonitorCoordinator {
    primary: Box<dyn ButtonMonitor>,
    gamepads: Option<Box<dyn ButtonMonitor>>,
    gamepad_unavailable: Option<String>,
}

impl MonitorCoordinator {
    pub fn new(config: &MonitorConfig) -> Self {
        let primary = Box::new(HidrawMonitor::new(
            config.hidraw.clone(),
            config.join_timeout(),
        ));

        if !config.gamepads.enabled {
            info!("External gamepad monitoring disabled in configuration");
            return Self::with_monitors(primary, None)
                .unavailable("disabled in configuration".to_string());
        }

        match gamepad::create(&config.gamepads, config.hidraw.vendor_id, config.join_timeout()) {
            Ok(gamepads) => Self::with_monitors(primary, Some(gamepads)),
            Err(e) => {
                warn!("{}", e);
                Self::with_monitors(primary, None).unavailable(e.to_string())
            }
        }
    }

    /// Builds a coordinator over arbitrary monitor implementations.
    pub fn with_monitors(
        primary: Box<dyn ButtonMonitor>,
        gamepads: Option<Box<dyn ButtonMonitor>>,
    ) -> Self {
        Self {
            primary,
            gamepads,
            gamepad_unavailable: None,
        }
    }

    fn unavailable(mut self, reason: String) -> Self {
        self.gamepad_unavailable = Some(reason);
        self
    }

    /// Starts both monitors; `false` only if the built-in controller failed.
    pub fn start(&mut self) -> bool {
        match self.try_start() {
            Ok(()) => true,
            Err(e) => {
                error!("Button monitoring failed to start: {}", e);
                false
            }
        }
    }

    /// Like [`start`](Self::start) but returns the primary monitor's error.
    pub fn try_start(&mut self) -> Result<(), MonitorError> {
        self.primary.start()?;

        if let Some(gamepads) = self.gamepads.as_mut() {
            if let Err(e) = gamepads.start() {
                warn!("External gamepad monitoring not started: {}", e);
            }
        }
        info!("Button monitoring started");
        Ok(())
    }

    /// Stops both monitors. Safe to call repeatedly.
    pub fn stop(&mut self) {
        self.primary.stop();
        if let Some(gamepads) = self.gamepads.as_mut() {
            gamepads.stop();
        }
        info!("Button monitoring stopped");
    }

    pub fn is_running(&self) -> bool {
        self.primary.is_running() || self.gamepads.as_ref().is_some_and(|g| g.is_running())
    }

    /// Drains up to `max_events` built-in controller transitions, oldest first.
    pub fn get_events(&self, max_events: usize) -> Vec<ButtonEvent> {
        self.primary.drain_events(max_events)
    }

    /// Union of the buttons held on every running monitor.
    pub fn get_button_state(&self) -> Result<ButtonSet, MonitorError> {
        let mut running = self
            .monitors()
            .filter(|monitor| monitor.is_running())
            .peekable();
        if running.peek().is_none() {
            return Err(MonitorError::NotRunning);
        }

        Ok(running.flat_map(|monitor| monitor.button_state()).collect())
    }

    pub fn get_status(&self) -> CoordinatorStatus {
        CoordinatorStatus {
            hidraw: self.primary.status(),
            gamepads: self.gamepads.as_ref().map(|g| g.status()),
            gamepad_support: self.gamepads.is_some(),
            gamepad_unavailable: self.gamepad_unavailable.clone(),
        }
    }

    fn monitors(&self) -> impl Iterator<Item = &(dyn ButtonMonitor + 'static)> + '_ {
        std::iter::once(self.primary.as_ref()).chain(self.gamepads.as_deref())
    }
}

impl Drop for MonitorCoordinator {
    fn drop(&mut self) {
        if self.is_running() {
            self.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::buttons::ButtonId;
    use crate::monitor::shared::MonitorPhase;
    use std::time::Instant;

    /// In-memory monitor with a fixed held set
    struct FakeMonitor {
        name: &'static str,
        held: ButtonSet,
        fail_start: bool,
        running: bool,
        events: Vec<ButtonEvent>,
    }

    impl FakeMonitor {
        fn holding(name: &'static str, held: &[ButtonId]) -> Self {
            Self {
                name,
                held: held.iter().copied().collect(),
                fail_start: false,
                running: false,
                events: Vec::new(),
            }
        }

        fn failing(name: &'static str) -> Self {
            Self {
                fail_start: true,
                ..Self::holding(name, &[])
            }
        }
    }

    impl ButtonMonitor for FakeMonitor {
        fn name(&self) -> &'static str {
            self.name
        }

        fn start(&mut self) -> Result<(), MonitorError> {
            if self.fail_start {
                return Err(MonitorError::Unavailable("fake".to_string()));
            }
            self.running = true;
            Ok(())
        }

        fn stop(&mut self) {
            self.running = false;
        }

        fn is_running(&self) -> bool {
            self.running
        }

        fn button_state(&self) -> ButtonSet {
            self.held.clone()
        }

        fn status(&self) -> MonitorStatus {
            MonitorStatus {
                running: self.running,
                initialized: self.running,
                phase: if self.running {
                    MonitorPhase::Running
                } else {
                    MonitorPhase::Stopped
                },
                ..MonitorStatus::stopped(self.name)
            }
        }

        fn drain_events(&self, max_events: usize) -> Vec<ButtonEvent> {
            self.events.iter().take(max_events).cloned().collect()
        }
    }

    fn set(buttons: &[ButtonId]) -> ButtonSet {
        buttons.iter().copied().collect()
    }

    #[test]
    fn state_from_primary_alone() {
        let mut coordinator = MonitorCoordinator::with_monitors(
            Box::new(FakeMonitor::holding("hidraw", &[ButtonId::A, ButtonId::Start])),
            Some(Box::new(FakeMonitor::failing("gamepads"))),
        );

        assert!(coordinator.start());
        assert_eq!(
            coordinator.get_button_state().unwrap(),
            set(&[ButtonId::A, ButtonId::Start])
        );
    }

    #[test]
    fn state_is_union_of_running_monitors() {
        let mut coordinator = MonitorCoordinator::with_monitors(
            Box::new(FakeMonitor::holding("hidraw", &[ButtonId::A, ButtonId::Start])),
            Some(Box::new(FakeMonitor::holding("gamepads", &[ButtonId::X]))),
        );

        assert!(coordinator.start());
        assert_eq!(
            coordinator.get_button_state().unwrap(),
            set(&[ButtonId::A, ButtonId::Start, ButtonId::X])
        );
    }

    #[test]
    fn state_requires_a_running_monitor() {
        let coordinator = MonitorCoordinator::with_monitors(
            Box::new(FakeMonitor::holding("hidraw", &[ButtonId::A])),
            None,
        );
        assert!(matches!(
            coordinator.get_button_state(),
            Err(MonitorError::NotRunning)
        ));
    }

    #[test]
    fn primary_failure_fails_start() {
        let mut coordinator = MonitorCoordinator::with_monitors(
            Box::new(FakeMonitor::failing("hidraw")),
            Some(Box::new(FakeMonitor::holding("gamepads", &[]))),
        );

        assert!(!coordinator.start());
        assert!(!coordinator.get_status().hidraw.running);
    }

    #[test]
    fn status_before_start() {
        let coordinator = MonitorCoordinator::with_monitors(
            Box::new(FakeMonitor::holding("hidraw", &[])),
            Some(Box::new(FakeMonitor::holding("gamepads", &[]))),
        );

        let status = coordinator.get_status();
        assert!(!status.hidraw.running);
        assert!(!status.hidraw.initialized);
        assert!(status.gamepad_support);
        assert!(status.gamepads.is_some_and(|g| !g.running));
    }

    #[test]
    fn missing_gamepad_support_is_reported() {
        let coordinator = MonitorCoordinator::with_monitors(
            Box::new(FakeMonitor::holding("hidraw", &[])),
            None,
        )
        .unavailable("built without the generic-gamepads feature".to_string());

        let status = coordinator.get_status();
        assert!(!status.gamepad_support);
        assert!(status.gamepads.is_none());
        assert!(status.gamepad_unavailable.is_some());
    }

    #[test]
    fn events_come_from_primary_only() {
        let now = Instant::now();
        let captured = chrono::Local::now();
        let mut primary = FakeMonitor::holding("hidraw", &[]);
        primary.events = vec![
            ButtonEvent::new(ButtonId::A, true, now, captured),
            ButtonEvent::new(ButtonId::A, false, now, captured),
        ];
        let mut coordinator =
            MonitorCoordinator::with_monitors(Box::new(primary), None);
        coordinator.start();

        let events = coordinator.get_events(1);
        assert_eq!(events.len(), 1);
        assert!(events[0].pressed);
    }

    #[test]
    fn stop_twice() {
        let mut coordinator = MonitorCoordinator::with_monitors(
            Box::new(FakeMonitor::holding("hidraw", &[ButtonId::A])),
            Some(Box::new(FakeMonitor::holding("gamepads", &[]))),
        );
        coordinator.start();

        coordinator.stop();
        assert!(!coordinator.get_status().hidraw.running);
        coordinator.stop();
        assert!(!coordinator.get_status().hidraw.running);
        assert!(!coordinator.is_running());
    }
}
