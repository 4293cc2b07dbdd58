//! Button identifiers, transition events and edge detection
//!
//! [`ButtonId`] is shared by both device classes, so consumers never need to know
//! whether the hidraw controller or an evdev gamepad produced a press.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::time::Instant;

/// Logical button names, identical across device classes
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ButtonId {
    A,
    B,
    X,
    Y,
    L1,
    L2,
    L3,
    L4,
    L5,
    R1,
    R2,
    R3,
    R4,
    R5,
    DpadUp,
    DpadDown,
    DpadLeft,
    DpadRight,
    Select,
    Start,
    /// The Steam / guide / mode button
    Steam,
    /// Quick access menu button
    Qam,
    LeftPadTouch,
    RightPadTouch,
    LeftPadClick,
    RightPadClick,
}

impl ButtonId {
    pub const ALL: [ButtonId; 26] = [
        ButtonId::A,
        ButtonId::B,
        ButtonId::X,
        ButtonId::Y,
        ButtonId::L1,
        ButtonId::L2,
        ButtonId::L3,
        ButtonId::L4,
        ButtonId::L5,
        ButtonId::R1,
        ButtonId::R2,
        ButtonId::R3,
        ButtonId::R4,
        ButtonId::R5,
        ButtonId::DpadUp,
        ButtonId::DpadDown,
        ButtonId::DpadLeft,
        ButtonId::DpadRight,
        ButtonId::Select,
        ButtonId::Start,
        ButtonId::Steam,
        ButtonId::Qam,
        ButtonId::LeftPadTouch,
        ButtonId::RightPadTouch,
        ButtonId::LeftPadClick,
        ButtonId::RightPadClick,
    ];

    /// Canonical upper-case name used in logs and settings
    pub fn as_str(self) -> &'static str {
        match self {
            ButtonId::A => "A",
            ButtonId::B => "B",
            ButtonId::X => "X",
            ButtonId::Y => "Y",
            ButtonId::L1 => "L1",
            ButtonId::L2 => "L2",
            ButtonId::L3 => "L3",
            ButtonId::L4 => "L4",
            ButtonId::L5 => "L5",
            ButtonId::R1 => "R1",
            ButtonId::R2 => "R2",
            ButtonId::R3 => "R3",
            ButtonId::R4 => "R4",
            ButtonId::R5 => "R5",
            ButtonId::DpadUp => "DPAD_UP",
            ButtonId::DpadDown => "DPAD_DOWN",
            ButtonId::DpadLeft => "DPAD_LEFT",
            ButtonId::DpadRight => "DPAD_RIGHT",
            ButtonId::Select => "SELECT",
            ButtonId::Start => "START",
            ButtonId::Steam => "STEAM",
            ButtonId::Qam => "QAM",
            ButtonId::LeftPadTouch => "LEFT_PAD_TOUCH",
            ButtonId::RightPadTouch => "RIGHT_PAD_TOUCH",
            ButtonId::LeftPadClick => "LEFT_PAD_CLICK",
            ButtonId::RightPadClick => "RIGHT_PAD_CLICK",
        }
    }
}

impl fmt::Display for ButtonId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown button name: {0}")]
pub struct UnknownButton(pub String);

impl FromStr for ButtonId {
    type Err = UnknownButton;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        ButtonId::ALL
            .iter()
            .copied()
            .find(|button| button.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| UnknownButton(s.to_string()))
    }
}

/// Set of currently asserted buttons
///
/// Ordered so snapshots, status output and emitted transitions are deterministic.
pub type ButtonSet = BTreeSet<ButtonId>;

/// A single press or release transition
#[derive(Clone, Debug, Serialize)]
pub struct ButtonEvent {
    pub button: ButtonId,
    pub pressed: bool,
    /// Monotonic capture time, suitable for hold-duration measurement
    #[serde(skip)]
    pub at: Instant,
    /// Wall-clock capture time for consumers outside the process
    pub captured_at: DateTime<Local>,
}

impl ButtonEvent {
    pub fn new(button: ButtonId, pressed: bool, at: Instant, captured_at: DateTime<Local>) -> Self {
        Self {
            button,
            pressed,
            at,
            captured_at,
        }
    }
}

/// Derives the transitions between two full-state snapshots.
///
/// Releases come first, then presses; both groups are in [`ButtonId`] order.
/// Every event shares the same capture stamp.
pub fn transitions(
    previous: &ButtonSet,
    current: &ButtonSet,
    at: Instant,
    captured_at: DateTime<Local>,
) -> Vec<ButtonEvent> {
    let released = previous
        .difference(current)
        .map(|&button| ButtonEvent::new(button, false, at, captured_at));
    let pressed = current
        .difference(previous)
        .map(|&button| ButtonEvent::new(button, true, at, captured_at));
    released.chain(pressed).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(buttons: &[ButtonId]) -> ButtonSet {
        buttons.iter().copied().collect()
    }

    #[test]
    fn names_round_trip_through_from_str() {
        for button in ButtonId::ALL {
            assert_eq!(button.as_str().parse::<ButtonId>(), Ok(button));
        }
        assert_eq!("dpad_left".parse::<ButtonId>(), Ok(ButtonId::DpadLeft));
        assert!("TURBO".parse::<ButtonId>().is_err());
    }

    #[test]
    fn serde_name_matches_display() {
        let encoded = toml::Value::try_from(ButtonId::LeftPadClick).unwrap();
        assert_eq!(encoded.as_str(), Some("LEFT_PAD_CLICK"));
        let encoded = toml::Value::try_from(ButtonId::R4).unwrap();
        assert_eq!(encoded.as_str(), Some("R4"));
    }

    #[test]
    fn identical_snapshots_emit_nothing() {
        let state = set(&[ButtonId::A, ButtonId::Start]);
        assert!(transitions(&state, &state, Instant::now(), Local::now()).is_empty());
    }

    #[test]
    fn swap_emits_release_and_press() {
        let before = set(&[ButtonId::A]);
        let after = set(&[ButtonId::R2]);
        let events = transitions(&before, &after, Instant::now(), Local::now());

        assert_eq!(events.len(), 2);
        assert!(events
            .iter()
            .any(|e| e.button == ButtonId::A && !e.pressed));
        assert!(events
            .iter()
            .any(|e| e.button == ButtonId::R2 && e.pressed));
    }
}
