//! Steam Deck controller input report decoding
//!
//! The controller's 64-byte input report carries two little-endian button words:
//! `ButtonsL` at bytes `8..12` and `ButtonsH` at bytes `12..16`. Every other byte
//! (sticks, triggers, trackpads, IMU) is ignored here.

use super::buttons::{ButtonId, ButtonSet};

/// Size of a full input report
pub const REPORT_SIZE: usize = 64;

/// Reports shorter than this cannot hold both button words
pub const MIN_REPORT_SIZE: usize = 16;

const BUTTONS_L_OFFSET: usize = 8;
const BUTTONS_H_OFFSET: usize = 12;

/// `ButtonsL` bit assignments
pub const BUTTONS_L: [(ButtonId, u32); 23] = [
    (ButtonId::R2, 0x0000_0001),
    (ButtonId::L2, 0x0000_0002),
    (ButtonId::R1, 0x0000_0004),
    (ButtonId::L1, 0x0000_0008),
    (ButtonId::Y, 0x0000_0010),
    (ButtonId::B, 0x0000_0020),
    (ButtonId::X, 0x0000_0040),
    (ButtonId::A, 0x0000_0080),
    (ButtonId::DpadUp, 0x0000_0100),
    (ButtonId::DpadRight, 0x0000_0200),
    (ButtonId::DpadLeft, 0x0000_0400),
    (ButtonId::DpadDown, 0x0000_0800),
    (ButtonId::Select, 0x0000_1000),
    (ButtonId::Steam, 0x0000_2000),
    (ButtonId::Start, 0x0000_4000),
    (ButtonId::L5, 0x0000_8000),
    (ButtonId::R5, 0x0001_0000),
    (ButtonId::LeftPadTouch, 0x0002_0000),
    (ButtonId::RightPadTouch, 0x0004_0000),
    (ButtonId::LeftPadClick, 0x0008_0000),
    (ButtonId::RightPadClick, 0x0010_0000),
    (ButtonId::L3, 0x0040_0000),
    (ButtonId::R3, 0x0400_0000),
];

/// `ButtonsH` bit assignments
pub const BUTTONS_H: [(ButtonId, u32); 3] = [
    (ButtonId::L4, 0x0000_0200),
    (ButtonId::R4, 0x0000_0400),
    (ButtonId::Qam, 0x0004_0000),
];

/// The two raw button words of one report
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ButtonWords {
    pub low: u32,
    pub high: u32,
}

impl ButtonWords {
    /// Extracts both words, or `None` for a report too short to carry them.
    pub fn from_report(report: &[u8]) -> Option<Self> {
        if report.len() < MIN_REPORT_SIZE {
            return None;
        }
        Some(Self {
            low: read_u32_le(report, BUTTONS_L_OFFSET),
            high: read_u32_le(report, BUTTONS_H_OFFSET),
        })
    }

    /// Every button whose mask bit is set in the matching word.
    pub fn buttons(self) -> ButtonSet {
        let low = BUTTONS_L
            .iter()
            .filter(|(_, mask)| self.low & mask != 0)
            .map(|(button, _)| *button);
        let high = BUTTONS_H
            .iter()
            .filter(|(_, mask)| self.high & mask != 0)
            .map(|(button, _)| *button);
        low.chain(high).collect()
    }
}

fn read_u32_le(report: &[u8], offset: usize) -> u32 {
    let mut word = [0u8; 4];
    word.copy_from_slice(&report[offset..offset + 4]);
    u32::from_le_bytes(word)
}

/// Decodes a raw report into the set of asserted buttons.
///
/// Returns `None` for malformed (short) reports.
pub fn decode(report: &[u8]) -> Option<ButtonSet> {
    ButtonWords::from_report(report).map(ButtonWords::buttons)
}
