use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::TrackerError;

/// Tracking quality flags reported with every frame.
///
/// The device sends these as a bitset; the five flags are independent and
/// any combination is legal (a frame can report PRESENCE without EYES, or
/// FAILED together with LOST).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TrackingState {
    /// Tracking was lost.
    pub lost: bool,
    /// Detection failed for this sample.
    pub failed: bool,
    /// A user is present in front of the tracker.
    pub presence: bool,
    /// Both eyes were detected.
    pub eyes: bool,
    /// A gaze point was produced.
    pub gaze: bool,
}

impl TrackingState {
    pub const GAZE: u8 = 0x01;
    pub const EYES: u8 = 0x02;
    pub const PRESENCE: u8 = 0x04;
    pub const FAILED: u8 = 0x08;
    pub const LOST: u8 = 0x10;

    /// Flag letters in display order, most significant bit first.
    const LETTERS: [(char, u8); 5] = [
        ('L', Self::LOST),
        ('F', Self::FAILED),
        ('P', Self::PRESENCE),
        ('E', Self::EYES),
        ('G', Self::GAZE),
    ];

    pub fn from_bits(bits: u8) -> Self {
        Self {
            lost: bits & Self::LOST != 0,
            failed: bits & Self::FAILED != 0,
            presence: bits & Self::PRESENCE != 0,
            eyes: bits & Self::EYES != 0,
            gaze: bits & Self::GAZE != 0,
        }
    }

    pub fn bits(&self) -> u8 {
        let mut bits = 0;
        if self.lost {
            bits |= Self::LOST;
        }
        if self.failed {
            bits |= Self::FAILED;
        }
        if self.presence {
            bits |= Self::PRESENCE;
        }
        if self.eyes {
            bits |= Self::EYES;
        }
        if self.gaze {
            bits |= Self::GAZE;
        }
        bits
    }

    /// True when every flag is set.
    pub fn is_all(&self) -> bool {
        self.bits() == 0x1f
    }
}

/// Renders as five positional characters, `LFPEG`, with `.` for cleared flags.
impl fmt::Display for TrackingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bits = self.bits();
        for (letter, mask) in Self::LETTERS {
            let c = if bits & mask != 0 { letter } else { '.' };
            write!(f, "{}", c)?;
        }
        Ok(())
    }
}

impl FromStr for TrackingState {
    type Err = TrackerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let chars: Vec<char> = s.chars().collect();
        if chars.len() != Self::LETTERS.len() {
            return Err(TrackerError::MalformedMessage(format!(
                "state flags must be {} characters, got '{}'",
                Self::LETTERS.len(),
                s
            )));
        }

        let mut bits = 0;
        for (c, (letter, mask)) in chars.iter().zip(Self::LETTERS) {
            match *c {
                '.' => {}
                c if c.eq_ignore_ascii_case(&letter) => bits |= mask,
                other => {
                    return Err(TrackerError::MalformedMessage(format!(
                        "unexpected state flag '{}' where '{}' or '.' was expected",
                        other, letter
                    )))
                }
            }
        }

        Ok(Self::from_bits(bits))
    }
}
