use serde::{Deserialize, Serialize};
use std::fmt;

/// Numeric status code carried by every tracker reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatusCode(pub u16);

impl StatusCode {
    pub const OK: StatusCode = StatusCode(200);
    pub const BAD_REQUEST: StatusCode = StatusCode(400);
    pub const FORBIDDEN: StatusCode = StatusCode(403);
    pub const SERVER_ERROR: StatusCode = StatusCode(500);
    pub const CALIBRATION_CHANGED: StatusCode = StatusCode(800);
    pub const DISPLAY_CHANGED: StatusCode = StatusCode(801);
    pub const TRACKER_STATE_CHANGED: StatusCode = StatusCode(802);

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.0)
    }

    /// Server-initiated notifications share the reply envelope but are not
    /// answers to any request.
    pub fn notification(&self) -> Option<Notification> {
        match *self {
            Self::CALIBRATION_CHANGED => Some(Notification::CalibrationChanged),
            Self::DISPLAY_CHANGED => Some(Notification::DisplayChanged),
            Self::TRACKER_STATE_CHANGED => Some(Notification::TrackerStateChanged),
            _ => None,
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unsolicited state-change notice from the tracker server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Notification {
    CalibrationChanged,
    DisplayChanged,
    TrackerStateChanged,
}

impl Notification {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::CalibrationChanged => StatusCode::CALIBRATION_CHANGED,
            Self::DisplayChanged => StatusCode::DISPLAY_CHANGED,
            Self::TrackerStateChanged => StatusCode::TRACKER_STATE_CHANGED,
        }
    }
}
