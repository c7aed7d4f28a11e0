use serde::{Deserialize, Serialize};

use super::TrackingState;

/// Cartesian coordinate pair.
///
/// Gaze points are screen pixels; pupil centres are normalised to 0..1
/// within the tracker's view of the eye.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point2 {
    pub x: f64,
    pub y: f64,
}

impl Point2 {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

impl From<(f64, f64)> for Point2 {
    fn from((x, y): (f64, f64)) -> Self {
        Self { x, y }
    }
}

/// Which eye to read from a [`Frame`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Left,
    Right,
}

/// Single-eye data.
///
/// An eye the tracker did not report is represented by [`EyeData::SENTINEL`]
/// (all zero) so every frame has the same shape.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct EyeData {
    raw: Point2,
    avg: Point2,
    pupil_size: f64,
    pupil_center: Point2,
}

impl EyeData {
    pub const SENTINEL: EyeData = EyeData {
        raw: Point2::new(0.0, 0.0),
        avg: Point2::new(0.0, 0.0),
        pupil_size: 0.0,
        pupil_center: Point2::new(0.0, 0.0),
    };

    pub(crate) fn new(raw: Point2, avg: Point2, pupil_size: f64, pupil_center: Point2) -> Self {
        Self {
            raw,
            avg,
            pupil_size,
            pupil_center,
        }
    }

    /// Unfiltered gaze point for this eye.
    pub fn raw(&self) -> Point2 {
        self.raw
    }

    /// Smoothed gaze point for this eye.
    pub fn avg(&self) -> Point2 {
        self.avg
    }

    /// Relative pupil size estimate.
    pub fn pupil_size(&self) -> f64 {
        self.pupil_size
    }

    /// Pupil centre, normalised to the tracker's view.
    pub fn pupil_center(&self) -> Point2 {
        self.pupil_center
    }

    pub fn is_sentinel(&self) -> bool {
        *self == Self::SENTINEL
    }
}

/// Combined-eye gaze view of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CombinedGaze {
    pub raw: Point2,
    pub avg: Point2,
}

/// One tracking sample.
///
/// Frames are built once by the wire codec and never mutated afterwards;
/// all access goes through the accessor methods.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    local_timestamp: f64,
    server_timestamp: f64,
    server_estimated_timestamp: f64,
    fixation: bool,
    state: TrackingState,
    raw: Point2,
    avg: Point2,
    left_eye: EyeData,
    right_eye: EyeData,
}

impl Frame {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        local_timestamp: f64,
        server_timestamp: f64,
        server_estimated_timestamp: f64,
        fixation: bool,
        state: TrackingState,
        raw: Point2,
        avg: Point2,
        left_eye: EyeData,
        right_eye: EyeData,
    ) -> Self {
        Self {
            local_timestamp,
            server_timestamp,
            server_estimated_timestamp,
            fixation,
            state,
            raw,
            avg,
            left_eye,
            right_eye,
        }
    }

    /// Wall-clock seconds at which the client received this frame.
    pub fn local_timestamp(&self) -> f64 {
        self.local_timestamp
    }

    /// Device clock in seconds (boot relative, non-decreasing per session).
    pub fn server_timestamp(&self) -> f64 {
        self.server_timestamp
    }

    /// Device estimate of the gaze event's wall-clock time, in epoch seconds.
    ///
    /// This is the timestamp to use when correlating with external events.
    pub fn server_estimated_timestamp(&self) -> f64 {
        self.server_estimated_timestamp
    }

    pub fn is_fixated(&self) -> bool {
        self.fixation
    }

    pub fn state(&self) -> TrackingState {
        self.state
    }

    pub fn raw_combined(&self) -> Point2 {
        self.raw
    }

    pub fn avg_combined(&self) -> Point2 {
        self.avg
    }

    pub fn combined(&self) -> CombinedGaze {
        CombinedGaze {
            raw: self.raw,
            avg: self.avg,
        }
    }

    pub fn left_eye(&self) -> &EyeData {
        &self.left_eye
    }

    pub fn right_eye(&self) -> &EyeData {
        &self.right_eye
    }

    pub fn eye(&self, side: Side) -> &EyeData {
        match side {
            Side::Left => &self.left_eye,
            Side::Right => &self.right_eye,
        }
    }

    pub fn is_lost(&self) -> bool {
        self.state.lost
    }

    pub fn has_failed(&self) -> bool {
        self.state.failed
    }

    pub fn has_presence(&self) -> bool {
        self.state.presence
    }

    pub fn has_eyes(&self) -> bool {
        self.state.eyes
    }

    pub fn has_gaze(&self) -> bool {
        self.state.gaze
    }
}
