//! Serde shapes of the tracker's JSON messages.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::{EyeData, Point2};

/// Outbound request envelope.
#[derive(Debug, Serialize)]
pub struct WireRequest<'a> {
    pub category: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub values: Option<Value>,
}

/// Inbound reply envelope; pushed frames use the same shape.
#[derive(Debug, Deserialize)]
pub struct WireReply {
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub request: Option<String>,
    #[serde(default)]
    pub statuscode: Option<u16>,
    #[serde(default)]
    pub values: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub struct WireFrame {
    /// Device clock, milliseconds.
    pub time: f64,
    /// Device wall-clock estimate, `%Y-%m-%d %H:%M:%S.%3f` local time.
    pub timestamp: String,
    pub fix: bool,
    pub state: WireState,
    #[serde(default)]
    pub raw: Option<WirePoint>,
    #[serde(default)]
    pub avg: Option<WirePoint>,
    #[serde(default)]
    pub lefteye: Option<WireEye>,
    #[serde(default)]
    pub righteye: Option<WireEye>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum WireState {
    Bits(u8),
    Flags(String),
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct WirePoint {
    pub x: f64,
    pub y: f64,
}

impl From<WirePoint> for Point2 {
    fn from(p: WirePoint) -> Self {
        Point2::new(p.x, p.y)
    }
}

#[derive(Debug, Deserialize)]
pub struct WireEye {
    #[serde(default)]
    pub raw: Option<WirePoint>,
    #[serde(default)]
    pub avg: Option<WirePoint>,
    #[serde(default)]
    pub psize: f64,
    #[serde(default)]
    pub pcenter: Option<WirePoint>,
}

impl From<WireEye> for EyeData {
    fn from(eye: WireEye) -> Self {
        let point = |p: Option<WirePoint>| p.map(Point2::from).unwrap_or_default();
        EyeData::new(point(eye.raw), point(eye.avg), eye.psize, point(eye.pcenter))
    }
}
