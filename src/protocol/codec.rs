use chrono::{Local, NaiveDateTime, TimeZone};
use serde::Deserialize;
use serde_json::{json, Value};

use super::message::{WireFrame, WireReply, WireRequest, WireState};
use super::status::{Notification, StatusCode};
use crate::core::{EyeData, Frame, Point2, TrackingState};
use crate::error::{Result, TrackerError};

pub const CATEGORY_TRACKER: &str = "tracker";
pub const CATEGORY_HEARTBEAT: &str = "heartbeat";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// Control requests understood by the tracker server.
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    /// Query named tracker values.
    GetValues(Vec<String>),
    /// Query a single frame (pull mode).
    GetFrame,
    /// Enable or disable push mode.
    SetPush(bool),
    /// Request a protocol version.
    SetVersion(u32),
    Heartbeat,
}

impl Request {
    /// Values queried when a session is opened.
    pub fn negotiation() -> Self {
        Self::GetValues(
            ["iscalibrated", "heartbeatinterval", "version"]
                .iter()
                .map(|k| k.to_string())
                .collect(),
        )
    }

    pub fn category(&self) -> &'static str {
        match self {
            Self::Heartbeat => CATEGORY_HEARTBEAT,
            _ => CATEGORY_TRACKER,
        }
    }

    /// `get` / `set`, or `None` for heartbeats which carry no request verb.
    pub fn verb(&self) -> Option<&'static str> {
        match self {
            Self::GetValues(_) | Self::GetFrame => Some("get"),
            Self::SetPush(_) | Self::SetVersion(_) => Some("set"),
            Self::Heartbeat => None,
        }
    }

    fn values(&self) -> Option<Value> {
        match self {
            Self::GetValues(keys) => Some(json!(keys)),
            Self::GetFrame => Some(json!(["frame"])),
            Self::SetPush(push) => Some(json!({ "push": push })),
            Self::SetVersion(version) => Some(json!({ "version": version })),
            Self::Heartbeat => None,
        }
    }

    /// Whether `incoming` is the answer to this request.
    pub fn is_answered_by(&self, incoming: &Incoming) -> bool {
        match (self, incoming) {
            (Self::GetFrame, Incoming::Frame(_)) => true,
            (Self::GetFrame, _) => false,
            (_, Incoming::Reply(reply)) => {
                reply.category == self.category()
                    && (self.verb().is_none() || reply.request.as_deref() == self.verb())
            }
            _ => false,
        }
    }
}

/// Control acknowledgement.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub category: String,
    pub request: Option<String>,
    pub status: StatusCode,
    /// Returned values, `Value::Null` when the reply carried none.
    pub values: Value,
}

impl Reply {
    pub fn value(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }
}

/// One decoded inbound line.
#[derive(Debug, Clone, PartialEq)]
pub enum Incoming {
    Frame(Frame),
    Reply(Reply),
    Notification(Notification),
}

/// Serialise a request to its single-line wire form (without the delimiter).
pub fn encode(request: &Request) -> Result<String> {
    let wire = WireRequest {
        category: request.category(),
        request: request.verb(),
        values: request.values(),
    };
    serde_json::to_string(&wire).map_err(|e| TrackerError::MalformedMessage(e.to_string()))
}

/// Decode one inbound line. `received_at` stamps frames (epoch seconds).
pub fn decode(line: &str, received_at: f64) -> Result<Incoming> {
    let reply: WireReply = serde_json::from_str(line)?;
    let code = reply
        .statuscode
        .ok_or_else(|| TrackerError::MalformedMessage("reply without statuscode".to_string()))?;
    let status = StatusCode(code);

    if let Some(notification) = status.notification() {
        return Ok(Incoming::Notification(notification));
    }

    if !status.is_success() {
        let message = reply
            .values
            .as_ref()
            .and_then(|v| v.get("statusmessage"))
            .and_then(Value::as_str)
            .map(str::to_string);
        return Err(TrackerError::Protocol {
            code,
            category: reply.category,
            message,
        });
    }

    if let Some(frame) = reply.values.as_ref().and_then(|v| v.get("frame")) {
        return decode_frame(frame, received_at).map(Incoming::Frame);
    }

    Ok(Incoming::Reply(Reply {
        category: reply.category,
        request: reply.request,
        status,
        values: reply.values.unwrap_or(Value::Null),
    }))
}

/// Build a [`Frame`] from the `values.frame` object of a tracker message.
///
/// Absent combined points or eye objects are replaced by zero sentinels and
/// the GAZE / EYES flags are cleared accordingly.
pub fn decode_frame(value: &Value, received_at: f64) -> Result<Frame> {
    let wire = WireFrame::deserialize(value)?;

    let mut state = match wire.state {
        WireState::Bits(bits) => TrackingState::from_bits(bits),
        WireState::Flags(flags) => flags.parse()?,
    };

    let raw = wire.raw.map(Point2::from).filter(Point2::is_finite);
    let avg = wire.avg.map(Point2::from).filter(Point2::is_finite);
    state.gaze &= raw.is_some() && avg.is_some();

    state.eyes &= wire.lefteye.is_some() && wire.righteye.is_some();
    let left_eye = wire.lefteye.map(EyeData::from).unwrap_or(EyeData::SENTINEL);
    let right_eye = wire.righteye.map(EyeData::from).unwrap_or(EyeData::SENTINEL);

    Ok(Frame::new(
        received_at,
        wire.time / 1000.0,
        parse_timestamp(&wire.timestamp)?,
        wire.fix,
        state,
        raw.unwrap_or_default(),
        avg.unwrap_or_default(),
        left_eye,
        right_eye,
    ))
}

/// Convert the server's local-time timestamp string to epoch seconds.
pub fn parse_timestamp(s: &str) -> Result<f64> {
    let naive = NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT)
        .map_err(|e| TrackerError::MalformedMessage(format!("bad timestamp '{}': {}", s, e)))?;

    let micros = match Local.from_local_datetime(&naive).earliest() {
        Some(local) => local.timestamp_micros(),
        // Non-existent local time (DST gap); read it as UTC rather than reject the frame
        None => naive.and_utc().timestamp_micros(),
    };

    Ok(micros as f64 / 1_000_000.0)
}

/// Format epoch seconds the way the tracker server writes timestamps.
pub fn format_timestamp(epoch_seconds: f64) -> String {
    let micros = (epoch_seconds * 1_000_000.0).round() as i64;
    match Local.timestamp_micros(micros).earliest() {
        Some(t) => t.format("%Y-%m-%d %H:%M:%S%.3f").to_string(),
        None => String::new(),
    }
}
