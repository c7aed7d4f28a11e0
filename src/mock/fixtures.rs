use serde_json::{json, Value};

use crate::connection::clock::wall_clock_seconds;
use crate::core::Frame;
use crate::protocol::codec::format_timestamp;

/// Server `time` of the first simulated frame, in milliseconds.
pub const FIRST_FRAME_TIME_MS: u64 = 1000;
/// Spacing of simulated frames (roughly 30 Hz).
pub const FRAME_PERIOD_MS: u64 = 33;

/// `values.frame` object of simulated frame number `seq`.
///
/// Every frame has all of PRESENCE, EYES and GAZE set, an averaged gaze point
/// of (512, 384) and both eyes present. The sequence number is recoverable
/// from the decoded frame with [`frame_seq`].
pub fn frame_json(seq: u64) -> Value {
    let jitter = (seq % 7) as f64;
    json!({
        "time": FIRST_FRAME_TIME_MS + seq * FRAME_PERIOD_MS,
        "timestamp": format_timestamp(wall_clock_seconds()),
        "fix": seq % 2 == 0,
        "state": 7,
        "raw": { "x": 510.0 + jitter, "y": 380.0 + jitter },
        "avg": { "x": 512.0, "y": 384.0 },
        "lefteye": {
            "raw": { "x": 480.0 + jitter, "y": 382.0 },
            "avg": { "x": 482.0, "y": 384.0 },
            "psize": 21.5,
            "pcenter": { "x": 0.42, "y": 0.51 }
        },
        "righteye": {
            "raw": { "x": 540.0 + jitter, "y": 386.0 },
            "avg": { "x": 542.0, "y": 384.0 },
            "psize": 22.0,
            "pcenter": { "x": 0.58, "y": 0.50 }
        }
    })
}

/// Full wire line carrying frame `seq`, as sent in both pull and push mode.
pub fn frame_line(seq: u64) -> String {
    json!({
        "category": "tracker",
        "request": "get",
        "statuscode": 200,
        "values": { "frame": frame_json(seq) }
    })
    .to_string()
}

/// Recover the sequence number of a frame built from [`frame_json`].
pub fn frame_seq(frame: &Frame) -> u64 {
    let time_ms = (frame.server_timestamp() * 1000.0).round() as u64;
    time_ms.saturating_sub(FIRST_FRAME_TIME_MS) / FRAME_PERIOD_MS
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{decode, Incoming};

    #[test]
    fn test_frame_line_decodes_with_sequence() {
        for seq in [0, 1, 17, 1799] {
            match decode(&frame_line(seq), 0.0).unwrap() {
                Incoming::Frame(frame) => {
                    assert_eq!(frame_seq(&frame), seq);
                    assert!(frame.has_gaze());
                    assert!(frame.has_eyes());
                }
                other => panic!("expected frame, got {:?}", other),
            }
        }
    }
}
