use anyhow::Result;
use gazelink::protocol::codec::parse_timestamp;
use gazelink::protocol::{decode, Incoming, Notification, StatusCode};
use gazelink::{Point2, TrackerError};
use serde_json::json;

const ALL_FLAGS_FRAME: &str = r#"{
    "category": "tracker", "request": "get", "statuscode": 200,
    "values": { "frame": {
        "time": 1234567, "timestamp": "2024-03-15 10:20:30.123", "fix": true, "state": 31,
        "raw": { "x": 510.5, "y": 380.25 }, "avg": { "x": 512.0, "y": 384.0 },
        "lefteye": { "raw": { "x": 480, "y": 382 }, "avg": { "x": 482, "y": 384 },
                     "psize": 21.5, "pcenter": { "x": 0.42, "y": 0.51 } },
        "righteye": { "raw": { "x": 540, "y": 386 }, "avg": { "x": 542, "y": 384 },
                      "psize": 22.0, "pcenter": { "x": 0.58, "y": 0.5 } }
    } }
}"#;

fn frame_from(line: &str) -> gazelink::Frame {
    match decode(line, 42.0) {
        Ok(Incoming::Frame(frame)) => frame,
        other => panic!("expected a frame, got {:?}", other),
    }
}

#[test]
fn test_all_flags_fixture_decodes_exactly() -> Result<()> {
    let frame = frame_from(&ALL_FLAGS_FRAME.replace('\n', " "));

    assert_eq!(frame.avg_combined(), Point2::new(512.0, 384.0));
    assert_eq!(frame.raw_combined(), Point2::new(510.5, 380.25));
    assert!(frame.is_fixated());
    assert!(frame.is_lost());
    assert!(frame.has_failed());
    assert!(frame.has_presence());
    assert!(frame.has_eyes());
    assert!(frame.has_gaze());
    assert_eq!(frame.state().to_string(), "LFPEG");

    assert_eq!(frame.local_timestamp(), 42.0);
    assert!((frame.server_timestamp() - 1234.567).abs() < 1e-9);
    assert_eq!(
        frame.server_estimated_timestamp(),
        parse_timestamp("2024-03-15 10:20:30.123")?
    );

    assert_eq!(frame.left_eye().raw(), Point2::new(480.0, 382.0));
    assert_eq!(frame.right_eye().pupil_center(), Point2::new(0.58, 0.5));

    Ok(())
}

#[test]
fn test_missing_right_eye_clears_eyes_flag() {
    let mut reply: serde_json::Value = serde_json::from_str(ALL_FLAGS_FRAME).unwrap();
    reply["values"]["frame"]
        .as_object_mut()
        .unwrap()
        .remove("righteye");

    let frame = frame_from(&reply.to_string());
    assert!(frame.right_eye().is_sentinel());
    assert_eq!(frame.right_eye().avg(), Point2::default());
    assert!(!frame.left_eye().is_sentinel());
    assert!(!frame.has_eyes());
    assert!(frame.has_presence());
}

#[test]
fn test_missing_combined_point_clears_gaze_flag() {
    let mut reply: serde_json::Value = serde_json::from_str(ALL_FLAGS_FRAME).unwrap();
    reply["values"]["frame"].as_object_mut().unwrap().remove("avg");

    let frame = frame_from(&reply.to_string());
    assert!(!frame.has_gaze());
    assert_eq!(frame.avg_combined(), Point2::default());
    assert_eq!(frame.raw_combined(), Point2::new(510.5, 380.25));
}

#[test]
fn test_state_accepted_as_flag_string() {
    let mut reply: serde_json::Value = serde_json::from_str(ALL_FLAGS_FRAME).unwrap();
    reply["values"]["frame"]["state"] = json!("..PEG");

    let frame = frame_from(&reply.to_string());
    assert!(!frame.is_lost());
    assert!(!frame.has_failed());
    assert!(frame.has_gaze());
    assert_eq!(frame.state().bits(), 0x07);
}

#[test]
fn test_control_reply() {
    let line = r#"{"category":"tracker","request":"get","statuscode":200,"values":{"heartbeatinterval":3000,"iscalibrated":true}}"#;
    match decode(line, 0.0) {
        Ok(Incoming::Reply(reply)) => {
            assert_eq!(reply.status, StatusCode::OK);
            assert_eq!(reply.request.as_deref(), Some("get"));
            assert_eq!(reply.value("heartbeatinterval"), Some(&json!(3000)));
        }
        other => panic!("expected a reply, got {:?}", other),
    }

    let heartbeat = decode(r#"{"category":"heartbeat","statuscode":200}"#, 0.0);
    assert!(matches!(heartbeat, Ok(Incoming::Reply(r)) if r.category == "heartbeat"));
}

#[test]
fn test_error_status_carries_message() {
    let line = r#"{"category":"tracker","request":"set","statuscode":403,"values":{"statusmessage":"not allowed"}}"#;
    match decode(line, 0.0) {
        Err(TrackerError::Protocol {
            code,
            category,
            message,
        }) => {
            assert_eq!(code, 403);
            assert_eq!(category, "tracker");
            assert_eq!(message.as_deref(), Some("not allowed"));
        }
        other => panic!("expected a protocol error, got {:?}", other),
    }
}

#[test]
fn test_notifications() {
    let cases = [
        (800, Notification::CalibrationChanged),
        (801, Notification::DisplayChanged),
        (802, Notification::TrackerStateChanged),
    ];
    for (code, expected) in cases {
        let line = json!({ "category": "notification", "statuscode": code }).to_string();
        assert!(matches!(decode(&line, 0.0), Ok(Incoming::Notification(n)) if n == expected));
    }
}

#[test]
fn test_malformed_input() {
    for line in [
        "not json at all",
        r#"{"category":"tracker","request":"get"}"#,
        r#"{"category":"tracker","statuscode":200,"values":{"frame":{"time":1}}}"#,
        r#"{"category":"tracker","statuscode":200,"values":{"frame":{"time":1,"timestamp":"2024-01-01 00:00:00.000","fix":false,"state":"GAZE"}}}"#,
    ] {
        assert!(
            matches!(decode(line, 0.0), Err(TrackerError::MalformedMessage(_))),
            "accepted {}",
            line
        );
    }
}
