use anyhow::Result;
use gazelink::mock::{frame_line, frame_seq, Handshake, MockTracker, MockTrackerConfig};
use gazelink::{ConnectionState, EyeTracker, TrackerConfig, TrackerError};
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tokio_test::{assert_err, assert_ok};

async fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if condition() {
            return true;
        }
        sleep(Duration::from_millis(10)).await;
    }
    condition()
}

#[tokio::test]
async fn test_connect_negotiates_session() -> Result<()> {
    let mock = MockTracker::start().await?;
    let mut tracker = EyeTracker::new(mock.tracker_config());
    assert_eq!(tracker.state(), ConnectionState::Disconnected);

    tracker.connect().await?;

    assert_eq!(tracker.state(), ConnectionState::Pull);
    let session = tracker.session().copied().expect("session after connect");
    assert_eq!(session.heartbeat_interval, Duration::from_millis(250));
    assert!(session.is_calibrated);
    assert_eq!(session.version, Some(1));

    let first = &mock.requests()[0];
    assert_eq!(first["category"], "tracker");
    assert_eq!(first["request"], "get");

    tracker.close().await?;
    Ok(())
}

#[tokio::test]
async fn test_each_next_is_one_request() -> Result<()> {
    let mock = MockTracker::start().await?;
    let mut tracker = EyeTracker::new(mock.tracker_config());
    tracker.connect().await?;

    for expected in 0..5 {
        let frame = tracker.next().await?;
        assert_eq!(frame_seq(&frame), expected);
        assert_eq!(mock.frame_requests(), expected as usize + 1);
    }

    // Nothing is fetched in the background while pulling
    sleep(Duration::from_millis(50)).await;
    assert_eq!(mock.frame_requests(), 5);
    assert!(!tracker.is_listening());

    tracker.close().await?;
    Ok(())
}

#[tokio::test]
async fn test_pull_frames_are_decoded() -> Result<()> {
    let mock = MockTracker::start().await?;
    let mut tracker = EyeTracker::new(mock.tracker_config());
    tracker.connect().await?;

    let frame = tracker.next().await?;
    assert_eq!(frame.avg_combined().x, 512.0);
    assert_eq!(frame.avg_combined().y, 384.0);
    assert!(frame.has_presence() && frame.has_eyes() && frame.has_gaze());
    assert!(frame.local_timestamp() > 0.0);

    let later = tracker.next().await?;
    assert!(later.local_timestamp() >= frame.local_timestamp());
    assert!(later.server_timestamp() > frame.server_timestamp());

    tracker.close().await?;
    Ok(())
}

#[tokio::test]
async fn test_operations_require_connection() {
    let mut tracker = EyeTracker::with_address("127.0.0.1", 6555);

    assert!(matches!(tracker.next().await, Err(TrackerError::NotConnected)));
    assert!(matches!(tracker.try_next().await, Err(TrackerError::NotConnected)));
    assert!(matches!(tracker.pushmode(None).await, Err(TrackerError::NotConnected)));
    assert!(matches!(tracker.pullmode().await, Err(TrackerError::NotConnected)));
    assert_ok!(tracker.close().await);
    assert_eq!(tracker.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_connect_twice_is_rejected() -> Result<()> {
    let mock = MockTracker::start().await?;
    let mut tracker = EyeTracker::new(mock.tracker_config());
    tracker.connect().await?;

    assert!(matches!(tracker.connect().await, Err(TrackerError::AlreadyConnected)));
    assert!(matches!(tracker.bind("127.0.0.1", 1), Err(TrackerError::AlreadyConnected)));
    assert_eq!(tracker.state(), ConnectionState::Pull);

    tracker.close().await?;
    Ok(())
}

#[tokio::test]
async fn test_bind_then_connect() -> Result<()> {
    let mock = MockTracker::start().await?;
    let mut tracker = EyeTracker::new(TrackerConfig {
        port: 1,
        ..mock.tracker_config()
    });

    tracker.bind("127.0.0.1", mock.port())?;
    assert_eq!(tracker.config().port, mock.port());
    tracker.connect().await?;
    assert_eq!(tracker.state(), ConnectionState::Pull);

    tracker.close().await?;
    Ok(())
}

#[tokio::test]
async fn test_connect_refused() -> Result<()> {
    // Grab a free port and release it so nothing is listening there
    let port = {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        listener.local_addr()?.port()
    };

    let mut tracker = EyeTracker::with_address("127.0.0.1", port);
    let err = tracker.connect().await.unwrap_err();
    assert!(matches!(err, TrackerError::Connect(_)), "{:?}", err);
    assert_eq!(tracker.state(), ConnectionState::Disconnected);

    Ok(())
}

#[tokio::test]
async fn test_negotiation_failures() -> Result<()> {
    for handshake in [Handshake::Reject(500), Handshake::Garbage, Handshake::Silent] {
        let mock = MockTracker::start_with(MockTrackerConfig {
            handshake,
            ..Default::default()
        })
        .await?;
        let mut tracker = EyeTracker::new(TrackerConfig {
            connect_timeout_ms: 300,
            ..mock.tracker_config()
        });

        let result = timeout(Duration::from_secs(5), tracker.connect()).await?;
        assert!(
            matches!(result, Err(TrackerError::Connect(_))),
            "{:?} gave {:?}",
            handshake,
            result
        );
        assert_eq!(tracker.state(), ConnectionState::Disconnected);
        assert!(tracker.session().is_none());
    }
    Ok(())
}

#[tokio::test]
async fn test_invalid_config_is_rejected_before_connecting() {
    let mut tracker = EyeTracker::with_address("", 6555);
    assert!(matches!(tracker.connect().await, Err(TrackerError::Config(_))));
}

#[tokio::test]
async fn test_protocol_version_is_requested() -> Result<()> {
    let mock = MockTracker::start().await?;
    let mut tracker = EyeTracker::new(TrackerConfig {
        protocol_version: Some(1),
        ..mock.tracker_config()
    });
    tracker.connect().await?;

    assert_eq!(tracker.session().and_then(|s| s.version), Some(1));
    assert_eq!(mock.count_requests(|r| r["values"]["version"] == 1), 1);

    tracker.close().await?;
    Ok(())
}

#[tokio::test]
async fn test_close_twice() -> Result<()> {
    let mock = MockTracker::start().await?;
    let mut tracker = EyeTracker::new(mock.tracker_config());
    tracker.connect().await?;

    assert_ok!(tracker.close().await);
    assert_ok!(tracker.close().await);
    assert_eq!(tracker.state(), ConnectionState::Disconnected);
    assert!(tracker.session().is_none());

    assert!(wait_until(|| mock.push_requests(false) == 1).await);
    sleep(Duration::from_millis(50)).await;
    assert_eq!(mock.push_requests(false), 1);

    Ok(())
}

#[tokio::test]
async fn test_reconnect_after_close() -> Result<()> {
    let mock = MockTracker::start().await?;
    let mut tracker = EyeTracker::new(mock.tracker_config());

    for _ in 0..2 {
        tracker.connect().await?;
        tracker.next().await?;
        tracker.close().await?;
    }
    assert_eq!(mock.frame_requests(), 2);

    Ok(())
}

#[tokio::test]
async fn test_server_hangup_during_pull() -> Result<()> {
    let mock = MockTracker::start_with(MockTrackerConfig {
        disconnect_after: Some(2),
        ..Default::default()
    })
    .await?;
    let mut tracker = EyeTracker::new(mock.tracker_config());
    tracker.connect().await?;

    tracker.next().await?;
    tracker.next().await?;
    let err = assert_err!(timeout(Duration::from_secs(5), tracker.next()).await?);

    assert!(matches!(err, TrackerError::ConnectionLost), "{:?}", err);
    assert_eq!(tracker.state(), ConnectionState::Disconnected);
    assert!(matches!(tracker.next().await, Err(TrackerError::NotConnected)));

    Ok(())
}

#[tokio::test]
async fn test_unanswered_pull_times_out_without_disconnecting() -> Result<()> {
    let mock = MockTracker::start_with(MockTrackerConfig {
        answer_frames: false,
        ..Default::default()
    })
    .await?;
    let mut tracker = EyeTracker::new(TrackerConfig {
        request_timeout_ms: 150,
        ..mock.tracker_config()
    });
    tracker.connect().await?;

    let err = assert_err!(tracker.next().await);
    assert!(matches!(err, TrackerError::Timeout(_)), "{:?}", err);
    assert_eq!(tracker.state(), ConnectionState::Pull);

    tracker.close().await?;
    Ok(())
}

#[tokio::test]
async fn test_stray_frame_does_not_shift_pulls() -> Result<()> {
    let mock = MockTracker::start().await?;
    let mut tracker = EyeTracker::new(mock.tracker_config());
    tracker.connect().await?;

    mock.inject(frame_line(900));
    sleep(Duration::from_millis(50)).await;

    let mut seqs = Vec::new();
    for _ in 0..3 {
        seqs.push(frame_seq(&tracker.next().await?));
    }
    assert_eq!(seqs, vec![0, 1, 2]);
    assert_eq!(mock.frame_requests(), 3);

    tracker.close().await?;
    Ok(())
}

#[tokio::test]
async fn test_late_answer_is_not_returned_to_the_next_pull() -> Result<()> {
    let mock = MockTracker::start_with(MockTrackerConfig {
        first_frame_delay_ms: Some(400),
        ..Default::default()
    })
    .await?;
    let mut tracker = EyeTracker::new(TrackerConfig {
        request_timeout_ms: 150,
        ..mock.tracker_config()
    });
    tracker.connect().await?;

    let err = assert_err!(tracker.next().await);
    assert!(matches!(err, TrackerError::Timeout(_)), "{:?}", err);

    // Let the answer to the first request arrive
    sleep(Duration::from_millis(500)).await;

    assert_eq!(frame_seq(&tracker.next().await?), 1);
    assert_eq!(frame_seq(&tracker.next().await?), 2);
    assert_eq!(tracker.state(), ConnectionState::Pull);

    tracker.close().await?;
    Ok(())
}

#[tokio::test]
async fn test_answer_in_flight_is_skipped() -> Result<()> {
    // The first answer lands while the second request is still waiting
    let mock = MockTracker::start_with(MockTrackerConfig {
        first_frame_delay_ms: Some(300),
        ..Default::default()
    })
    .await?;
    let mut tracker = EyeTracker::new(TrackerConfig {
        request_timeout_ms: 200,
        ..mock.tracker_config()
    });
    tracker.connect().await?;

    let err = assert_err!(tracker.next().await);
    assert!(matches!(err, TrackerError::Timeout(_)), "{:?}", err);

    assert_eq!(frame_seq(&tracker.next().await?), 1);
    assert_eq!(frame_seq(&tracker.next().await?), 2);
    assert_eq!(mock.frame_requests(), 3);

    tracker.close().await?;
    Ok(())
}
