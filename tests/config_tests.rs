use anyhow::Result;
use gazelink::{QueuePolicy, TrackerConfig, TrackerError};
use std::time::Duration;
use tempfile::tempdir;

#[test]
fn test_save_and_load() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("tracker.json");

    let config = TrackerConfig {
        idle_timeout_ms: Some(3000),
        protocol_version: Some(1),
        queue: QueuePolicy::Unbounded,
        ..TrackerConfig::new("10.1.2.3", 6556)
    };
    config.save(&path)?;

    let loaded = TrackerConfig::load(&path)?;
    assert_eq!(loaded, config);
    assert_eq!(loaded.idle_timeout(), Some(Duration::from_secs(3)));

    Ok(())
}

#[test]
fn test_load_partial_file() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("tracker.json");
    std::fs::write(
        &path,
        r#"{ "port": 7000, "heartbeat": false, "queue": { "policy": "drop_oldest", "capacity": 60 } }"#,
    )?;

    let config = TrackerConfig::load(&path)?;
    assert_eq!(config.address(), "localhost:7000");
    assert!(!config.heartbeat);
    assert_eq!(config.queue, QueuePolicy::DropOldest { capacity: 60 });
    assert_eq!(config.connect_timeout(), Duration::from_secs(5));
    assert_eq!(config.shutdown_timeout(), Duration::from_secs(10));

    Ok(())
}

#[test]
fn test_load_errors_are_config_errors() -> Result<()> {
    let dir = tempdir()?;

    let missing = TrackerConfig::load(dir.path().join("absent.json"));
    assert!(matches!(missing, Err(TrackerError::Config(_))));

    let garbled = dir.path().join("garbled.json");
    std::fs::write(&garbled, "{ port: ")?;
    assert!(matches!(TrackerConfig::load(&garbled), Err(TrackerError::Config(_))));

    let invalid = dir.path().join("invalid.json");
    std::fs::write(&invalid, r#"{ "port": 0 }"#)?;
    assert!(matches!(TrackerConfig::load(&invalid), Err(TrackerError::Config(_))));

    Ok(())
}
