pub mod client;
pub mod config;
pub mod connection;
pub mod core;
pub mod engine;
pub mod error;
pub mod mock;
pub mod observability;
pub mod protocol;

pub use client::EyeTracker;
pub use config::TrackerConfig;
pub use connection::SessionInfo;
pub use core::{CombinedGaze, EyeData, Frame, Point2, Side, TrackingState};
pub use engine::{ConnectionState, FrameFilter, QueuePolicy};
pub use error::{Result, TrackerError};
pub use observability::MetricsSnapshot;
