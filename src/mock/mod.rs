//! Test doubles: a loopback tracker server and a scripted frame source.

pub mod fixtures;
pub mod scripted;
pub mod tracker;

pub use fixtures::{frame_json, frame_line, frame_seq};
pub use scripted::{scripted_frame, ScriptedSource};
pub use tracker::{Handshake, MockTracker, MockTrackerConfig};
