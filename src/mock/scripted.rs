use async_trait::async_trait;
use std::collections::VecDeque;

use super::fixtures::frame_json;
use crate::connection::clock::wall_clock_seconds;
use crate::engine::FrameSource;
use crate::error::{Result, TrackerError};
use crate::protocol::{decode_frame, Incoming};

/// [`FrameSource`] that replays a fixed list of messages.
///
/// Once the script runs out it reports `ConnectionLost`, or never returns
/// if built with [`hang_when_exhausted`](Self::hang_when_exhausted).
pub struct ScriptedSource {
    script: VecDeque<Result<Incoming>>,
    hang: bool,
}

impl ScriptedSource {
    pub fn new(script: Vec<Result<Incoming>>) -> Self {
        Self {
            script: script.into(),
            hang: false,
        }
    }

    /// Script of `count` simulated frames numbered from zero.
    pub fn with_frames(count: u64) -> Self {
        Self::new((0..count).map(scripted_frame).collect())
    }

    pub fn hang_when_exhausted(mut self) -> Self {
        self.hang = true;
        self
    }

    pub fn push(&mut self, message: Result<Incoming>) {
        self.script.push_back(message);
    }

    pub fn remaining(&self) -> usize {
        self.script.len()
    }
}

/// Decoded simulated frame `seq`, ready to put in a script.
pub fn scripted_frame(seq: u64) -> Result<Incoming> {
    decode_frame(&frame_json(seq), wall_clock_seconds()).map(Incoming::Frame)
}

#[async_trait]
impl FrameSource for ScriptedSource {
    async fn next_message(&mut self) -> Result<Incoming> {
        // Yield first so a stop request is seen between messages
        tokio::task::yield_now().await;

        match self.script.pop_front() {
            Some(message) => message,
            None if self.hang => std::future::pending().await,
            None => Err(TrackerError::ConnectionLost),
        }
    }
}
