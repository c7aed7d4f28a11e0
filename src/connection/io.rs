use async_trait::async_trait;
use log::{debug, trace};
use std::io::ErrorKind;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::Mutex;

use super::clock::ReceiptClock;
use crate::engine::FrameSource;
use crate::error::{Result, TrackerError};
use crate::protocol::{self, Incoming, Request};

/// Reading half of a tracker connection.
///
/// Owned by the controller in pull mode and lent to the listener in push
/// mode; it is never shared.
#[derive(Debug)]
pub struct ReplyReader {
    lines: Lines<BufReader<OwnedReadHalf>>,
    clock: ReceiptClock,
}

impl ReplyReader {
    pub fn new(read_half: OwnedReadHalf) -> Self {
        Self {
            lines: BufReader::new(read_half).lines(),
            clock: ReceiptClock::new(),
        }
    }

    /// Read the next non-empty line and decode it.
    ///
    /// Cancel-safe: the only await point is `Lines::next_line`.
    pub async fn read_message(&mut self) -> Result<Incoming> {
        loop {
            let line = match self.lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => return Err(TrackerError::ConnectionLost),
                Err(e) if e.kind() == ErrorKind::InvalidData => {
                    return Err(TrackerError::MalformedMessage(e.to_string()))
                }
                Err(e) => {
                    debug!("tracker read failed: {}", e);
                    return Err(TrackerError::ConnectionLost);
                }
            };

            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            trace!("<- {}", line);
            return protocol::decode(line, self.clock.stamp());
        }
    }
}

#[async_trait]
impl FrameSource for ReplyReader {
    async fn next_message(&mut self) -> Result<Incoming> {
        self.read_message().await
    }
}

/// Writing half of a tracker connection, shared with the heartbeat task.
#[derive(Debug, Clone)]
pub struct RequestWriter {
    inner: Arc<Mutex<OwnedWriteHalf>>,
}

impl RequestWriter {
    pub fn new(write_half: OwnedWriteHalf) -> Self {
        Self {
            inner: Arc::new(Mutex::new(write_half)),
        }
    }

    /// Write one request followed by the line delimiter.
    pub async fn send(&self, request: &Request) -> Result<()> {
        let mut line = protocol::encode(request)?;
        line.push('\n');

        let mut half = self.inner.lock().await;
        half.write_all(line.as_bytes()).await.map_err(|e| {
            debug!("tracker write failed: {}", e);
            TrackerError::ConnectionLost
        })?;

        trace!("-> {}", line.trim_end());
        Ok(())
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.inner
            .lock()
            .await
            .shutdown()
            .await
            .map_err(|_| TrackerError::ConnectionLost)
    }
}
