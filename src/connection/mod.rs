//! TCP session with the tracker server.

pub mod clock;
pub mod io;

pub use clock::ReceiptClock;
pub use io::{ReplyReader, RequestWriter};

use log::{debug, info, trace, warn};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::config::TrackerConfig;
use crate::core::Frame;
use crate::error::{Result, TrackerError};
use crate::protocol::{Incoming, Reply, Request};

/// Upper bound on the best-effort disconnect notice sent by `close`.
const CLOSE_NOTICE_TIMEOUT: Duration = Duration::from_millis(500);

/// What the server told us when the session was opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionInfo {
    /// Interval at which the server expects heartbeats; zero if it does not.
    pub heartbeat_interval: Duration,
    pub is_calibrated: bool,
    pub version: Option<u32>,
}

impl SessionInfo {
    fn from_reply(reply: &Reply) -> Result<Self> {
        let heartbeat_ms = reply
            .value("heartbeatinterval")
            .and_then(|v| v.as_u64())
            .ok_or_else(|| {
                TrackerError::MalformedMessage("negotiation reply without heartbeatinterval".to_string())
            })?;

        Ok(Self {
            heartbeat_interval: Duration::from_millis(heartbeat_ms),
            is_calibrated: reply
                .value("iscalibrated")
                .and_then(|v| v.as_bool())
                .unwrap_or(false),
            version: reply
                .value("version")
                .and_then(|v| v.as_u64())
                .and_then(|v| u32::try_from(v).ok()),
        })
    }
}

/// One TCP connection to the tracker.
///
/// All I/O runs on the calling task. The reader half can be lent out to the
/// push listener with [`Connection::take_reader`]; while it is away the
/// connection refuses round trips.
#[derive(Debug)]
pub struct Connection {
    peer: String,
    reader: Option<ReplyReader>,
    writer: RequestWriter,
    request_timeout: Duration,
    /// Frame requests that timed out; their answers may still arrive.
    unanswered_frames: usize,
    closed: bool,
}

impl Connection {
    /// Connect and negotiate, bounded by the configured connect timeout.
    pub async fn open(config: &TrackerConfig) -> Result<(Self, SessionInfo)> {
        let address = config.address();
        let limit = config.connect_timeout();

        let stream = match timeout(limit, TcpStream::connect(&address)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => return Err(TrackerError::Connect(format!("{}: {}", address, e))),
            Err(_) => {
                return Err(TrackerError::Connect(format!(
                    "{}: connect timed out after {:?}",
                    address, limit
                )))
            }
        };
        if let Err(e) = stream.set_nodelay(true) {
            debug!("could not set TCP_NODELAY on {}: {}", address, e);
        }

        let mut connection = Self::from_stream(stream, address.clone(), config.request_timeout());

        let negotiated = timeout(limit, connection.negotiate(config.protocol_version)).await;
        let session = match negotiated {
            Ok(Ok(session)) => session,
            Ok(Err(e)) => {
                connection.close().await;
                return Err(TrackerError::Connect(format!(
                    "negotiation with {} failed: {}",
                    address, e
                )));
            }
            Err(_) => {
                connection.close().await;
                return Err(TrackerError::Connect(format!(
                    "{} did not answer the negotiation within {:?}",
                    address, limit
                )));
            }
        };

        info!(
            "connected to tracker at {} (heartbeat {:?}, calibrated: {})",
            address, session.heartbeat_interval, session.is_calibrated
        );
        Ok((connection, session))
    }

    pub fn from_stream(stream: TcpStream, peer: String, request_timeout: Duration) -> Self {
        let (read_half, write_half) = stream.into_split();
        Self {
            peer,
            reader: Some(ReplyReader::new(read_half)),
            writer: RequestWriter::new(write_half),
            request_timeout,
            unanswered_frames: 0,
            closed: false,
        }
    }

    async fn negotiate(&mut self, version: Option<u32>) -> Result<SessionInfo> {
        let reply = self.expect_reply(&Request::negotiation()).await?;
        let mut session = SessionInfo::from_reply(&reply)?;

        if let Some(version) = version {
            self.expect_reply(&Request::SetVersion(version)).await?;
            session.version = Some(version);
        }

        Ok(session)
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Handle for writing requests from another task.
    pub fn writer(&self) -> RequestWriter {
        self.writer.clone()
    }

    pub fn take_reader(&mut self) -> Option<ReplyReader> {
        self.reader.take()
    }

    pub fn restore_reader(&mut self, reader: ReplyReader) {
        self.reader = Some(reader);
    }

    /// Send a control request and wait for its acknowledgement.
    pub async fn request(&mut self, request: &Request) -> Result<Reply> {
        let limit = self.request_timeout;
        timeout(limit, self.expect_reply(request))
            .await
            .map_err(|_| TrackerError::Timeout(limit))?
    }

    /// Pull a single frame.
    ///
    /// Each call yields the answer to its own request. Frames already waiting
    /// in the read buffer are discarded first, and the late answers to
    /// earlier timed-out requests are skipped.
    pub async fn request_frame(&mut self) -> Result<Frame> {
        self.discard_buffered().await?;

        let limit = self.request_timeout;
        let incoming = match timeout(limit, self.exchange(&Request::GetFrame)).await {
            Ok(incoming) => incoming?,
            Err(_) => {
                self.unanswered_frames += 1;
                return Err(TrackerError::Timeout(limit));
            }
        };

        match incoming {
            Incoming::Frame(frame) => Ok(frame),
            other => Err(TrackerError::MalformedMessage(format!(
                "expected a frame, got {:?}",
                other
            ))),
        }
    }

    /// Ask the server to start pushing. Frames that arrive ahead of the
    /// acknowledgement are returned so the caller can deliver them.
    pub async fn enable_push(&mut self) -> Result<Vec<Frame>> {
        let limit = self.request_timeout;
        let request = Request::SetPush(true);
        let mut early = Vec::new();

        let answer = timeout(
            limit,
            self.exchange_with(&request, |incoming| match incoming {
                Incoming::Frame(frame) => early.push(frame),
                other => trace!("skipping {:?} while enabling push", other),
            }),
        )
        .await
        .map_err(|_| TrackerError::Timeout(limit))??;

        match answer {
            Incoming::Reply(_) => {
                if !early.is_empty() {
                    debug!("{} frames arrived before the push acknowledgement", early.len());
                }
                Ok(early)
            }
            other => Err(TrackerError::MalformedMessage(format!(
                "expected a reply to {:?}, got {:?}",
                request, other
            ))),
        }
    }

    async fn expect_reply(&mut self, request: &Request) -> Result<Reply> {
        match self.exchange(request).await? {
            Incoming::Reply(reply) => Ok(reply),
            other => Err(TrackerError::MalformedMessage(format!(
                "expected a reply to {:?}, got {:?}",
                request, other
            ))),
        }
    }

    /// Drop whatever is already readable without waiting for more.
    async fn discard_buffered(&mut self) -> Result<()> {
        let reader = self.reader.as_mut().ok_or(TrackerError::NotConnected)?;
        loop {
            // A zero timeout still polls the read once; `next_line` is cancel-safe
            match timeout(Duration::ZERO, reader.read_message()).await {
                Err(_) => return Ok(()),
                Ok(Ok(Incoming::Frame(_))) => {
                    self.unanswered_frames = self.unanswered_frames.saturating_sub(1);
                    debug!("discarding frame received outside a pull request");
                }
                Ok(Ok(other)) => trace!("discarding {:?} before pull request", other),
                Ok(Err(TrackerError::MalformedMessage(reason))) => {
                    warn!("discarding malformed tracker message: {}", reason)
                }
                Ok(Err(err @ TrackerError::Protocol { .. })) => {
                    warn!("discarding tracker error before pull request: {}", err)
                }
                Ok(Err(err)) => return Err(err),
            }
        }
    }

    async fn exchange(&mut self, request: &Request) -> Result<Incoming> {
        self.exchange_with(request, |incoming| {
            trace!("skipping {:?} while waiting for {:?}", incoming, request)
        })
        .await
    }

    /// Write `request` and read until its answer arrives, handing every
    /// other message to `skipped`.
    ///
    /// Heartbeat acknowledgements, notifications and frames still in flight
    /// from push mode end up there. A failure status is only attributed to
    /// this request when it carries the request's category.
    async fn exchange_with(
        &mut self,
        request: &Request,
        mut skipped: impl FnMut(Incoming),
    ) -> Result<Incoming> {
        if self.closed || self.reader.is_none() {
            return Err(TrackerError::NotConnected);
        }

        self.writer.send(request).await?;

        let reader = self.reader.as_mut().ok_or(TrackerError::NotConnected)?;
        loop {
            match reader.read_message().await {
                Ok(Incoming::Frame(_))
                    if *request == Request::GetFrame && self.unanswered_frames > 0 =>
                {
                    self.unanswered_frames -= 1;
                    debug!("skipping late answer to a timed-out frame request");
                }
                Ok(incoming) if request.is_answered_by(&incoming) => return Ok(incoming),
                Ok(incoming) => skipped(incoming),
                Err(TrackerError::Protocol {
                    code,
                    category,
                    message,
                }) if category != request.category() => {
                    warn!(
                        "ignoring '{}' error {} while waiting for {:?}: {}",
                        category,
                        code,
                        request,
                        message.unwrap_or_default()
                    );
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Best-effort disconnect notice, then socket shutdown. Idempotent.
    pub async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        match timeout(CLOSE_NOTICE_TIMEOUT, self.writer.send(&Request::SetPush(false))).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!("disconnect notice to {} failed: {}", self.peer, e),
            Err(_) => debug!("disconnect notice to {} timed out", self.peer),
        }
        if let Ok(Err(e)) = timeout(CLOSE_NOTICE_TIMEOUT, self.writer.shutdown()).await {
            debug!("socket shutdown for {} failed: {}", self.peer, e);
        }

        self.reader = None;
        info!("disconnected from tracker at {}", self.peer);
    }
}
