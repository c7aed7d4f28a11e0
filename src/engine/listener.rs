use async_trait::async_trait;
use log::{debug, info, trace, warn};
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::queue::{Enqueued, FrameQueue};
use super::state::ModeCell;
use crate::core::Frame;
use crate::error::{Result, TrackerError};
use crate::observability::StreamMetrics;
use crate::protocol::Incoming;

/// Push-mode filter. Returning `true` consumes the frame so it is never
/// queued for `next()`.
///
/// Runs inline on the listener task: a filter that blocks stalls delivery
/// of every later frame.
pub type FrameFilter = Box<dyn FnMut(&Frame) -> bool + Send + 'static>;

/// Source of decoded tracker messages for the push listener.
#[async_trait]
pub trait FrameSource: Send {
    /// Read and decode the next inbound message.
    ///
    /// Must be cancel-safe: the listener drops a pending call when asked to
    /// stop, and no partially read message may be lost when that happens.
    async fn next_message(&mut self) -> Result<Incoming>;
}

/// Why the listener ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// The controller asked it to stop.
    Stopped,
    /// The source failed or went silent; the queue has been closed.
    ConnectionLost,
}

/// Returned by a finished listener so its source can be reused.
#[derive(Debug)]
pub struct ListenerExit<S> {
    pub source: S,
    pub reason: ExitReason,
}

/// Background reader that feeds decoded frames into a [`FrameQueue`].
pub struct FrameListener<S> {
    source: S,
    queue: FrameQueue,
    filter: Option<FrameFilter>,
    metrics: Arc<StreamMetrics>,
    mode: Arc<ModeCell>,
    stop_rx: watch::Receiver<bool>,
    idle_timeout: Option<Duration>,
    backlog: Vec<Frame>,
}

impl<S: FrameSource + 'static> FrameListener<S> {
    pub fn new(
        source: S,
        queue: FrameQueue,
        metrics: Arc<StreamMetrics>,
        mode: Arc<ModeCell>,
        stop_rx: watch::Receiver<bool>,
    ) -> Self {
        Self {
            source,
            queue,
            filter: None,
            metrics,
            mode,
            stop_rx,
            idle_timeout: None,
            backlog: Vec::new(),
        }
    }

    pub fn with_filter(mut self, filter: Option<FrameFilter>) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_idle_timeout(mut self, idle_timeout: Option<Duration>) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    /// Frames that arrived before the listener took over the source. They
    /// are filtered and queued ahead of anything read afterwards.
    pub fn with_backlog(mut self, frames: Vec<Frame>) -> Self {
        self.backlog = frames;
        self
    }

    pub fn spawn(self) -> JoinHandle<ListenerExit<S>> {
        tokio::spawn(self.run())
    }

    pub async fn run(mut self) -> ListenerExit<S> {
        debug!("frame listener started");
        let mut guard = LinkGuard {
            queue: self.queue.clone(),
            mode: Arc::clone(&self.mode),
            armed: true,
        };

        for frame in std::mem::take(&mut self.backlog) {
            self.deliver(frame);
        }

        let reason = loop {
            if *self.stop_rx.borrow() {
                break ExitReason::Stopped;
            }

            let message = tokio::select! {
                biased;
                changed = self.stop_rx.changed() => {
                    if changed.is_err() {
                        break ExitReason::Stopped;
                    }
                    continue;
                }
                message = read_next(&mut self.source, self.idle_timeout) => message,
            };

            if let ControlFlow::Break(reason) = self.handle(message) {
                break reason;
            }
        };

        match reason {
            ExitReason::Stopped => guard.armed = false,
            // Dropping the armed guard closes the queue
            ExitReason::ConnectionLost => drop(guard),
        }

        debug!("frame listener exited ({:?})", reason);
        ListenerExit {
            source: self.source,
            reason,
        }
    }

    fn handle(&mut self, message: Result<Incoming>) -> ControlFlow<ExitReason> {
        match message {
            Ok(Incoming::Frame(frame)) => self.deliver(frame),
            Ok(Incoming::Reply(reply)) => {
                trace!("ignoring '{}' reply while streaming", reply.category);
            }
            Ok(Incoming::Notification(notification)) => {
                info!("tracker notification: {:?}", notification);
                self.metrics.record_notification();
            }
            Err(TrackerError::MalformedMessage(reason)) => {
                warn!("dropping malformed tracker message: {}", reason);
                self.metrics.record_malformed();
            }
            Err(err @ TrackerError::Protocol { .. }) => {
                warn!("tracker reported an error while streaming: {}", err);
            }
            Err(TrackerError::Timeout(limit)) => {
                info!("no tracker data for {:?}, treating stream as lost", limit);
                return ControlFlow::Break(ExitReason::ConnectionLost);
            }
            Err(err) => {
                info!("push stream ended: {}", err);
                return ControlFlow::Break(ExitReason::ConnectionLost);
            }
        }
        ControlFlow::Continue(())
    }

    fn deliver(&mut self, frame: Frame) {
        self.metrics.record_frame_received();

        if let Some(filter) = self.filter.as_mut() {
            let start = self.metrics.start_filter();
            let consumed = filter(&frame);
            self.metrics.finish_filter(start);
            if consumed {
                self.metrics.record_frame_filtered();
                return;
            }
        }

        match self.queue.enqueue(frame) {
            Enqueued::Queued => self.metrics.record_frame_enqueued(),
            Enqueued::DroppedOldest => {
                self.metrics.record_frame_enqueued();
                self.metrics.record_frame_dropped();
                debug!("frame queue full, dropped oldest frame");
            }
            Enqueued::Closed => trace!("frame queue closed, discarding frame"),
        }
    }
}

/// Ends the stream unless disarmed, so a listener that unwinds (a panicking
/// filter, say) still wakes the consumer waiting in `next()`.
struct LinkGuard {
    queue: FrameQueue,
    mode: Arc<ModeCell>,
    armed: bool,
}

impl Drop for LinkGuard {
    fn drop(&mut self) {
        if self.armed {
            self.mode.mark_link_lost();
            self.queue.close();
        }
    }
}

async fn read_next<S: FrameSource>(source: &mut S, idle_timeout: Option<Duration>) -> Result<Incoming> {
    match idle_timeout {
        Some(limit) => tokio::time::timeout(limit, source.next_message())
            .await
            .unwrap_or(Err(TrackerError::Timeout(limit))),
        None => source.next_message().await,
    }
}
