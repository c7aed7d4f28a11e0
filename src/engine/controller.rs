use log::{debug, info, warn};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::timeout;

use super::heartbeat::spawn_heartbeat;
use super::listener::{ExitReason, FrameFilter, FrameListener, ListenerExit};
use super::queue::FrameQueue;
use super::state::{ConnectionState, ModeCell};
use crate::config::TrackerConfig;
use crate::connection::{Connection, ReplyReader, SessionInfo};
use crate::core::Frame;
use crate::error::{Result, TrackerError};
use crate::observability::{MetricsSnapshot, StreamMetrics};
use crate::protocol::Request;

/// Background machinery that exists only while in push mode.
struct PushSession {
    queue: FrameQueue,
    stop_tx: watch::Sender<bool>,
    listener: JoinHandle<ListenerExit<ReplyReader>>,
    heartbeat: Option<JoinHandle<()>>,
}

/// Disconnected / Pull / Push state machine.
///
/// The controller is the only place that starts or stops the push listener,
/// which guarantees that the connection's reader is used by exactly one
/// task at a time: the caller in pull mode, the listener in push mode.
pub struct ModeController {
    config: TrackerConfig,
    mode: Arc<ModeCell>,
    connection: Option<Connection>,
    session: Option<SessionInfo>,
    push: Option<PushSession>,
    metrics: Arc<StreamMetrics>,
}

impl ModeController {
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            config,
            mode: Arc::new(ModeCell::new()),
            connection: None,
            session: None,
            push: None,
            metrics: Arc::new(StreamMetrics::new()),
        }
    }

    /// Current mode. A session whose push stream was lost reports
    /// `Disconnected` even before the next call reaps it.
    pub fn state(&self) -> ConnectionState {
        if self.mode.is_link_lost() {
            return ConnectionState::Disconnected;
        }
        self.mode.get()
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn session(&self) -> Option<&SessionInfo> {
        self.session.as_ref()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// True while a push listener task is alive.
    pub fn is_listening(&self) -> bool {
        self.push
            .as_ref()
            .map(|push| !push.listener.is_finished())
            .unwrap_or(false)
    }

    /// Frames waiting in the push queue.
    pub fn queued(&self) -> usize {
        self.push.as_ref().map(|push| push.queue.len()).unwrap_or(0)
    }

    fn enter(&self, target: ConnectionState) {
        match self.mode.transition_to(target) {
            Ok(previous) => debug!("mode {} -> {}", previous, target),
            Err(current) => warn!("refused mode transition {} -> {}", current, target),
        }
    }

    /// Point a disconnected client at another tracker.
    pub fn bind(&mut self, host: impl Into<String>, port: u16) -> Result<()> {
        if self.state().is_connected() {
            return Err(TrackerError::AlreadyConnected);
        }
        self.config.host = host.into();
        self.config.port = port;
        Ok(())
    }

    /// Release a session the listener found dead. Returns the error to
    /// report when there was one.
    async fn reap_lost_link(&mut self) -> Option<TrackerError> {
        if !self.mode.is_link_lost() {
            return None;
        }
        info!("push stream was lost, closing the session");
        self.teardown().await;
        Some(TrackerError::ConnectionLost)
    }

    /// Disconnected -> Pull.
    pub async fn connect(&mut self) -> Result<()> {
        // A lost session still holds its socket until reaped
        self.reap_lost_link().await;
        if self.state().is_connected() {
            return Err(TrackerError::AlreadyConnected);
        }
        self.config.validate()?;

        let (connection, session) = Connection::open(&self.config).await?;
        self.connection = Some(connection);
        self.session = Some(session);
        self.enter(ConnectionState::Pull);
        Ok(())
    }

    /// Pull -> Push. A no-op when already pushing; the running filter is kept.
    pub async fn pushmode(&mut self, filter: Option<FrameFilter>) -> Result<()> {
        if let Some(err) = self.reap_lost_link().await {
            return Err(err);
        }
        match self.mode.get() {
            ConnectionState::Disconnected => return Err(TrackerError::NotConnected),
            ConnectionState::Push => return Ok(()),
            ConnectionState::Pull => {}
        }

        let connection = self.connection.as_mut().ok_or(TrackerError::NotConnected)?;
        let early = match connection.enable_push().await {
            Ok(early) => early,
            Err(e) => return Err(self.fail(e).await),
        };

        let reader = connection.take_reader().ok_or(TrackerError::NotConnected)?;
        let writer = connection.writer();

        let queue = FrameQueue::new(self.config.queue);
        let (stop_tx, stop_rx) = watch::channel(false);

        let listener = FrameListener::new(
            reader,
            queue.clone(),
            Arc::clone(&self.metrics),
            Arc::clone(&self.mode),
            stop_rx.clone(),
        )
        .with_filter(filter)
        .with_backlog(early)
        .with_idle_timeout(self.config.idle_timeout())
        .spawn();

        let heartbeat_interval = self
            .session
            .map(|s| s.heartbeat_interval)
            .unwrap_or_default();
        let heartbeat = (self.config.heartbeat && !heartbeat_interval.is_zero())
            .then(|| spawn_heartbeat(writer, heartbeat_interval, stop_rx));

        self.push = Some(PushSession {
            queue,
            stop_tx,
            listener,
            heartbeat,
        });
        self.enter(ConnectionState::Push);
        Ok(())
    }

    /// Push -> Pull. A no-op when already pulling.
    pub async fn pullmode(&mut self) -> Result<()> {
        if let Some(err) = self.reap_lost_link().await {
            return Err(err);
        }
        match self.mode.get() {
            ConnectionState::Disconnected => return Err(TrackerError::NotConnected),
            ConnectionState::Pull => return Ok(()),
            ConnectionState::Push => {}
        }

        let Some(push) = self.push.take() else {
            self.enter(ConnectionState::Pull);
            return Ok(());
        };

        let exit = match self.stop_push(push).await {
            Ok(exit) => exit,
            Err(e) => {
                self.teardown().await;
                return Err(e);
            }
        };

        if exit.reason == ExitReason::ConnectionLost {
            self.teardown().await;
            return Err(TrackerError::ConnectionLost);
        }

        let connection = self.connection.as_mut().ok_or(TrackerError::NotConnected)?;
        connection.restore_reader(exit.source);

        let disabled = connection.request(&Request::SetPush(false)).await;
        self.enter(ConnectionState::Pull);
        match disabled {
            Ok(_) => Ok(()),
            Err(e) => Err(self.fail(e).await),
        }
    }

    /// Next frame: a round trip in pull mode, the queue head in push mode.
    ///
    /// After the push stream is lost, frames already queued are still handed
    /// out before `ConnectionClosed`.
    pub async fn next(&mut self) -> Result<Frame> {
        match self.mode.get() {
            ConnectionState::Disconnected => Err(TrackerError::NotConnected),
            ConnectionState::Pull => {
                let connection = self.connection.as_mut().ok_or(TrackerError::NotConnected)?;
                match connection.request_frame().await {
                    Ok(frame) => Ok(frame),
                    Err(e) => Err(self.fail(e).await),
                }
            }
            ConnectionState::Push => {
                let queue = self
                    .push
                    .as_ref()
                    .map(|push| push.queue.clone())
                    .ok_or(TrackerError::NotConnected)?;

                match queue.dequeue().await {
                    Some(frame) => Ok(frame),
                    None => {
                        self.teardown().await;
                        Err(TrackerError::ConnectionClosed)
                    }
                }
            }
        }
    }

    /// Like [`next`](Self::next) but returns `Ok(None)` instead of waiting
    /// when the push queue is empty.
    pub async fn try_next(&mut self) -> Result<Option<Frame>> {
        if self.mode.get() != ConnectionState::Push {
            return self.next().await.map(Some);
        }

        let Some(queue) = self.push.as_ref().map(|push| push.queue.clone()) else {
            return Err(TrackerError::NotConnected);
        };
        if let Some(frame) = queue.try_dequeue() {
            return Ok(Some(frame));
        }
        if queue.is_closed() {
            self.teardown().await;
            return Err(TrackerError::ConnectionClosed);
        }
        Ok(None)
    }

    /// Tear everything down from any state. Idempotent.
    ///
    /// Local resources are always released. The only reported failure is a
    /// listener that ignored the stop signal past the shutdown timeout.
    pub async fn close(&mut self) -> Result<()> {
        let mut result = Ok(());

        if let Some(push) = self.push.take() {
            if let Err(e @ TrackerError::ShutdownTimeout(_)) = self.stop_push(push).await {
                result = Err(e);
            }
        }

        if let Some(mut connection) = self.connection.take() {
            connection.close().await;
        }

        self.session = None;
        let previous = self.mode.reset();
        if previous.is_connected() {
            debug!("mode {} -> {}", previous, ConnectionState::Disconnected);
        }
        result
    }

    async fn teardown(&mut self) {
        if let Err(e) = self.close().await {
            warn!("teardown after failure: {}", e);
        }
    }

    /// Tear down on errors that leave the socket unusable, then hand the
    /// error back.
    async fn fail(&mut self, err: TrackerError) -> TrackerError {
        if err.is_fatal_to_session() {
            self.teardown().await;
        }
        err
    }

    /// Signal the listener and heartbeat to stop and wait for both.
    async fn stop_push(&self, push: PushSession) -> Result<ListenerExit<ReplyReader>> {
        let PushSession {
            queue,
            stop_tx,
            mut listener,
            heartbeat,
        } = push;

        // Receivers may already be gone if both tasks exited on their own
        let _ = stop_tx.send(true);
        let limit = self.config.shutdown_timeout();

        if let Some(mut heartbeat) = heartbeat {
            if timeout(limit, &mut heartbeat).await.is_err() {
                heartbeat.abort();
            }
        }

        let joined = timeout(limit, &mut listener).await;

        let dropped = queue.clear();
        queue.close();
        if dropped > 0 {
            debug!("discarded {} undelivered frames on leaving push mode", dropped);
        }

        match joined {
            Ok(Ok(exit)) => Ok(exit),
            Ok(Err(e)) => {
                warn!("frame listener task failed: {}", e);
                Err(TrackerError::ConnectionLost)
            }
            Err(_) => {
                listener.abort();
                Err(TrackerError::ShutdownTimeout(limit))
            }
        }
    }
}

impl Drop for ModeController {
    fn drop(&mut self) {
        // Can't await the tasks here; signal them so they exit on their own
        if let Some(push) = &self.push {
            let _ = push.stop_tx.send(true);
        }
    }
}
