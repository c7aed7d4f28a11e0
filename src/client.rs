use crate::config::TrackerConfig;
use crate::connection::SessionInfo;
use crate::core::Frame;
use crate::engine::{ConnectionState, FrameFilter, ModeController};
use crate::error::Result;
use crate::observability::MetricsSnapshot;

/// Client for an Eye Tribe compatible tracker server.
///
/// Starts disconnected. [`connect`](Self::connect) enters pull mode, where
/// every [`next`](Self::next) is one round trip to the server.
/// [`pushmode`](Self::pushmode) switches to a background listener that
/// buffers streamed frames until `next` collects them.
///
/// ```no_run
/// # async fn demo() -> gazelink::Result<()> {
/// let mut tracker = gazelink::EyeTracker::default();
/// tracker.connect().await?;
/// let frame = tracker.next().await?;
/// println!("{:?}", frame.avg_combined());
///
/// tracker.pushmode_with(|frame| !frame.has_gaze()).await?;
/// for _ in 0..10 {
///     let frame = tracker.next().await?;
///     println!("{}", frame.state());
/// }
/// tracker.close().await?;
/// # Ok(())
/// # }
/// ```
pub struct EyeTracker {
    controller: ModeController,
}

impl EyeTracker {
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            controller: ModeController::new(config),
        }
    }

    pub fn with_address(host: impl Into<String>, port: u16) -> Self {
        Self::new(TrackerConfig::new(host, port))
    }

    /// Open the connection and negotiate the session. Leaves the client in
    /// pull mode.
    pub async fn connect(&mut self) -> Result<()> {
        self.controller.connect().await
    }

    /// Next frame, either freshly requested (pull) or the oldest buffered
    /// one (push). In push mode this waits until a frame arrives or the
    /// connection goes away.
    pub async fn next(&mut self) -> Result<Frame> {
        self.controller.next().await
    }

    /// Non-waiting variant of [`next`](Self::next) for push mode. In pull
    /// mode it performs a normal round trip.
    pub async fn try_next(&mut self) -> Result<Option<Frame>> {
        self.controller.try_next().await
    }

    /// Switch to push mode. Frames for which `filter` returns `true` are
    /// consumed by the filter and never reach [`next`](Self::next).
    pub async fn pushmode(&mut self, filter: Option<FrameFilter>) -> Result<()> {
        self.controller.pushmode(filter).await
    }

    pub async fn pushmode_with<F>(&mut self, filter: F) -> Result<()>
    where
        F: FnMut(&Frame) -> bool + Send + 'static,
    {
        self.controller.pushmode(Some(Box::new(filter))).await
    }

    /// Back to pull mode. Frames still buffered are discarded.
    pub async fn pullmode(&mut self) -> Result<()> {
        self.controller.pullmode().await
    }

    /// Disconnect from any state. Calling it again is a no-op.
    pub async fn close(&mut self) -> Result<()> {
        self.controller.close().await
    }

    /// Change the server address. Only valid while disconnected.
    pub fn bind(&mut self, host: impl Into<String>, port: u16) -> Result<()> {
        self.controller.bind(host, port)
    }

    pub fn state(&self) -> ConnectionState {
        self.controller.state()
    }

    pub fn session(&self) -> Option<&SessionInfo> {
        self.controller.session()
    }

    pub fn config(&self) -> &TrackerConfig {
        self.controller.config()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.controller.metrics()
    }

    pub fn is_listening(&self) -> bool {
        self.controller.is_listening()
    }
}

impl Default for EyeTracker {
    fn default() -> Self {
        Self::new(TrackerConfig::default())
    }
}
