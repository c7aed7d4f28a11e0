pub mod controller;
pub mod heartbeat;
pub mod listener;
pub mod queue;
pub mod state;

pub use controller::ModeController;
pub use listener::{ExitReason, FrameFilter, FrameListener, FrameSource, ListenerExit};
pub use queue::{Enqueued, FrameQueue, QueuePolicy, DEFAULT_QUEUE_CAPACITY};
pub use state::{ConnectionState, ModeCell};
