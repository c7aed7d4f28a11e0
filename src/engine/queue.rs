use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;

use crate::core::Frame;

/// About one minute of samples at the tracker's 30 Hz push cadence.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1800;

/// What the queue does when the consumer falls behind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum QueuePolicy {
    /// Keep every frame; memory grows with the backlog.
    Unbounded,
    /// Keep at most `capacity` frames, discarding the oldest when full.
    DropOldest { capacity: usize },
}

impl Default for QueuePolicy {
    fn default() -> Self {
        Self::DropOldest {
            capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

/// Result of [`FrameQueue::enqueue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enqueued {
    Queued,
    /// Queued after evicting the oldest frame.
    DroppedOldest,
    /// Queue already closed; the frame was discarded.
    Closed,
}

#[derive(Debug, Default)]
struct QueueState {
    items: VecDeque<Frame>,
    closed: bool,
}

#[derive(Debug)]
struct Inner {
    state: Mutex<QueueState>,
    available: Notify,
    policy: QueuePolicy,
}

/// FIFO hand-off between the push listener and the consumer of `next()`.
///
/// Cloning yields another handle to the same queue. `enqueue` never waits;
/// `dequeue` waits until a frame arrives or the queue is closed. Frames
/// queued before `close` are still handed out, in order, before `dequeue`
/// reports the close.
#[derive(Debug, Clone)]
pub struct FrameQueue {
    inner: Arc<Inner>,
}

impl FrameQueue {
    pub fn new(policy: QueuePolicy) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(QueueState::default()),
                available: Notify::new(),
                policy,
            }),
        }
    }

    pub fn policy(&self) -> QueuePolicy {
        self.inner.policy
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn enqueue(&self, frame: Frame) -> Enqueued {
        let outcome = {
            let mut state = self.lock();
            if state.closed {
                return Enqueued::Closed;
            }

            let mut outcome = Enqueued::Queued;
            if let QueuePolicy::DropOldest { capacity } = self.inner.policy {
                while state.items.len() >= capacity.max(1) {
                    state.items.pop_front();
                    outcome = Enqueued::DroppedOldest;
                }
            }
            state.items.push_back(frame);
            outcome
        };

        self.inner.available.notify_one();
        outcome
    }

    /// Wait for the next frame. `None` once the queue is closed and drained.
    pub async fn dequeue(&self) -> Option<Frame> {
        loop {
            // Registered before the check so a close() racing with it still wakes us
            let notified = self.inner.available.notified();
            {
                let mut state = self.lock();
                if let Some(frame) = state.items.pop_front() {
                    return Some(frame);
                }
                if state.closed {
                    return None;
                }
            }
            notified.await;
        }
    }

    pub fn try_dequeue(&self) -> Option<Frame> {
        self.lock().items.pop_front()
    }

    /// Mark the queue closed and wake a waiting consumer. Idempotent.
    pub fn close(&self) {
        let was_closed = {
            let mut state = self.lock();
            std::mem::replace(&mut state.closed, true)
        };
        if !was_closed {
            self.inner.available.notify_waiters();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Discard all queued frames, returning how many were dropped.
    pub fn clear(&self) -> usize {
        let mut state = self.lock();
        let dropped = state.items.len();
        state.items.clear();
        dropped
    }

    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
