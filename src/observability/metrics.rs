use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Counters for one push-mode stream, shared between the listener task,
/// the frame queue and the client.
#[derive(Debug, Default)]
pub struct StreamMetrics {
    frames_received: AtomicU64,
    frames_filtered: AtomicU64,
    frames_enqueued: AtomicU64,
    frames_dropped: AtomicU64,
    malformed_messages: AtomicU64,
    notifications: AtomicU64,
    total_filter_latency_us: AtomicU64,
    filter_calls: AtomicU64,
}

/// Point-in-time copy of [`StreamMetrics`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub frames_received: u64,
    pub frames_filtered: u64,
    pub frames_enqueued: u64,
    pub frames_dropped: u64,
    pub malformed_messages: u64,
    pub notifications: u64,
    pub avg_filter_latency_us: u64,
}

impl StreamMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frames_received(&self) -> u64 {
        self.frames_received.load(Ordering::Relaxed)
    }

    pub fn frames_filtered(&self) -> u64 {
        self.frames_filtered.load(Ordering::Relaxed)
    }

    pub fn frames_enqueued(&self) -> u64 {
        self.frames_enqueued.load(Ordering::Relaxed)
    }

    pub fn frames_dropped(&self) -> u64 {
        self.frames_dropped.load(Ordering::Relaxed)
    }

    pub fn malformed_messages(&self) -> u64 {
        self.malformed_messages.load(Ordering::Relaxed)
    }

    pub fn notifications(&self) -> u64 {
        self.notifications.load(Ordering::Relaxed)
    }

    pub fn record_frame_received(&self) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_frame_filtered(&self) {
        self.frames_filtered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_frame_enqueued(&self) {
        self.frames_enqueued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_frame_dropped(&self) {
        self.frames_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_malformed(&self) {
        self.malformed_messages.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_notification(&self) {
        self.notifications.fetch_add(1, Ordering::Relaxed);
    }

    pub fn start_filter(&self) -> Instant {
        Instant::now()
    }

    pub fn finish_filter(&self, start: Instant) {
        let latency_us = start.elapsed().as_micros() as u64;
        self.total_filter_latency_us.fetch_add(latency_us, Ordering::Relaxed);
        self.filter_calls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn avg_filter_latency_us(&self) -> u64 {
        let calls = self.filter_calls.load(Ordering::Relaxed);
        if calls == 0 {
            return 0;
        }
        self.total_filter_latency_us.load(Ordering::Relaxed) / calls
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            frames_received: self.frames_received(),
            frames_filtered: self.frames_filtered(),
            frames_enqueued: self.frames_enqueued(),
            frames_dropped: self.frames_dropped(),
            malformed_messages: self.malformed_messages(),
            notifications: self.notifications(),
            avg_filter_latency_us: self.avg_filter_latency_us(),
        }
    }
}
