use std::time::{SystemTime, UNIX_EPOCH};

/// Receipt timestamps for one connection.
///
/// Never hands out a value lower than the previous one, so frames read on the
/// same connection keep non-decreasing local timestamps even if the system
/// clock is stepped backwards.
#[derive(Debug, Default)]
pub struct ReceiptClock {
    last: f64,
}

impl ReceiptClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stamp(&mut self) -> f64 {
        self.stamp_at(wall_clock_seconds())
    }

    fn stamp_at(&mut self, now: f64) -> f64 {
        if now > self.last {
            self.last = now;
        }
        self.last
    }
}

pub fn wall_clock_seconds() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or_default()
}
