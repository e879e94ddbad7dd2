//! Clock abstraction and rollup time bucketing

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use chrono::Utc;

/// Source of wall-clock time in epoch milliseconds.
///
/// The TTL policy and the last-bucket rule both compare capture times
/// against "now"; tests drive them with [`ManualClock`].
pub trait Clock: Send + Sync {
    fn current_time_millis(&self) -> i64;
}

/// System wall clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn current_time_millis(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

/// Settable clock for tests
#[derive(Debug, Default)]
pub struct ManualClock {
    millis: AtomicI64,
}

impl ManualClock {
    pub fn new(millis: i64) -> Arc<Self> {
        Arc::new(Self {
            millis: AtomicI64::new(millis),
        })
    }

    pub fn set(&self, millis: i64) {
        self.millis.store(millis, Ordering::SeqCst);
    }

    pub fn advance(&self, delta_millis: i64) {
        self.millis.fetch_add(delta_millis, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn current_time_millis(&self) -> i64 {
        self.millis.load(Ordering::SeqCst)
    }
}

/// Capture time of the rollup bucket containing `capture_time`: the smallest
/// multiple of `interval_millis` that is >= `capture_time`.
///
/// A raw capture at 12:03 belongs to the 12:05 five-minute bucket, and a
/// capture exactly on a boundary belongs to that boundary's bucket.
pub fn rollup_capture_time(capture_time: i64, interval_millis: i64) -> i64 {
    let remainder = capture_time.rem_euclid(interval_millis);
    if remainder == 0 {
        capture_time
    } else {
        capture_time - remainder + interval_millis
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rollup_capture_time_rounds_up() {
        assert_eq!(rollup_capture_time(60_000, 300_000), 300_000);
        assert_eq!(rollup_capture_time(299_999, 300_000), 300_000);
        assert_eq!(rollup_capture_time(300_001, 300_000), 600_000);
    }

    #[test]
    fn test_rollup_capture_time_boundary_stays() {
        assert_eq!(rollup_capture_time(300_000, 300_000), 300_000);
        assert_eq!(rollup_capture_time(1_800_000, 1_800_000), 1_800_000);
    }

    #[test]
    fn test_manual_clock_advance() {
        let clock = ManualClock::new(1_000);
        clock.advance(500);
        assert_eq!(clock.current_time_millis(), 1_500);
        clock.set(0);
        assert_eq!(clock.current_time_millis(), 0);
    }
}
