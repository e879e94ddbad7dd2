//! Per-write TTL policy
//!
//! Data rows expire `retention - age(capture_time)` seconds after the write,
//! so a row's absolute expiry does not depend on when it was (re)written —
//! which keeps re-run rollups idempotent. Work-queue rows expire at least one
//! max rollup interval plus an hour earlier than the data they reference, so
//! a consumed needs-rollup entry always finds its source rows still alive.

use crate::core::constants::{MIN_TTL_SECONDS, NEEDS_ROLLUP_TTL_SLACK_SECONDS};
use crate::utils::time::Clock;

/// TTL for a data row: the level's retention minus the age of the capture
/// time, floored at 60 seconds. A retention of zero means no expiry.
pub fn adjusted_ttl(ttl_seconds: i64, capture_time: i64, clock: &dyn Clock) -> i32 {
    if ttl_seconds == 0 {
        return 0;
    }
    let age_seconds = (clock.current_time_millis() - capture_time) / 1000;
    clamp_ttl(ttl_seconds - age_seconds)
}

/// TTL for a work-queue row, derived from the data TTL of the same write
pub fn needs_rollup_adjusted_ttl(adjusted_ttl: i32, max_rollup_interval_millis: i64) -> i32 {
    if adjusted_ttl == 0 {
        return 0;
    }
    clamp_ttl(
        i64::from(adjusted_ttl) - max_rollup_interval_millis / 1000 - NEEDS_ROLLUP_TTL_SLACK_SECONDS,
    )
}

fn clamp_ttl(ttl_seconds: i64) -> i32 {
    ttl_seconds.max(MIN_TTL_SECONDS).min(i64::from(i32::MAX)) as i32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::time::ManualClock;

    #[test]
    fn test_adjusted_ttl_subtracts_age() {
        let clock = ManualClock::new(600_000);
        // capture 10 minutes ago, retention 1 hour
        assert_eq!(adjusted_ttl(3_600, 0, clock.as_ref()), 3_000);
    }

    #[test]
    fn test_adjusted_ttl_floors_at_sixty_seconds() {
        let clock = ManualClock::new(86_400_000);
        assert_eq!(adjusted_ttl(3_600, 0, clock.as_ref()), 60);
    }

    #[test]
    fn test_zero_retention_means_no_expiry() {
        let clock = ManualClock::new(86_400_000);
        assert_eq!(adjusted_ttl(0, 0, clock.as_ref()), 0);
        assert_eq!(needs_rollup_adjusted_ttl(0, 14_400_000), 0);
    }

    #[test]
    fn test_needs_rollup_ttl_keeps_source_rows_alive() {
        let data_ttl = 1_209_600; // 2 weeks
        let max_interval = 14_400_000; // 4 hours
        let queue_ttl = needs_rollup_adjusted_ttl(data_ttl, max_interval);
        // data outlives the queue entry by >= max interval + 1 hour
        assert!(i64::from(data_ttl) >= i64::from(queue_ttl) + max_interval / 1000 + 3_600);
        assert_eq!(queue_ttl, 1_191_600);
    }
}
