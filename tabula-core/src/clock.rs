//! Clock abstraction for engine timestamps.
//!
//! Engine-assigned timestamps go through a [`Clock`] so tests can pin time
//! and so `UpdatedAt` can be advanced strictly even when two mutations land
//! in the same clock tick.

use crate::Timestamp;
use chrono::{Duration, SubsecRound, Utc};
use parking_lot::Mutex;

/// Source of "now" for the engine.
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// Production clock using system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Utc::now()
    }
}

/// Manually driven clock for deterministic tests.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<Timestamp>,
}

impl ManualClock {
    pub fn new(start: Timestamp) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn set(&self, ts: Timestamp) {
        *self.now.lock() = ts;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock();
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        *self.now.lock()
    }
}

/// Timestamp for a mutation of a record last stamped at `previous`.
///
/// Truncated to microseconds (the stored precision) and strictly after
/// `previous`.
pub fn next_stamp(now: Timestamp, previous: Option<Timestamp>) -> Timestamp {
    let now = now.trunc_subsecs(6);
    match previous {
        Some(prev) if now <= prev => prev.trunc_subsecs(6) + Duration::microseconds(1),
        _ => now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_manual_clock_advances() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let clock = ManualClock::new(start);
        clock.advance(Duration::seconds(5));
        assert_eq!(clock.now(), start + Duration::seconds(5));
    }

    #[test]
    fn test_next_stamp_is_strictly_after_previous() {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(next_stamp(t0, Some(t0)), t0 + Duration::microseconds(1));
        assert_eq!(next_stamp(t0 - Duration::seconds(1), Some(t0)), t0 + Duration::microseconds(1));
        assert_eq!(next_stamp(t0 + Duration::seconds(1), Some(t0)), t0 + Duration::seconds(1));
        assert_eq!(next_stamp(t0, None), t0);
    }

    #[test]
    fn test_next_stamp_truncates_to_micros() {
        let t = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::nanoseconds(1_500);
        assert_eq!(next_stamp(t, None).timestamp_subsec_nanos(), 1_000);
    }
}
