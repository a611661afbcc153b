//! Time helpers.
//!
//! All engine logic takes `now` as a Unix timestamp in seconds from the
//! caller. Nothing in the engine reads the wall clock; only the host binary
//! calls [`unix_now`].

use std::time::{SystemTime, UNIX_EPOCH};

pub const SECS_PER_MINUTE: u64 = 60;
pub const SECS_PER_HOUR: u64 = 3_600;
pub const SECS_PER_DAY: u64 = 86_400;

/// Start of the UTC day containing `now`.
#[must_use]
#[inline]
pub fn day_start(now: u64) -> u64 {
    now - now % SECS_PER_DAY
}

/// Converts a day count to seconds, saturating on overflow.
#[must_use]
#[inline]
pub fn days(n: u64) -> u64 {
    n.saturating_mul(SECS_PER_DAY)
}

/// Whole days elapsed between `from` and `to`. Zero if `to < from`.
#[must_use]
#[inline]
pub fn whole_days_between(from: u64, to: u64) -> u64 {
    to.saturating_sub(from) / SECS_PER_DAY
}

/// Current Unix time in seconds. Returns 0 if the clock is before the epoch.
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_day_start_truncates() {
        let ts = 1_700_000_000;
        let start = day_start(ts);
        assert_eq!(start % SECS_PER_DAY, 0);
        assert!(start <= ts);
        assert!(ts - start < SECS_PER_DAY);
    }

    #[test]
    fn test_day_start_on_boundary() {
        assert_eq!(day_start(SECS_PER_DAY * 3), SECS_PER_DAY * 3);
    }

    #[test]
    fn test_whole_days_between() {
        assert_eq!(whole_days_between(0, SECS_PER_DAY - 1), 0);
        assert_eq!(whole_days_between(0, SECS_PER_DAY * 7), 7);
        assert_eq!(whole_days_between(100, 50), 0);
    }

    #[test]
    fn test_days_saturates() {
        assert_eq!(days(u64::MAX), u64::MAX);
        assert_eq!(days(2), 172_800);
    }
}
