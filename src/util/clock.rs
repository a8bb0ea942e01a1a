//! Wall-clock helpers. All scheduling instants are UTC milliseconds since the epoch.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Milliseconds in one second.
pub const MILLIS_PER_SECOND: u128 = 1_000;
/// Milliseconds in one day.
pub const MILLIS_PER_DAY: u128 = 86_400_000;

/// Current UTC time in milliseconds since the epoch.
///
/// A clock set before 1970 reads as zero rather than panicking.
#[must_use]
pub fn now_ms() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0)
}

/// Milliseconds from `now_ms` until `deadline_ms`, zero when the deadline has passed.
#[must_use]
pub fn millis_until(deadline_ms: u128, now_ms: u128) -> u64 {
    u64::try_from(deadline_ms.saturating_sub(now_ms)).unwrap_or(u64::MAX)
}

/// Convert a millisecond count from configuration into a `Duration`.
#[must_use]
pub const fn duration_ms(ms: u64) -> Duration {
    Duration::from_millis(ms)
}
