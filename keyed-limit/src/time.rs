use std::time::Duration;

use quanta::Instant;

/// Time elapsed from `since` to `now`, zero if `since` is in the future.
#[inline]
pub(crate) fn elapsed(now: Instant, since: Instant) -> Duration {
    now.checked_duration_since(since).unwrap_or(Duration::ZERO)
}

/// What is left of `bound` once `elapsed` has passed, never negative.
#[inline]
pub(crate) fn remaining(bound: Duration, elapsed: Duration) -> Duration {
    bound.saturating_sub(elapsed)
}

/// Whole nanoseconds in `d`, saturating at `u64::MAX`.
#[inline]
pub(crate) fn nanos(d: Duration) -> u64 {
    u64::try_from(d.as_nanos()).unwrap_or(u64::MAX)
}
