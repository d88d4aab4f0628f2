//! Cross platform time utilities, following the teacher's `tinymist_std::time`
//! split between a monotonic [`Instant`] and a wall-clock [`UtcDateTime`].

pub use std::time::{Duration, Instant};
pub use time::OffsetDateTime as UtcDateTime;

/// Returns the current wall-clock time in UTC.
pub fn utc_now() -> UtcDateTime {
    UtcDateTime::now_utc()
}

/// Returns the current monotonic instant, used for deadlines and grace
/// window bookkeeping (spec §4.D, §5).
pub fn now_instant() -> Instant {
    Instant::now()
}
