//! Bounded deadlines.
//!
//! Every wait, period and deadline the supervisor schedules goes through
//! here, so a configured duration can never overflow `Instant` arithmetic.

use std::time::Duration;

use tokio::time::Instant;

/// Longest wait or period the supervisor will schedule: one year.
pub const MAX_WAIT: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// `duration`, capped at [`MAX_WAIT`].
#[must_use]
pub fn bounded(duration: Duration) -> Duration {
    duration.min(MAX_WAIT)
}

/// The instant `duration` after `start`, capped at [`MAX_WAIT`].
#[must_use]
pub fn deadline_after(start: Instant, duration: Duration) -> Instant {
    start + bounded(duration)
}
