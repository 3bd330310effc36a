//! Provides the timestamps used to track entry lifespans.
//!
//! Within the unit tests of this crate, [Instant] is backed by **mock_instant** so that tests
//! can move time forward via `MockClock::advance` instead of actually waiting. Note that the
//! mocked clock is thread local, therefore tests running in parallel do not affect each other.
use std::time::Duration;

#[cfg(test)]
pub use mock_instant::Instant;
#[cfg(not(test))]
pub use std::time::Instant;

/// Returns the time elapsed between **since** and **now**.
///
/// Yields zero if **since** lies after **now**. This happens if an entry is accessed concurrently
/// after a sweep has captured its notion of "now".
pub fn idle_time(now: Instant, since: Instant) -> Duration {
    if since >= now {
        Duration::ZERO
    } else {
        now.duration_since(since)
    }
}
