//! Clock abstraction for token timing
//!
//! Token expiry is expressed in wall-clock seconds, so the clock exposes both
//! a monotonic instant and the system time. Production code takes an
//! `Arc<dyn Clock>`; tests hand in a [`MockClock`] pinned to a known epoch
//! offset.
//!
//! # Examples
//!
//! ```
//! use std::time::Duration;
//!
//! use rainbow_common::testing::{Clock, MockClock, SystemClock};
//!
//! let clock = SystemClock;
//! assert!(clock.millis_since_epoch() > 0);
//!
//! let mock = MockClock::at_unix_millis(2_000_000);
//! mock.advance(Duration::from_secs(60));
//! assert_eq!(mock.millis_since_epoch(), 2_060_000);
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;

/// Source of current time
pub trait Clock: Send + Sync {
    /// Current monotonic instant
    fn now(&self) -> Instant;

    /// Current wall-clock time
    fn system_time(&self) -> SystemTime;

    /// Milliseconds since the UNIX epoch; zero for times before the epoch
    fn millis_since_epoch(&self) -> u64 {
        self.system_time().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
    }
}

/// Real system clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn system_time(&self) -> SystemTime {
        SystemTime::now()
    }
}

/// Mock clock for deterministic testing
///
/// Clones share the same elapsed time, so a clock handed to the code under
/// test can be advanced from the test body.
#[derive(Debug, Clone)]
pub struct MockClock {
    start: Instant,
    elapsed: Arc<Mutex<Duration>>,
    base_system_time: Arc<Mutex<SystemTime>>,
}

impl MockClock {
    /// Create a mock clock starting at the current real time
    pub fn new() -> Self {
        Self::with_system_time(SystemTime::now())
    }

    /// Create a mock clock whose wall clock starts at `system_time`
    pub fn with_system_time(system_time: SystemTime) -> Self {
        Self {
            start: Instant::now(),
            elapsed: Arc::new(Mutex::new(Duration::ZERO)),
            base_system_time: Arc::new(Mutex::new(system_time)),
        }
    }

    /// Create a mock clock whose wall clock starts `millis` after the epoch
    pub fn at_unix_millis(millis: u64) -> Self {
        Self::with_system_time(UNIX_EPOCH + Duration::from_millis(millis))
    }

    /// Simulate time passing without waiting
    pub fn advance(&self, duration: Duration) {
        *self.elapsed.lock() += duration;
    }

    /// Set the elapsed time to an absolute value
    pub fn set_elapsed(&self, duration: Duration) {
        *self.elapsed.lock() = duration;
    }

    /// Jump the wall clock to `millis` after the epoch
    ///
    /// The monotonic instant is left untouched; only `system_time` moves.
    pub fn set_unix_millis(&self, millis: u64) {
        let elapsed = *self.elapsed.lock();
        let target = UNIX_EPOCH + Duration::from_millis(millis);
        *self.base_system_time.lock() = target.checked_sub(elapsed).unwrap_or(UNIX_EPOCH);
    }

    /// Time simulated since the clock was created
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        *self.elapsed.lock()
    }
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MockClock {
    fn now(&self) -> Instant {
        self.start + self.elapsed()
    }

    fn system_time(&self) -> SystemTime {
        *self.base_system_time.lock() + self.elapsed()
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for testing::time.
    use super::*;

    /// Validates the system clock scenario.
    ///
    /// Assertions:
    /// - Ensures instants are monotonic and the epoch offset is positive.
    #[test]
    fn test_system_clock() {
        let clock = SystemClock;
        let now1 = clock.now();
        let now2 = clock.now();

        assert!(now2 >= now1);
        assert!(clock.millis_since_epoch() > 0);
    }

    /// Validates `MockClock::advance` moves both time sources.
    ///
    /// Assertions:
    /// - Confirms the monotonic and wall clocks move by the same amount.
    #[test]
    fn test_mock_clock_advance() {
        let clock = MockClock::at_unix_millis(10_000);
        let start = clock.now();

        clock.advance(Duration::from_secs(5));

        assert_eq!(clock.now().duration_since(start), Duration::from_secs(5));
        assert_eq!(clock.millis_since_epoch(), 15_000);
    }

    /// Validates `MockClock::set_unix_millis` repositions the wall clock.
    ///
    /// Assertions:
    /// - Confirms the epoch offset equals the requested value even after
    ///   prior advances.
    /// - Confirms later advances still apply.
    #[test]
    fn test_mock_clock_set_unix_millis() {
        let clock = MockClock::at_unix_millis(0);
        clock.advance(Duration::from_secs(3));

        clock.set_unix_millis(1_940_000);
        assert_eq!(clock.millis_since_epoch(), 1_940_000);

        clock.advance(Duration::from_millis(500));
        assert_eq!(clock.millis_since_epoch(), 1_940_500);
    }

    /// Validates that clones share state.
    ///
    /// Assertions:
    /// - Confirms `clock2.elapsed()` tracks advances made through `clock1`.
    #[test]
    fn test_mock_clock_clone() {
        let clock1 = MockClock::new();
        clock1.advance(Duration::from_secs(10));

        let clock2 = clock1.clone();
        assert_eq!(clock2.elapsed(), Duration::from_secs(10));

        clock1.advance(Duration::from_secs(5));
        assert_eq!(clock2.elapsed(), Duration::from_secs(15));

        clock1.set_unix_millis(42);
        assert_eq!(clock2.millis_since_epoch(), 42);
    }
}
