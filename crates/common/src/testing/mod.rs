//! Testing utilities and helpers
//!
//! - **[`assertions`]**: assertions for timing-sensitive tests
//! - **[`time`]**: the [`Clock`] abstraction with real and mock clocks
//! - **[`timer`]**: [`ManualScheduler`], a virtual-time
//!   [`TimerScheduler`](crate::time::TimerScheduler)
//!
//! ## Usage
//!
//! ```rust
//! use std::time::Duration;
//!
//! use rainbow_common::testing::{ManualScheduler, MockClock};
//!
//! let clock = MockClock::at_unix_millis(0);
//! let scheduler = ManualScheduler::with_clock(clock.clone());
//! assert_eq!(scheduler.pending(), 0);
//! clock.advance(Duration::from_secs(1));
//! ```

pub mod assertions;
pub mod time;
pub mod timer;

pub use assertions::assert_jittered;
pub use time::{Clock, MockClock, SystemClock};
pub use timer::ManualScheduler;
