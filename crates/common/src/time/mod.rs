//! Time utilities and abstractions
//!
//! - **Clock abstractions**: real and mock wall-clock time (re-exported from
//!   [`crate::testing`])
//! - **[`timer`]**: cancellable one-shot timers behind the
//!   [`TimerScheduler`] trait
//!
//! ## Usage
//!
//! ```rust
//! use std::time::Duration;
//!
//! use rainbow_common::time::{Clock, MockClock};
//!
//! let clock = MockClock::at_unix_millis(1_000_000);
//! clock.advance(Duration::from_secs(5));
//! assert_eq!(clock.millis_since_epoch(), 1_005_000);
//! ```

pub mod timer;

pub use timer::{after, TimerHandle, TimerScheduler, TimerTask, TokioScheduler};

// Re-export Clock abstractions from testing module
pub use crate::testing::time::{Clock, MockClock, SystemClock};
