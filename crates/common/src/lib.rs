//! Common utilities shared across Rainbow SDK crates.
//!
//! # Feature Tiers
//!
//! - `foundation`: error types and classification
//! - `runtime`: async infrastructure (Fibonacci backoff, clocks, timers)
//! - `test-utils`: virtual-time helpers for downstream test suites

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

// Foundation tier
// -----------------------------------------------------------------
#[cfg(feature = "foundation")]
pub mod error;

// Runtime tier
// --------------------------------------------------------------------
#[cfg(feature = "runtime")]
pub mod resilience;
#[cfg(feature = "runtime")]
pub mod time;

// Testing utilities
// ---------------------------------------------------------------
#[cfg(feature = "runtime")]
pub mod testing;

// Re-export commonly used types and traits for convenience
// ------------------------
#[cfg(feature = "foundation")]
pub use error::{CommonError, CommonResult, ErrorClassification, ErrorSeverity};
#[cfg(feature = "runtime")]
pub use resilience::{BackoffConfig, BackoffStep, FibonacciBackoff};
#[cfg(feature = "runtime")]
pub use time::{Clock, MockClock, SystemClock, TimerHandle, TimerScheduler, TokioScheduler};
