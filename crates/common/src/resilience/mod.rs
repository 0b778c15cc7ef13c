//! Resilience primitives shared by the session layer
//!
//! - **[`backoff`]**: capped Fibonacci delay generator with multiplicative
//!   jitter and a consecutive-failure cap
//!
//! The generator is deliberately free of timers and I/O. Callers own the
//! scheduling (see [`crate::time::timer`]) and decide what a failed attempt
//! means.

pub mod backoff;

pub use backoff::{
    apply_jitter, BackoffConfig, BackoffConfigBuilder, BackoffStep, FibonacciBackoff,
    DEFAULT_INITIAL_DELAY, DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_DELAY, DEFAULT_RANDOMIZATION_FACTOR,
};
