//! Capped Fibonacci backoff with multiplicative jitter
//!
//! The delay sequence is seeded twice with the initial delay and every later
//! term is the sum of the two previous ones, capped at `max_delay`:
//!
//! ```text
//! initial=2s, max=60s:  2s 2s 4s 6s 10s 16s 26s 42s 60s 60s ...
//! ```
//!
//! Each emitted delay is multiplied by a factor drawn uniformly from
//! `[1 - r, 1 + r]` where `r` is the randomization factor. The generator also
//! tracks the consecutive failure count so callers can stop after
//! `max_attempts` failures.
//!
//! # Examples
//!
//! ```
//! use std::time::Duration;
//!
//! use rainbow_common::resilience::{BackoffConfig, BackoffStep, FibonacciBackoff};
//!
//! let config = BackoffConfig::builder()
//!     .initial_delay(Duration::from_millis(100))
//!     .max_delay(Duration::from_secs(1))
//!     .randomization_factor(0.0)
//!     .max_attempts(3)
//!     .build()
//!     .unwrap();
//!
//! let mut backoff = FibonacciBackoff::new(config);
//! assert_eq!(backoff.next_delay(), Duration::from_millis(100));
//! assert_eq!(
//!     backoff.record_failure(),
//!     BackoffStep::Retry { attempt: 1, delay: Duration::from_millis(100) }
//! );
//! ```

use std::time::Duration;

use rand::Rng;
use tracing::debug;

use crate::error::{CommonError, CommonResult};

/// Default first delay of a reconnection cycle
pub const DEFAULT_INITIAL_DELAY: Duration = Duration::from_millis(2_000);

/// Default delay cap
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_millis(60_000);

/// Default randomization factor
pub const DEFAULT_RANDOMIZATION_FACTOR: f64 = 0.4;

/// Default number of consecutive failures before giving up
pub const DEFAULT_MAX_ATTEMPTS: u32 = 50;

/// Configuration for [`FibonacciBackoff`]
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffConfig {
    /// First (and second) delay of the sequence
    pub initial_delay: Duration,
    /// Upper bound for any unjittered delay
    pub max_delay: Duration,
    /// Jitter amplitude in `[0, 1]`
    pub randomization_factor: f64,
    /// Consecutive failures allowed before the cycle is abandoned
    pub max_attempts: u32,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay: DEFAULT_INITIAL_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            randomization_factor: DEFAULT_RANDOMIZATION_FACTOR,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl BackoffConfig {
    /// Create a configuration builder
    pub fn builder() -> BackoffConfigBuilder {
        BackoffConfigBuilder::default()
    }

    /// Validate the configuration
    pub fn validate(&self) -> CommonResult<()> {
        if self.initial_delay.is_zero() {
            return Err(CommonError::config_field(
                "initial_delay",
                "must be greater than zero",
            ));
        }
        if self.initial_delay > self.max_delay {
            return Err(CommonError::config_field(
                "initial_delay",
                format!(
                    "initial_delay ({:?}) cannot be greater than max_delay ({:?})",
                    self.initial_delay, self.max_delay
                ),
            ));
        }
        if !(0.0..=1.0).contains(&self.randomization_factor) {
            return Err(CommonError::config_field(
                "randomization_factor",
                format!("must be within [0, 1], got {}", self.randomization_factor),
            ));
        }
        if self.max_attempts == 0 {
            return Err(CommonError::config_field("max_attempts", "must be greater than 0"));
        }
        Ok(())
    }
}

/// Builder for [`BackoffConfig`] with fluent API
#[derive(Debug, Default)]
pub struct BackoffConfigBuilder {
    config: BackoffConfig,
}

impl BackoffConfigBuilder {
    /// Delay before the first retry
    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.config.initial_delay = delay;
        self
    }

    /// Upper bound on any single delay
    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.config.max_delay = delay;
        self
    }

    /// Jitter factor, from 0 (none) to 1
    pub fn randomization_factor(mut self, factor: f64) -> Self {
        self.config.randomization_factor = factor;
        self
    }

    /// Consecutive failures before giving up
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.config.max_attempts = attempts;
        self
    }

    /// Validate and produce the config
    pub fn build(self) -> CommonResult<BackoffConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// What to do after a recorded failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackoffStep {
    /// Try again after `delay`; `attempt` failures have been recorded so far
    Retry { attempt: u32, delay: Duration },
    /// `attempts` consecutive failures reached the configured cap
    Exhausted { attempts: u32 },
}

/// Fibonacci backoff state
///
/// `current_delay` never decreases across consecutive calls to
/// [`next_delay`](Self::next_delay) and returns to `initial_delay` only
/// through [`reset`](Self::reset).
#[derive(Debug, Clone)]
pub struct FibonacciBackoff {
    config: BackoffConfig,
    previous_ms: u64,
    upcoming_ms: u64,
    current_delay: Duration,
    attempts: u32,
}

impl FibonacciBackoff {
    /// Create a fresh backoff at its initial delay
    pub fn new(config: BackoffConfig) -> Self {
        let initial_ms = duration_millis(config.initial_delay);
        Self {
            current_delay: config.initial_delay,
            previous_ms: 0,
            upcoming_ms: initial_ms,
            attempts: 0,
            config,
        }
    }

    /// Produce the next unjittered delay and advance the sequence
    pub fn next_base_delay(&mut self) -> Duration {
        let max_ms = duration_millis(self.config.max_delay);
        let delay_ms = self.upcoming_ms.min(max_ms);
        self.upcoming_ms = self.upcoming_ms.saturating_add(self.previous_ms).min(max_ms);
        self.previous_ms = delay_ms;

        self.current_delay = Duration::from_millis(delay_ms);
        self.current_delay
    }

    /// Produce the next delay with jitter applied
    pub fn next_delay(&mut self) -> Duration {
        let mut rng = rand::thread_rng();
        self.next_delay_with(&mut rng)
    }

    /// Produce the next delay, drawing jitter from the given RNG
    pub fn next_delay_with<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Duration {
        let base = self.next_base_delay();
        apply_jitter(base, self.config.randomization_factor, rng)
    }

    /// Record a failed attempt and decide whether another one is allowed
    pub fn record_failure(&mut self) -> BackoffStep {
        self.attempts = self.attempts.saturating_add(1);
        if self.attempts < self.config.max_attempts {
            let delay = self.next_delay();
            debug!(attempt = self.attempts, delay_ms = delay.as_millis() as u64, "backoff advanced");
            BackoffStep::Retry { attempt: self.attempts, delay }
        } else {
            BackoffStep::Exhausted { attempts: self.attempts }
        }
    }

    /// Return to the initial delay and clear the failure count
    pub fn reset(&mut self) {
        self.previous_ms = 0;
        self.upcoming_ms = duration_millis(self.config.initial_delay);
        self.current_delay = self.config.initial_delay;
        self.attempts = 0;
    }

    /// Last unjittered delay produced (initial delay after a reset)
    pub fn current_delay(&self) -> Duration {
        self.current_delay
    }

    /// Consecutive failures recorded since the last reset
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Settings this generator runs with
    pub fn config(&self) -> &BackoffConfig {
        &self.config
    }
}

/// Multiply `delay` by a factor drawn uniformly from `[1 - factor, 1 + factor]`
pub fn apply_jitter<R: Rng + ?Sized>(delay: Duration, factor: f64, rng: &mut R) -> Duration {
    let factor = factor.clamp(0.0, 1.0);
    if factor == 0.0 || delay.is_zero() {
        return delay;
    }

    let multiplier = 1.0 + rng.gen_range(-factor..=factor);
    let millis = (delay.as_millis() as f64 * multiplier).round().max(0.0);
    Duration::from_millis(millis as u64)
}

fn duration_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
