//! Assertions for timing-sensitive tests

#![allow(clippy::missing_panics_doc)]

use std::time::Duration;

/// Assert that `actual` is a jittered version of `base` for the given factor
///
/// Accepts anything in `[base * (1 - factor), base * (1 + factor)]`, with one
/// millisecond of slack for rounding.
pub fn assert_jittered(actual: Duration, base: Duration, factor: f64) {
    let base_ms = base.as_millis() as f64;
    let min = (base_ms * (1.0 - factor)).floor() - 1.0;
    let max = (base_ms * (1.0 + factor)).ceil() + 1.0;
    let actual_ms = actual.as_millis() as f64;

    assert!(
        actual_ms >= min && actual_ms <= max,
        "Delay {:?} is not within jitter bounds of {:?} (factor {})",
        actual,
        base,
        factor
    );
}

#[cfg(test)]
mod tests {
    //! Unit tests for testing::assertions.
    use super::*;

    /// Validates `assert_jittered` bounds.
    ///
    /// Assertions:
    /// - Accepts both ends of the jitter window.
    #[test]
    fn test_assert_jittered_bounds() {
        let base = Duration::from_millis(2_000);
        assert_jittered(Duration::from_millis(1_200), base, 0.4);
        assert_jittered(Duration::from_millis(2_800), base, 0.4);
        assert_jittered(base, base, 0.0);
    }

    /// Validates `assert_jittered` rejects out-of-range delays.
    ///
    /// Assertions:
    /// - Panics for a delay beyond `base * (1 + factor)`.
    #[test]
    #[should_panic(expected = "jitter bounds")]
    fn test_assert_jittered_fails() {
        assert_jittered(Duration::from_millis(3_000), Duration::from_millis(2_000), 0.4);
    }
}
