//! Delay shapes between attempts.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// How long to wait before the next attempt.
///
/// `retry` passed to [`Backoff::delay`] is 0 for the wait after the first
/// failure, 1 after the second, and so on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Backoff {
    /// The same delay every time.
    Fixed {
        /// Delay between attempts.
        #[serde(with = "humantime_serde")]
        delay: Duration,
    },
    /// `base * (retry + 1)`, capped at `max`.
    Linear {
        /// Increment per retry.
        #[serde(with = "humantime_serde")]
        base: Duration,
        /// Upper bound.
        #[serde(with = "humantime_serde")]
        max: Duration,
    },
    /// `base * multiplier^retry`, capped at `max`.
    Exponential {
        /// First delay.
        #[serde(with = "humantime_serde")]
        base: Duration,
        /// Growth factor, at least 1.0.
        #[serde(default = "default_multiplier")]
        multiplier: f64,
        /// Upper bound.
        #[serde(with = "humantime_serde")]
        max: Duration,
    },
}

fn default_multiplier() -> f64 {
    2.0
}

impl Backoff {
    /// Delay before retry number `retry` (0-indexed).
    #[must_use]
    pub fn delay(&self, retry: u32) -> Duration {
        match self {
            Self::Fixed { delay } => *delay,
            Self::Linear { base, max } => base.saturating_mul(retry.saturating_add(1)).min(*max),
            Self::Exponential {
                base,
                multiplier,
                max,
            } => {
                let factor = multiplier.powi(i32::try_from(retry).unwrap_or(i32::MAX));
                let secs = base.as_secs_f64() * factor;
                if !secs.is_finite() || secs >= max.as_secs_f64() {
                    *max
                } else {
                    Duration::try_from_secs_f64(secs).unwrap_or(Duration::ZERO)
                }
            }
        }
    }

    /// Largest delay this shape can produce.
    #[must_use]
    pub fn max_delay(&self) -> Duration {
        match self {
            Self::Fixed { delay } => *delay,
            Self::Linear { max, .. } | Self::Exponential { max, .. } => *max,
        }
    }

    /// Short name for logs.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Fixed { .. } => "fixed",
            Self::Linear { .. } => "linear",
            Self::Exponential { .. } => "exponential",
        }
    }
}

/// Randomisation applied on top of the computed delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JitterPolicy {
    /// Use the computed delay exactly.
    #[default]
    None,
    /// Uniform in `[0, delay]`.
    Full,
    /// `delay/2` plus uniform in `[0, delay/2]`.
    Equal,
}

impl JitterPolicy {
    /// Apply jitter to `delay`.
    #[must_use]
    pub fn apply(self, delay: Duration) -> Duration {
        let millis = delay.as_millis() as u64;
        match self {
            Self::None => delay,
            Self::Full => {
                if millis == 0 {
                    return delay;
                }
                Duration::from_millis(fastrand::u64(0..=millis))
            }
            Self::Equal => {
                let half = millis / 2;
                let jitter = if half > 0 { fastrand::u64(0..=half) } else { 0 };
                Duration::from_millis(half + jitter)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    #[rstest]
    #[case(0, secs(30))]
    #[case(1, secs(30))]
    #[case(10, secs(30))]
    fn fixed_is_constant(#[case] retry: u32, #[case] expected: Duration) {
        let b = Backoff::Fixed { delay: secs(30) };
        assert_eq!(b.delay(retry), expected);
    }

    #[rstest]
    #[case(0, secs(1))]
    #[case(1, secs(2))]
    #[case(2, secs(3))]
    #[case(9, secs(5))]
    fn linear_grows_and_caps(#[case] retry: u32, #[case] expected: Duration) {
        let b = Backoff::Linear {
            base: secs(1),
            max: secs(5),
        };
        assert_eq!(b.delay(retry), expected);
    }

    #[rstest]
    #[case(0, secs(1))]
    #[case(1, secs(2))]
    #[case(2, secs(4))]
    #[case(4, secs(16))]
    #[case(5, secs(30))]
    #[case(u32::MAX, secs(30))]
    fn exponential_grows_and_caps(#[case] retry: u32, #[case] expected: Duration) {
        let b = Backoff::Exponential {
            base: secs(1),
            multiplier: 2.0,
            max: secs(30),
        };
        assert_eq!(b.delay(retry), expected);
    }

    #[rstest]
    #[case(0)]
    #[case(1)]
    #[case(2)]
    #[case(3)]
    fn negative_multiplier_never_goes_below_zero(#[case] retry: u32) {
        let b = Backoff::Exponential {
            base: secs(1),
            multiplier: -2.0,
            max: secs(30),
        };
        assert!(b.delay(retry) <= secs(30));
        if retry % 2 == 1 {
            assert_eq!(b.delay(retry), Duration::ZERO);
        }
    }

    #[test]
    fn jitter_stays_in_bounds() {
        let delay = Duration::from_millis(1_000);
        for _ in 0..100 {
            assert!(JitterPolicy::Full.apply(delay) <= delay);
            let equal = JitterPolicy::Equal.apply(delay);
            assert!(equal >= Duration::from_millis(500) && equal <= delay);
        }
        assert_eq!(JitterPolicy::None.apply(delay), delay);
        assert_eq!(JitterPolicy::Full.apply(Duration::ZERO), Duration::ZERO);
    }

    #[test]
    fn deserializes_humantime() {
        let b: Backoff = serde_json::from_str(r#"{"type": "fixed", "delay": "30s"}"#).unwrap();
        assert_eq!(b, Backoff::Fixed { delay: secs(30) });

        let b: Backoff =
            serde_json::from_str(r#"{"type": "exponential", "base": "500ms", "max": "1m"}"#)
                .unwrap();
        assert_eq!(
            b,
            Backoff::Exponential {
                base: Duration::from_millis(500),
                multiplier: 2.0,
                max: secs(60),
            }
        );
    }
}
