//! Retry policy and executor.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::backoff::{Backoff, JitterPolicy};
use crate::cancellation::sleep_or_cancel;
use crate::error::{PolicyError, RetryError};
use crate::retryable::{ErrorClass, Retryable};

/// Attempt budget and delay shape for one kind of operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts, the first one included.
    pub max_attempts: u32,
    /// Delay between attempts.
    pub backoff: Backoff,
    /// Randomisation applied to each delay.
    pub jitter: JitterPolicy,
}

impl Default for RetryPolicy {
    /// Five attempts, exponential backoff from one second doubling up to
    /// thirty seconds, no jitter.
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff: Backoff::Exponential {
                base: Duration::from_secs(1),
                multiplier: 2.0,
                max: Duration::from_secs(30),
            },
            jitter: JitterPolicy::None,
        }
    }
}

/// Handed to the `on_retry` callback of [`RetryPolicy::execute`] before each
/// backoff sleep.
#[derive(Debug)]
pub struct RetryNotice<'a, E> {
    /// Attempt that just failed (1-indexed).
    pub attempt: u32,
    /// The policy's attempt budget.
    pub max_attempts: u32,
    /// How long the executor will wait before the next attempt.
    pub delay: Duration,
    /// The retryable error.
    pub error: &'a E,
}

/// What a successful [`RetryPolicy::execute`] call cost.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetryStats {
    /// Attempts made, the successful one included.
    pub attempts: u32,
    /// Delays slept between attempts.
    pub delays: Vec<Duration>,
}

impl RetryStats {
    /// Sum of all delays.
    #[must_use]
    pub fn total_delay(&self) -> Duration {
        self.delays.iter().sum()
    }
}

impl RetryPolicy {
    /// `max_attempts` attempts with the same `delay` between each.
    #[must_use]
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            backoff: Backoff::Fixed { delay },
            jitter: JitterPolicy::None,
        }
    }

    /// `max_attempts` attempts with doubling delays from `base` up to `max`.
    #[must_use]
    pub fn exponential(max_attempts: u32, base: Duration, max: Duration) -> Self {
        Self {
            max_attempts,
            backoff: Backoff::Exponential {
                base,
                multiplier: 2.0,
                max,
            },
            jitter: JitterPolicy::None,
        }
    }

    /// A single attempt, never retried.
    #[must_use]
    pub fn no_retry() -> Self {
        Self::fixed(1, Duration::ZERO)
    }

    /// Set the jitter policy.
    pub fn with_jitter(mut self, jitter: JitterPolicy) -> Self {
        self.jitter = jitter;
        self
    }

    /// Check the policy for inconsistent parameters.
    pub fn validate(&self) -> Result<(), PolicyError> {
        if self.max_attempts == 0 {
            return Err(PolicyError::ZeroAttempts);
        }
        match &self.backoff {
            Backoff::Fixed { .. } => {}
            Backoff::Linear { base, max } => {
                if max < base {
                    return Err(PolicyError::InvalidBackoff(
                        "linear max must not be below base".into(),
                    ));
                }
            }
            Backoff::Exponential {
                base,
                multiplier,
                max,
            } => {
                if !multiplier.is_finite() || *multiplier < 1.0 {
                    return Err(PolicyError::InvalidBackoff(format!(
                        "exponential multiplier must be at least 1.0, got {multiplier}"
                    )));
                }
                if max < base {
                    return Err(PolicyError::InvalidBackoff(
                        "exponential max must not be below base".into(),
                    ));
                }
            }
        }
        Ok(())
    }

    /// Decide whether `error` deserves another attempt.
    pub fn classify<E: Retryable + ?Sized>(&self, error: &E) -> ErrorClass {
        if error.is_retryable() {
            ErrorClass::Retryable
        } else {
            ErrorClass::Fatal
        }
    }

    /// Delay to wait after failed attempt `attempt` (1-indexed), jitter
    /// included.
    #[must_use]
    pub fn next_delay(&self, attempt: u32) -> Duration {
        let base = self.backoff.delay(attempt.saturating_sub(1));
        self.jitter.apply(base)
    }

    /// Run `operation` until it succeeds, fails fatally, exhausts the
    /// attempt budget or `cancel` fires.
    ///
    /// `operation` receives the 1-indexed attempt number. `on_retry` runs
    /// after every retryable failure that will be retried, before the
    /// backoff sleep. Both the operation and the sleep race against
    /// `cancel`.
    pub async fn execute<T, E, F, Fut, R>(
        &self,
        cancel: &CancellationToken,
        mut operation: F,
        mut on_retry: R,
    ) -> Result<(T, RetryStats), RetryError<E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Retryable,
        R: FnMut(&RetryNotice<'_, E>),
    {
        let max_attempts = self.max_attempts.max(1);
        let mut stats = RetryStats::default();

        for attempt in 1..=max_attempts {
            if cancel.is_cancelled() {
                return Err(RetryError::Cancelled {
                    attempts: attempt - 1,
                });
            }

            debug!(
                attempt,
                max_attempts,
                backoff = self.backoff.name(),
                "starting attempt"
            );
            stats.attempts = attempt;

            let result = tokio::select! {
                result = operation(attempt) => result,
                () = cancel.cancelled() => {
                    debug!(attempt, "attempt cancelled");
                    return Err(RetryError::Cancelled { attempts: attempt });
                }
            };

            let error = match result {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(attempts = attempt, "succeeded after retry");
                    }
                    return Ok((value, stats));
                }
                Err(error) => error,
            };

            if self.classify(&error) == ErrorClass::Fatal {
                warn!(attempt, error = %error, "fatal error, not retrying");
                return Err(RetryError::Fatal { error, attempt });
            }

            if attempt == max_attempts {
                warn!(attempts = attempt, error = %error, "exceeded retries");
                return Err(RetryError::Exhausted {
                    last: error,
                    attempts: attempt,
                });
            }

            let delay = error
                .retry_after()
                .unwrap_or_else(|| self.next_delay(attempt));
            debug!(
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "retrying after delay"
            );
            on_retry(&RetryNotice {
                attempt,
                max_attempts,
                delay,
                error: &error,
            });
            stats.delays.push(delay);

            if sleep_or_cancel(cancel, delay).await.is_err() {
                debug!(attempt, "backoff cancelled");
                return Err(RetryError::Cancelled { attempts: attempt });
            }
        }

        // The loop returns on its last iteration.
        Err(RetryError::Cancelled {
            attempts: max_attempts,
        })
    }
}

impl<E: fmt::Display> fmt::Display for RetryNotice<'_, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "retrying after: {} (attempt {}/{})",
            self.error, self.attempt, self.max_attempts
        )
    }
}
