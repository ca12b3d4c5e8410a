//! Retry errors.

use thiserror::Error;

/// Why [`RetryPolicy::execute`](crate::RetryPolicy::execute) gave up.
#[derive(Debug, Error)]
pub enum RetryError<E> {
    /// The operation returned an error classified as fatal.
    #[error("{error}")]
    Fatal {
        /// The fatal error.
        error: E,
        /// Attempt that produced it (1-indexed).
        attempt: u32,
    },

    /// Every attempt failed with a retryable error.
    #[error("exceeded retries after {attempts} attempts: {last}")]
    Exhausted {
        /// Error from the final attempt.
        last: E,
        /// Number of attempts made.
        attempts: u32,
    },

    /// The cancellation token fired first.
    #[error("retry cancelled after {attempts} attempts")]
    Cancelled {
        /// Attempts started before cancellation.
        attempts: u32,
    },
}

impl<E> RetryError<E> {
    /// Number of attempts that were started.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Fatal { attempt, .. } => *attempt,
            Self::Exhausted { attempts, .. } | Self::Cancelled { attempts } => *attempts,
        }
    }

    /// Returns `true` for [`RetryError::Cancelled`].
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    /// The underlying operation error, if there was one.
    #[must_use]
    pub fn into_inner(self) -> Option<E> {
        match self {
            Self::Fatal { error, .. } => Some(error),
            Self::Exhausted { last, .. } => Some(last),
            Self::Cancelled { .. } => None,
        }
    }
}

/// An invalid [`RetryPolicy`](crate::RetryPolicy).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PolicyError {
    /// `max_attempts` is zero.
    #[error("max_attempts must be at least 1")]
    ZeroAttempts,

    /// Backoff parameters are inconsistent.
    #[error("invalid backoff: {0}")]
    InvalidBackoff(String),
}
