//! Retry classification for domain errors.

use std::error::Error;
use std::time::Duration;

/// Verdict of [`RetryPolicy::classify`](crate::RetryPolicy::classify).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Worth another attempt.
    Retryable,
    /// Will not get better by retrying.
    Fatal,
}

/// Implemented by errors that know whether retrying can help.
///
/// ```
/// use converge_resilience::Retryable;
/// use std::time::Duration;
/// use thiserror::Error;
///
/// #[derive(Error, Debug)]
/// pub enum PullError {
///     #[error("registry timed out")]
///     Timeout,
///     #[error("model not found in registry")]
///     UnknownModel,
/// }
///
/// impl Retryable for PullError {
///     fn is_retryable(&self) -> bool {
///         matches!(self, Self::Timeout)
///     }
/// }
/// ```
pub trait Retryable: Error {
    /// Whether the failed call may succeed if repeated.
    ///
    /// Default: `true`
    fn is_retryable(&self) -> bool {
        true
    }

    /// A server-provided wait that overrides the policy's backoff.
    ///
    /// Default: `None`
    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

/// Transient socket conditions are retryable, everything else is fatal.
impl Retryable for std::io::Error {
    fn is_retryable(&self) -> bool {
        use std::io::ErrorKind::{
            ConnectionAborted, ConnectionRefused, ConnectionReset, Interrupted, TimedOut,
            WouldBlock,
        };
        matches!(
            self.kind(),
            Interrupted | WouldBlock | TimedOut | ConnectionReset | ConnectionAborted
                | ConnectionRefused
        )
    }
}
