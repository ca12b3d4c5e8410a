#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Converge Resilience
//!
//! Bounded retry for side-effecting operations.
//!
//! - [`Backoff`]: fixed, linear or exponential delay shapes
//! - [`JitterPolicy`]: optional randomisation of each delay
//! - [`Retryable`]: how a domain error says whether it may be retried
//! - [`RetryPolicy`]: attempt budget plus backoff, with a cancellable
//!   [`execute`](RetryPolicy::execute) loop
//!
//! `max_attempts` counts every invocation including the first one, so a
//! policy with `max_attempts = 5` calls an always-failing operation exactly
//! five times and never sleeps after the last failure.

mod backoff;
mod cancellation;
mod error;
mod policy;
mod retryable;

pub use backoff::{Backoff, JitterPolicy};
pub use cancellation::{Cancelled, sleep_or_cancel};
pub use error::{PolicyError, RetryError};
pub use policy::{RetryNotice, RetryPolicy, RetryStats};
pub use retryable::{ErrorClass, Retryable};
