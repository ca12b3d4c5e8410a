//! Cancellable waiting.

use std::time::Duration;

use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// The cancellation token fired before the wait completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("cancelled")]
pub struct Cancelled;

/// Sleep for `delay` unless `cancel` fires first.
pub async fn sleep_or_cancel(cancel: &CancellationToken, delay: Duration) -> Result<(), Cancelled> {
    tokio::select! {
        () = tokio::time::sleep(delay) => Ok(()),
        () = cancel.cancelled() => Err(Cancelled),
    }
}
