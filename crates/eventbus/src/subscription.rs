//! Subscription handles.

use std::fmt;
use std::sync::Arc;

use futures_core::Stream;
use tokio::sync::broadcast;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;

pub(crate) type Filter<E> = Arc<dyn Fn(&E) -> bool + Send + Sync>;

/// A receiving handle created by [`EventBus::subscribe`](crate::EventBus::subscribe).
///
/// Dropping the subscription unsubscribes it.
pub struct Subscription<E> {
    receiver: broadcast::Receiver<E>,
    filter: Option<Filter<E>>,
    lagged: u64,
}

impl<E: Clone + Send + 'static> Subscription<E> {
    pub(crate) fn new(receiver: broadcast::Receiver<E>, filter: Option<Filter<E>>) -> Self {
        Self {
            receiver,
            filter,
            lagged: 0,
        }
    }

    /// Receive the next matching event.
    ///
    /// Returns `None` once the bus has been dropped and the buffer drained.
    /// Events lost to lag are counted and skipped.
    pub async fn recv(&mut self) -> Option<E> {
        loop {
            match self.receiver.recv().await {
                Ok(event) if self.matches(&event) => return Some(event),
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(n)) => self.record_lag(n),
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Receive the next matching event if one is already buffered.
    pub fn try_recv(&mut self) -> Option<E> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) if self.matches(&event) => return Some(event),
                Ok(_) => {}
                Err(broadcast::error::TryRecvError::Lagged(n)) => self.record_lag(n),
                Err(_) => return None,
            }
        }
    }

    /// Number of events this subscriber lost because it fell behind.
    #[must_use]
    pub fn lagged(&self) -> u64 {
        self.lagged
    }

    /// Convert into a `Stream` of matching events.
    ///
    /// Lag is still skipped and logged, but no longer counted.
    pub fn into_stream(self) -> impl Stream<Item = E> + Send + 'static {
        let filter = self.filter;
        BroadcastStream::new(self.receiver).filter_map(move |item| match item {
            Ok(event) if filter.as_ref().is_none_or(|f| f(&event)) => Some(event),
            Ok(_) => None,
            Err(BroadcastStreamRecvError::Lagged(n)) => {
                tracing::warn!(skipped = n, "event stream lagged behind bus");
                None
            }
        })
    }

    fn matches(&self, event: &E) -> bool {
        self.filter.as_ref().is_none_or(|f| f(event))
    }

    fn record_lag(&mut self, n: u64) {
        self.lagged += n;
        tracing::warn!(
            skipped = n,
            total = self.lagged,
            "subscriber lagged behind event bus"
        );
    }
}

impl<E> fmt::Debug for Subscription<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("filtered", &self.filter.is_some())
            .field("lagged", &self.lagged)
            .finish_non_exhaustive()
    }
}
