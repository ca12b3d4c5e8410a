//! The broadcast bus.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::sync::broadcast;

use crate::subscription::{Filter, Subscription};

/// Default per-subscriber buffer size.
const DEFAULT_CAPACITY: usize = 1024;

/// Broadcast bus for events of type `E`.
///
/// Emission is fire-and-forget: with no subscribers the event is only
/// recorded in the history (when enabled).
pub struct EventBus<E> {
    sender: broadcast::Sender<E>,
    emitted: AtomicU64,
    history: Mutex<VecDeque<E>>,
    /// `None` keeps everything, `Some(0)` disables the history.
    history_limit: Option<usize>,
}

impl<E: Clone + Send + 'static> EventBus<E> {
    /// Create a bus with the given per-subscriber buffer and no history.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero (a `broadcast` channel requirement).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self::with_history(capacity, Some(0))
    }

    /// Create a bus that also records published events.
    ///
    /// `history_limit` of `None` keeps every event, `Some(n)` keeps the most
    /// recent `n`, and `Some(0)` keeps nothing.
    #[must_use]
    pub fn with_history(capacity: usize, history_limit: Option<usize>) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            emitted: AtomicU64::new(0),
            history: Mutex::new(VecDeque::new()),
            history_limit,
        }
    }

    /// Publish an event to every current subscriber.
    pub fn emit(&self, event: E) {
        self.emitted.fetch_add(1, Ordering::Relaxed);
        if self.history_limit == Some(0) {
            // No active receivers is not an error.
            let _ = self.sender.send(event);
            return;
        }

        // Holding the history lock across the send keeps the history in
        // broadcast order.
        let mut history = self.history.lock();
        if let Some(limit) = self.history_limit
            && history.len() == limit
        {
            history.pop_front();
        }
        history.push_back(event.clone());
        let _ = self.sender.send(event);
    }

    /// Subscribe to every event published from now on.
    #[must_use]
    pub fn subscribe(&self) -> Subscription<E> {
        Subscription::new(self.sender.subscribe(), None)
    }

    /// Subscribe to the events matching `predicate`.
    ///
    /// Filtering happens on the receiving side, so a selective subscriber
    /// still shares the buffer with the full stream and can lag.
    #[must_use]
    pub fn subscribe_filtered<F>(&self, predicate: F) -> Subscription<E>
    where
        F: Fn(&E) -> bool + Send + Sync + 'static,
    {
        let filter: Filter<E> = Arc::new(predicate);
        Subscription::new(self.sender.subscribe(), Some(filter))
    }

    /// Snapshot of the recorded history, oldest first.
    #[must_use]
    pub fn history(&self) -> Vec<E> {
        self.history.lock().iter().cloned().collect()
    }

    /// Recorded events matching `predicate`, oldest first.
    #[must_use]
    pub fn history_for<F>(&self, predicate: F) -> Vec<E>
    where
        F: Fn(&E) -> bool,
    {
        self.history
            .lock()
            .iter()
            .filter(|e| predicate(e))
            .cloned()
            .collect()
    }

    /// Total number of events emitted since creation.
    #[must_use]
    pub fn total_emitted(&self) -> u64 {
        self.emitted.load(Ordering::Relaxed)
    }

    /// Number of live subscriptions.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl<E: Clone + Send + 'static> Default for EventBus<E> {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl<E> fmt::Debug for EventBus<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.sender.receiver_count())
            .field("emitted", &self.emitted.load(Ordering::Relaxed))
            .field("history_limit", &self.history_limit)
            .finish_non_exhaustive()
    }
}
