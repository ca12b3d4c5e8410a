//! Notification bus for state transition events.

use std::collections::HashSet;

use converge_core::{ResourceId, StateTransitionEvent};
use converge_eventbus::{EventBus, Subscription};

/// Publish/subscribe stream of [`StateTransitionEvent`]s.
///
/// Backpressure is drop-oldest: a subscriber more than `capacity` events
/// behind loses the oldest ones and sees the count in
/// [`Subscription::lagged`]. Publishing never blocks. Events of one resource
/// reach every subscriber in publish order because the state machine
/// publishes while holding that resource's lock.
#[derive(Debug)]
pub struct NotificationBus {
    inner: EventBus<StateTransitionEvent>,
}

impl NotificationBus {
    /// Create a bus with a per-subscriber buffer of `capacity` events and a
    /// history of at most `history_limit` events (0 disables it).
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    #[must_use]
    pub fn new(capacity: usize, history_limit: usize) -> Self {
        Self {
            inner: EventBus::with_history(capacity, Some(history_limit)),
        }
    }

    /// Publish an event.
    pub fn publish(&self, event: StateTransitionEvent) {
        self.inner.emit(event);
    }

    /// Subscribe to every event.
    #[must_use]
    pub fn subscribe(&self) -> Subscription<StateTransitionEvent> {
        self.inner.subscribe()
    }

    /// Subscribe to the events matching `predicate`.
    #[must_use]
    pub fn subscribe_filtered<F>(&self, predicate: F) -> Subscription<StateTransitionEvent>
    where
        F: Fn(&StateTransitionEvent) -> bool + Send + Sync + 'static,
    {
        self.inner.subscribe_filtered(predicate)
    }

    /// Subscribe to the events of the given resources.
    #[must_use]
    pub fn subscribe_to<'a, I>(&self, ids: I) -> Subscription<StateTransitionEvent>
    where
        I: IntoIterator<Item = &'a ResourceId>,
    {
        let ids: HashSet<ResourceId> = ids.into_iter().cloned().collect();
        self.inner
            .subscribe_filtered(move |e: &StateTransitionEvent| ids.contains(&e.resource_id))
    }

    /// Every recorded event, oldest first.
    #[must_use]
    pub fn history(&self) -> Vec<StateTransitionEvent> {
        self.inner.history()
    }

    /// Recorded events of one resource, oldest first.
    #[must_use]
    pub fn history_for(&self, id: &ResourceId) -> Vec<StateTransitionEvent> {
        self.inner.history_for(|e| &e.resource_id == id)
    }

    /// Total events published.
    #[must_use]
    pub fn total_published(&self) -> u64 {
        self.inner.total_emitted()
    }
}

impl Default for NotificationBus {
    fn default() -> Self {
        Self::new(1024, 10_000)
    }
}
