//! State transition events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::ResourceId;
use crate::state::LifecycleState;

/// An immutable record of a resource moving between lifecycle states.
///
/// Progress reports are published as events whose `from` and `to` are both
/// [`LifecycleState::Starting`] with an updated `reason`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateTransitionEvent {
    /// Resource that moved.
    pub resource_id: ResourceId,
    /// State before the transition.
    pub from: LifecycleState,
    /// State after the transition.
    pub to: LifecycleState,
    /// When the transition was applied.
    pub timestamp: DateTime<Utc>,
    /// Human-readable explanation, if any.
    #[serde(default)]
    pub reason: Option<String>,
    /// Provisioning attempt in progress when the event was emitted (0 before
    /// the first attempt).
    pub attempt: u32,
    /// Per-resource sequence number, strictly increasing from 1.
    pub sequence: u64,
}

impl StateTransitionEvent {
    /// Returns `true` if the event reports progress without changing state.
    #[must_use]
    pub fn is_progress(&self) -> bool {
        self.from == self.to
    }

    /// Returns `true` if this event belongs to `id`.
    #[must_use]
    pub fn concerns(&self, id: &ResourceId) -> bool {
        &self.resource_id == id
    }
}
