//! Lifecycle transition table.

use crate::error::InvalidTransition;
use crate::id::ResourceId;
use crate::state::LifecycleState;

/// Returns `true` if a resource may move from `from` to `to`.
///
/// `Starting → Starting` is the retry self-loop. Any non-terminal state may
/// escape to `FailedToStart` so the orchestrator can abandon a resource.
#[must_use]
pub fn can_transition(from: LifecycleState, to: LifecycleState) -> bool {
    use LifecycleState::{FailedToStart, NotStarted, Running, Starting, Unhealthy, Waiting};

    matches!(
        (from, to),
        (NotStarted, Waiting)
            | (Waiting, Starting)
            | (Starting, Starting)
            | (Starting, Running)
            | (Running, Unhealthy)
            | (Unhealthy, Running)
            | (NotStarted | Waiting | Starting | Running | Unhealthy, FailedToStart)
    )
}

/// Validate a transition for `resource_id`, returning an error if it is not
/// in the table.
pub fn validate_transition(
    resource_id: &ResourceId,
    from: LifecycleState,
    to: LifecycleState,
) -> Result<(), InvalidTransition> {
    if can_transition(from, to) {
        Ok(())
    } else {
        Err(InvalidTransition {
            resource_id: resource_id.clone(),
            from,
            to,
        })
    }
}
