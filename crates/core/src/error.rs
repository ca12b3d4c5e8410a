//! Core error types.

use thiserror::Error;

use crate::id::ResourceId;
use crate::state::LifecycleState;

/// A lifecycle transition that is not in the transition table.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid transition for resource '{resource_id}': {from} -> {to}")]
pub struct InvalidTransition {
    /// The resource whose transition was rejected.
    pub resource_id: ResourceId,
    /// State the resource was in.
    pub from: LifecycleState,
    /// State that was requested.
    pub to: LifecycleState,
}
