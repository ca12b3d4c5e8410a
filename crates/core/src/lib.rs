#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Converge Core
//!
//! Shared vocabulary for the Converge resource lifecycle orchestrator.
//!
//! This crate has no runtime behaviour of its own. It defines:
//!
//! - [`ResourceId`], [`ResourceKind`] and [`IdempotencyKey`]: string identifiers
//! - [`ResourceSpec`]: what a caller declares when composing a graph
//! - [`ResourceSnapshot`]: the observable record of a resource during a run
//! - [`LifecycleState`]: the six lifecycle states, validated by the [`transition`] module
//! - [`HealthStatus`] and [`ProbeResult`]: health as seen by gates and probes
//! - [`StateTransitionEvent`]: the immutable record published on every transition
//! - [`ProvisioningAttempt`]: one try at creating a remote object

pub mod attempt;
pub mod error;
pub mod event;
pub mod health;
pub mod id;
pub mod resource;
pub mod state;
pub mod transition;

pub use attempt::{AttemptOutcome, ProvisioningAttempt};
pub use error::InvalidTransition;
pub use event::StateTransitionEvent;
pub use health::{HealthStatus, ProbeResult};
pub use id::{IdempotencyKey, ResourceId, ResourceKind};
pub use resource::{ResourceSnapshot, ResourceSpec};
pub use state::LifecycleState;
