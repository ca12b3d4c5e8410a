#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Converge Engine
//!
//! Runs a [`ResourceGraph`](converge_graph::ResourceGraph) to completion.
//!
//! One task per resource walks the lifecycle
//! `NotStarted → Waiting → Starting → Running`:
//!
//! 1. [`HealthGate`] blocks the task until every dependency is `Healthy`
//!    according to the [`HealthCheckRegistry`].
//! 2. [`Provisioner`] invokes the resource's [`ProvisionOperation`] under the
//!    kind's retry policy, treating "already exists" as success.
//! 3. Every transition goes through the [`StateMachine`] and is published on
//!    the [`NotificationBus`].
//!
//! A failed resource takes down only its dependents. [`Orchestrator::run`]
//! always completes and returns a [`RunSummary`].

pub mod bus;
pub mod config;
pub mod error;
pub mod gate;
pub mod health;
pub mod orchestrator;
pub mod provisioner;
pub mod state;

pub use bus::NotificationBus;
pub use config::{ConfigError, EngineConfig};
pub use error::EngineError;
pub use gate::{GateOutcome, HealthGate};
pub use health::{HealthCheckRegistry, HealthProbe, probe_fn};
pub use orchestrator::{Orchestrator, RunHandle, RunSummary};
pub use provisioner::{
    Noop, OperationError, ProgressReporter, ProvisionError, ProvisionOperation, ProvisionReport,
    ProvisionRequest, Provisioned, Provisioner,
};
pub use state::StateMachine;
