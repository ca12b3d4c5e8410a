//! Engine error types.

use converge_core::{InvalidTransition, ResourceId};
use converge_graph::GraphError;
use thiserror::Error;

use crate::config::ConfigError;

/// Errors from the engine layer.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The resource id is not part of this run.
    #[error("unknown resource: {0}")]
    UnknownResource(ResourceId),

    /// A lifecycle transition was rejected.
    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),

    /// The resource graph could not be built.
    #[error("graph error: {0}")]
    Graph(#[from] GraphError),

    /// The engine configuration is invalid.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}
