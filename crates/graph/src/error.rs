//! Graph construction errors.

use converge_core::ResourceId;
use thiserror::Error;

/// Errors raised while composing a [`ResourceGraph`](crate::ResourceGraph).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    /// A resource with this id is already in the graph.
    #[error("duplicate resource id: {0}")]
    DuplicateResource(ResourceId),

    /// An edge references a resource that was never added.
    #[error("unknown resource: {0}")]
    UnknownResource(ResourceId),

    /// A resource was declared as depending on itself.
    #[error("resource cannot depend on itself: {0}")]
    SelfDependency(ResourceId),

    /// The edge would close a dependency cycle.
    ///
    /// `path` follows depends-on edges and starts and ends on the same id.
    #[error("dependency cycle detected: {}", render_path(.path))]
    Cycle {
        /// Resources along the cycle.
        path: Vec<ResourceId>,
    },
}

fn render_path(path: &[ResourceId]) -> String {
    path.iter()
        .map(ResourceId::as_str)
        .collect::<Vec<_>>()
        .join(" -> ")
}
