#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Converge Graph
//!
//! The dependency graph of resources managed by one orchestrator run.
//!
//! - [`ResourceGraph`]: a `petgraph` wrapper that rejects cycles when an edge
//!   is added and yields a deterministic start order
//! - [`GraphEntry`]: a serializable description of one resource and its edges
//! - [`GraphError`]: construction failures

pub mod error;
pub mod graph;

pub use error::GraphError;
pub use graph::{GraphEntry, ResourceGraph};
