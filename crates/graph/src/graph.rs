//! Resource dependency graph built on `petgraph`.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet, VecDeque};

use converge_core::{ResourceId, ResourceKind, ResourceSpec};
use petgraph::Direction;
use petgraph::graph::{DiGraph, EdgeIndex, NodeIndex};
use petgraph::visit::EdgeRef;
use serde::{Deserialize, Serialize};

use crate::error::GraphError;

/// One resource as recorded in the graph, with its dependencies in
/// declaration order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphEntry {
    /// The declared resource.
    pub spec: ResourceSpec,
    /// Resources this one depends on.
    pub dependencies: Vec<ResourceId>,
}

/// Directed acyclic graph of resources.
///
/// An edge `d → r` means `r` depends on `d`. Cycles are rejected when the
/// offending edge is added, so every `ResourceGraph` is a DAG and the
/// topological order always exists.
#[derive(Debug, Clone, Default)]
pub struct ResourceGraph {
    graph: DiGraph<ResourceSpec, ()>,
    index_map: HashMap<ResourceId, NodeIndex>,
}

impl ResourceGraph {
    /// Create an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a resource with no extra configuration.
    pub fn add_resource(
        &mut self,
        id: impl Into<ResourceId>,
        kind: impl Into<ResourceKind>,
    ) -> Result<(), GraphError> {
        self.add_spec(ResourceSpec::new(id, kind))
    }

    /// Add a fully specified resource.
    pub fn add_spec(&mut self, spec: ResourceSpec) -> Result<(), GraphError> {
        if self.index_map.contains_key(&spec.id) {
            return Err(GraphError::DuplicateResource(spec.id));
        }
        let id = spec.id.clone();
        let idx = self.graph.add_node(spec);
        self.index_map.insert(id, idx);
        Ok(())
    }

    /// Declare that `id` depends on `depends_on`.
    ///
    /// Adding an edge that already exists is a no-op. Fails if either id is
    /// unknown, if they are equal, or if the edge would close a cycle; the
    /// graph is left unchanged on failure.
    pub fn add_dependency(
        &mut self,
        id: impl Into<ResourceId>,
        depends_on: impl Into<ResourceId>,
    ) -> Result<(), GraphError> {
        let id = id.into();
        let depends_on = depends_on.into();

        let dependent = self.index_of(&id)?;
        let dependency = self.index_of(&depends_on)?;
        if dependent == dependency {
            return Err(GraphError::SelfDependency(id));
        }
        if self.graph.find_edge(dependency, dependent).is_some() {
            return Ok(());
        }

        // The new edge closes a cycle iff `depends_on` is already downstream of `id`.
        let mut visited = HashSet::new();
        let mut path = Vec::new();
        if self.find_path(dependent, dependency, &mut visited, &mut path) {
            let mut cycle = vec![id];
            cycle.extend(path.iter().rev().map(|&idx| self.graph[idx].id.clone()));
            return Err(GraphError::Cycle { path: cycle });
        }

        self.graph.add_edge(dependency, dependent, ());
        Ok(())
    }

    /// DFS along dependent edges from `from`, leaving the route to `target`
    /// (both ends included) in `path` when found.
    fn find_path(
        &self,
        from: NodeIndex,
        target: NodeIndex,
        visited: &mut HashSet<NodeIndex>,
        path: &mut Vec<NodeIndex>,
    ) -> bool {
        visited.insert(from);
        path.push(from);
        if from == target {
            return true;
        }
        for next in self.graph.neighbors_directed(from, Direction::Outgoing) {
            if !visited.contains(&next) && self.find_path(next, target, visited, path) {
                return true;
            }
        }
        path.pop();
        false
    }

    /// Deterministic start order: every resource appears after all of its
    /// dependencies, and ties are broken by insertion order.
    #[must_use]
    pub fn topological_order(&self) -> Vec<ResourceId> {
        self.topological_indices()
            .into_iter()
            .map(|idx| self.graph[idx].id.clone())
            .collect()
    }

    /// Kahn's algorithm with a min-heap on the node index, which equals
    /// insertion order because nodes are never removed.
    fn topological_indices(&self) -> Vec<NodeIndex> {
        let mut in_degree: Vec<usize> = self
            .graph
            .node_indices()
            .map(|idx| {
                self.graph
                    .neighbors_directed(idx, Direction::Incoming)
                    .count()
            })
            .collect();

        let mut ready: BinaryHeap<Reverse<usize>> = in_degree
            .iter()
            .enumerate()
            .filter(|(_, deg)| **deg == 0)
            .map(|(i, _)| Reverse(i))
            .collect();

        let mut order = Vec::with_capacity(in_degree.len());
        while let Some(Reverse(i)) = ready.pop() {
            let idx = NodeIndex::new(i);
            order.push(idx);
            for next in self.graph.neighbors_directed(idx, Direction::Outgoing) {
                let deg = &mut in_degree[next.index()];
                *deg -= 1;
                if *deg == 0 {
                    ready.push(Reverse(next.index()));
                }
            }
        }
        order
    }

    /// Direct dependencies of `id`, in the order they were declared.
    #[must_use]
    pub fn dependencies_of(&self, id: &ResourceId) -> Vec<ResourceId> {
        self.edges_in_order(id, Direction::Incoming)
    }

    /// Direct dependents of `id`, in the order the edges were declared.
    #[must_use]
    pub fn dependents_of(&self, id: &ResourceId) -> Vec<ResourceId> {
        self.edges_in_order(id, Direction::Outgoing)
    }

    fn edges_in_order(&self, id: &ResourceId, dir: Direction) -> Vec<ResourceId> {
        let Some(&idx) = self.index_map.get(id) else {
            return Vec::new();
        };
        let mut edges: Vec<(EdgeIndex, NodeIndex)> = self
            .graph
            .edges_directed(idx, dir)
            .map(|e| {
                let other = if dir == Direction::Incoming {
                    e.source()
                } else {
                    e.target()
                };
                (e.id(), other)
            })
            .collect();
        edges.sort_by_key(|(edge, _)| *edge);
        edges
            .into_iter()
            .map(|(_, other)| self.graph[other].id.clone())
            .collect()
    }

    /// Every resource downstream of `id`, in topological order.
    #[must_use]
    pub fn transitive_dependents_of(&self, id: &ResourceId) -> Vec<ResourceId> {
        let Some(&start) = self.index_map.get(id) else {
            return Vec::new();
        };
        let mut seen = HashSet::new();
        let mut queue = VecDeque::from([start]);
        while let Some(idx) = queue.pop_front() {
            for next in self.graph.neighbors_directed(idx, Direction::Outgoing) {
                if seen.insert(next) {
                    queue.push_back(next);
                }
            }
        }
        self.topological_indices()
            .into_iter()
            .filter(|idx| seen.contains(idx))
            .map(|idx| self.graph[idx].id.clone())
            .collect()
    }

    /// The declared spec of `id`.
    #[must_use]
    pub fn spec(&self, id: &ResourceId) -> Option<&ResourceSpec> {
        self.index_map.get(id).map(|&idx| &self.graph[idx])
    }

    /// Returns `true` if `id` is in the graph.
    #[must_use]
    pub fn contains(&self, id: &ResourceId) -> bool {
        self.index_map.contains_key(id)
    }

    /// Describe every resource with its dependencies, in insertion order.
    #[must_use]
    pub fn entries(&self) -> Vec<GraphEntry> {
        self.graph
            .node_indices()
            .map(|idx| {
                let spec = self.graph[idx].clone();
                let dependencies = self.dependencies_of(&spec.id);
                GraphEntry { spec, dependencies }
            })
            .collect()
    }

    /// Number of resources.
    #[must_use]
    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    /// Returns `true` if the graph has no resources.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Number of dependency edges.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    fn index_of(&self, id: &ResourceId) -> Result<NodeIndex, GraphError> {
        self.index_map
            .get(id)
            .copied()
            .ok_or_else(|| GraphError::UnknownResource(id.clone()))
    }
}
