//! Per-resource lifecycle records and validated transitions.

use std::sync::Arc;

use chrono::Utc;
use converge_core::transition::validate_transition;
use converge_core::{
    HealthStatus, IdempotencyKey, InvalidTransition, LifecycleState, ResourceId, ResourceKind,
    ResourceSnapshot, StateTransitionEvent,
};
use converge_graph::ResourceGraph;
use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::debug;

use crate::bus::NotificationBus;
use crate::error::EngineError;

#[derive(Debug)]
struct Record {
    kind: ResourceKind,
    idempotency_key: IdempotencyKey,
    dependencies: Vec<ResourceId>,
    state: LifecycleState,
    health: HealthStatus,
    last_error: Option<String>,
    attempts: u32,
    sequence: u64,
}

impl Record {
    fn snapshot(&self, id: &ResourceId) -> ResourceSnapshot {
        ResourceSnapshot {
            id: id.clone(),
            kind: self.kind.clone(),
            dependencies: self.dependencies.clone(),
            state: self.state,
            health: self.health,
            last_error: self.last_error.clone(),
            attempts: self.attempts,
            idempotency_key: self.idempotency_key.clone(),
        }
    }

    fn event(
        &mut self,
        id: &ResourceId,
        from: LifecycleState,
        reason: Option<String>,
    ) -> StateTransitionEvent {
        self.sequence += 1;
        StateTransitionEvent {
            resource_id: id.clone(),
            from,
            to: self.state,
            timestamp: Utc::now(),
            reason,
            attempt: self.attempts,
            sequence: self.sequence,
        }
    }
}

/// Health implied by entering `state`, before any probe has an opinion.
fn derived_health(state: LifecycleState, previous: HealthStatus) -> HealthStatus {
    match state {
        LifecycleState::Running => HealthStatus::Healthy,
        LifecycleState::Unhealthy | LifecycleState::FailedToStart => HealthStatus::Unhealthy,
        LifecycleState::Starting => previous,
        LifecycleState::NotStarted | LifecycleState::Waiting => HealthStatus::Unknown,
    }
}

/// Lifecycle state of every resource in one run.
///
/// Each record sits behind its own lock, so transitions on different
/// resources never contend. Events are published while the record is still
/// locked: the bus sees one resource's events in exactly the order they were
/// applied.
#[derive(Debug)]
pub struct StateMachine {
    records: DashMap<ResourceId, Mutex<Record>>,
    order: Vec<ResourceId>,
    bus: Arc<NotificationBus>,
}

impl StateMachine {
    /// One `NotStarted` record per resource of `graph`.
    #[must_use]
    pub fn new(graph: &ResourceGraph, bus: Arc<NotificationBus>) -> Self {
        let order = graph.topological_order();
        let records = DashMap::with_capacity(order.len());
        for id in &order {
            let Some(spec) = graph.spec(id) else { continue };
            records.insert(
                id.clone(),
                Mutex::new(Record {
                    kind: spec.kind.clone(),
                    idempotency_key: spec.idempotency_key(),
                    dependencies: graph.dependencies_of(id),
                    state: LifecycleState::NotStarted,
                    health: HealthStatus::Unknown,
                    last_error: None,
                    attempts: 0,
                    sequence: 0,
                }),
            );
        }
        Self {
            records,
            order,
            bus,
        }
    }

    fn with_record<T>(
        &self,
        id: &ResourceId,
        f: impl FnOnce(&mut Record) -> Result<T, EngineError>,
    ) -> Result<T, EngineError> {
        let entry = self
            .records
            .get(id)
            .ok_or_else(|| EngineError::UnknownResource(id.clone()))?;
        let mut record = entry.lock();
        f(&mut record)
    }

    /// Move `id` to `to`, publishing the resulting event.
    ///
    /// Entering `FailedToStart` stores `reason` as the last error; entering
    /// `Running` clears it.
    pub fn transition(
        &self,
        id: &ResourceId,
        to: LifecycleState,
        reason: Option<String>,
    ) -> Result<StateTransitionEvent, EngineError> {
        self.with_record(id, |record| {
            let from = record.state;
            validate_transition(id, from, to)?;

            record.state = to;
            record.health = derived_health(to, record.health);
            match to {
                LifecycleState::Running => record.last_error = None,
                LifecycleState::FailedToStart => {
                    if let Some(reason) = &reason {
                        record.last_error = Some(reason.clone());
                    }
                }
                _ => {}
            }

            let event = record.event(id, from, reason);
            debug!(
                resource = %id,
                %from,
                %to,
                reason = event.reason.as_deref().unwrap_or(""),
                sequence = event.sequence,
                "state transition"
            );
            self.bus.publish(event.clone());
            Ok(event)
        })
    }

    /// Publish a same-state `Starting` event carrying `reason`.
    pub fn report_progress(
        &self,
        id: &ResourceId,
        reason: impl Into<String>,
    ) -> Result<StateTransitionEvent, EngineError> {
        self.with_record(id, |record| {
            if record.state != LifecycleState::Starting {
                return Err(InvalidTransition {
                    resource_id: id.clone(),
                    from: record.state,
                    to: LifecycleState::Starting,
                }
                .into());
            }
            let event = record.event(id, LifecycleState::Starting, Some(reason.into()));
            self.bus.publish(event.clone());
            Ok(event)
        })
    }

    /// Count a new provisioning attempt and return its number.
    pub fn begin_attempt(&self, id: &ResourceId) -> Result<u32, EngineError> {
        self.with_record(id, |record| {
            record.attempts += 1;
            Ok(record.attempts)
        })
    }

    /// Remember `message` as the most recent error.
    pub fn record_error(
        &self,
        id: &ResourceId,
        message: impl Into<String>,
    ) -> Result<(), EngineError> {
        self.with_record(id, |record| {
            record.last_error = Some(message.into());
            Ok(())
        })
    }

    /// Store the latest health observation.
    pub fn note_health(&self, id: &ResourceId, health: HealthStatus) -> Result<(), EngineError> {
        self.with_record(id, |record| {
            record.health = health;
            Ok(())
        })
    }

    /// Current state of `id`.
    pub fn state(&self, id: &ResourceId) -> Result<LifecycleState, EngineError> {
        self.with_record(id, |record| Ok(record.state))
    }

    /// Attempts started for `id`.
    pub fn attempts(&self, id: &ResourceId) -> Result<u32, EngineError> {
        self.with_record(id, |record| Ok(record.attempts))
    }

    /// Point-in-time view of `id`.
    pub fn snapshot(&self, id: &ResourceId) -> Result<ResourceSnapshot, EngineError> {
        self.with_record(id, |record| Ok(record.snapshot(id)))
    }

    /// Views of every resource in topological order.
    #[must_use]
    pub fn snapshots(&self) -> Vec<ResourceSnapshot> {
        self.order
            .iter()
            .filter_map(|id| self.snapshot(id).ok())
            .collect()
    }

    /// Resource ids in topological order.
    #[must_use]
    pub fn resources(&self) -> &[ResourceId] {
        &self.order
    }

    /// Returns `true` if `id` belongs to this run.
    #[must_use]
    pub fn contains(&self, id: &ResourceId) -> bool {
        self.records.contains_key(id)
    }

    /// The bus transitions are published on.
    #[must_use]
    pub fn bus(&self) -> &Arc<NotificationBus> {
        &self.bus
    }
}
