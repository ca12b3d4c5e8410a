//! Driving a resource graph to `Running`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use converge_core::{
    HealthStatus, LifecycleState, ProbeResult, ResourceId, ResourceKind, ResourceSnapshot,
    ResourceSpec, StateTransitionEvent,
};
use converge_eventbus::Subscription;
use converge_graph::ResourceGraph;
use converge_resilience::RetryPolicy;
use serde::Serialize;
use tokio::task::{self, JoinSet};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, instrument, warn};

use crate::bus::NotificationBus;
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::gate::{GateOutcome, HealthGate};
use crate::health::{HealthCheckRegistry, HealthProbe};
use crate::provisioner::{ProvisionError, ProvisionOperation, Provisioner};
use crate::state::StateMachine;

/// Reason recorded for a resource whose task panicked.
pub const PANIC_REASON: &str = "provisioning task panicked";

/// Owns a resource graph, its operations and probes, and runs them.
///
/// Each [`start`](Self::start) builds a fresh state machine and health check
/// registry; only the notification bus outlives a run, so observers can
/// subscribe before the first event.
pub struct Orchestrator {
    graph: Arc<ResourceGraph>,
    config: EngineConfig,
    operations: HashMap<ResourceId, Arc<dyn ProvisionOperation>>,
    kind_operations: HashMap<ResourceKind, Arc<dyn ProvisionOperation>>,
    probes: HashMap<ResourceId, Arc<dyn HealthProbe>>,
    bus: Arc<NotificationBus>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("resources", &self.graph.len())
            .field("operations", &self.operations.len())
            .field("kind_operations", &self.kind_operations.len())
            .field("probes", &self.probes.len())
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    /// Create an orchestrator for `graph`.
    pub fn new(graph: ResourceGraph, config: EngineConfig) -> Result<Self, EngineError> {
        config.validate()?;
        let bus = Arc::new(NotificationBus::new(
            config.event_buffer,
            config.history_limit,
        ));
        Ok(Self {
            graph: Arc::new(graph),
            config,
            operations: HashMap::new(),
            kind_operations: HashMap::new(),
            probes: HashMap::new(),
            bus,
        })
    }

    /// Provision `id` with `operation`.
    #[must_use]
    pub fn with_operation(
        mut self,
        id: impl Into<ResourceId>,
        operation: Arc<dyn ProvisionOperation>,
    ) -> Self {
        self.operations.insert(id.into(), operation);
        self
    }

    /// Provision every resource of `kind` without its own operation with
    /// `operation`.
    #[must_use]
    pub fn with_kind_operation(
        mut self,
        kind: impl Into<ResourceKind>,
        operation: Arc<dyn ProvisionOperation>,
    ) -> Self {
        self.kind_operations.insert(kind.into(), operation);
        self
    }

    /// Probe `id` once it is provisioned.
    #[must_use]
    pub fn with_probe(mut self, id: impl Into<ResourceId>, probe: Arc<dyn HealthProbe>) -> Self {
        self.probes.insert(id.into(), probe);
        self
    }

    /// The graph being run.
    #[must_use]
    pub fn graph(&self) -> &ResourceGraph {
        &self.graph
    }

    /// The active configuration.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The bus every run publishes on.
    #[must_use]
    pub fn bus(&self) -> &Arc<NotificationBus> {
        &self.bus
    }

    /// Subscribe to the transitions matching `predicate`.
    #[must_use]
    pub fn subscribe<F>(&self, predicate: F) -> Subscription<StateTransitionEvent>
    where
        F: Fn(&StateTransitionEvent) -> bool + Send + Sync + 'static,
    {
        self.bus.subscribe_filtered(predicate)
    }

    fn operation_for(&self, spec: &ResourceSpec) -> Option<Arc<dyn ProvisionOperation>> {
        self.operations
            .get(&spec.id)
            .or_else(|| self.kind_operations.get(&spec.kind))
            .cloned()
    }

    /// Spawn one task per resource, in topological order.
    ///
    /// Must be called within a Tokio runtime. Cancelling `cancel` stops every
    /// task at its last stable state.
    pub fn start(&self, cancel: &CancellationToken) -> RunHandle {
        let cancel = cancel.child_token();
        let states = Arc::new(StateMachine::new(&self.graph, Arc::clone(&self.bus)));
        let registry = Arc::new(HealthCheckRegistry::new(
            Arc::clone(&states),
            self.config.health_ttl,
            self.config.probe_timeout,
        ));
        for (id, probe) in &self.probes {
            if let Err(error) = registry.register(id.clone(), Arc::clone(probe)) {
                warn!(resource = %id, %error, "ignoring probe");
            }
        }

        let gate = HealthGate::new(
            Arc::clone(&registry),
            Arc::clone(&states),
            self.config.poll_interval,
        );
        let provisioner = Provisioner::new(Arc::clone(&states));
        let monitors = TaskTracker::new();
        let mut tasks = JoinSet::new();
        let mut task_ids = HashMap::new();

        info!(resources = states.resources().len(), "starting run");
        for id in states.resources() {
            let Some(spec) = self.graph.spec(id) else {
                continue;
            };
            let resource = ResourceTask {
                spec: spec.clone(),
                dependencies: self.graph.dependencies_of(id),
                operation: self.operation_for(spec),
                policy: self.config.retry_for(&spec.kind).clone(),
                dependency_timeout: self.config.dependency_timeout,
                monitor_interval: self.config.monitor_interval,
                states: Arc::clone(&states),
                registry: Arc::clone(&registry),
                gate: gate.clone(),
                provisioner: provisioner.clone(),
                monitors: monitors.clone(),
                cancel: cancel.child_token(),
            };
            let handle = tasks.spawn(resource.run());
            task_ids.insert(handle.id(), id.clone());
        }

        RunHandle {
            states,
            registry,
            tasks,
            task_ids,
            monitors,
            cancel,
            accept_unhealthy: self.config.accept_unhealthy,
        }
    }

    /// Run every resource until it settles, then stop the health monitors.
    pub async fn run(&self, cancel: &CancellationToken) -> RunSummary {
        let mut handle = self.start(cancel);
        let summary = handle.wait().await;
        handle.shutdown().await;
        summary
    }
}

/// Everything one resource's task needs. Each task is the single writer of
/// its resource's record.
struct ResourceTask {
    spec: ResourceSpec,
    dependencies: Vec<ResourceId>,
    operation: Option<Arc<dyn ProvisionOperation>>,
    policy: RetryPolicy,
    dependency_timeout: Duration,
    monitor_interval: Option<Duration>,
    states: Arc<StateMachine>,
    registry: Arc<HealthCheckRegistry>,
    gate: HealthGate,
    provisioner: Provisioner,
    monitors: TaskTracker,
    cancel: CancellationToken,
}

impl ResourceTask {
    #[instrument(
        name = "resource",
        skip(self),
        fields(resource = %self.spec.id, kind = %self.spec.kind)
    )]
    async fn run(self) {
        if let Err(error) = self.drive().await {
            error!(%error, "resource task failed");
        }
    }

    async fn drive(&self) -> Result<(), EngineError> {
        let id = &self.spec.id;
        self.states.transition(id, LifecycleState::Waiting, None)?;

        let outcome = self
            .gate
            .wait_until_healthy(id, &self.dependencies, self.dependency_timeout, &self.cancel)
            .await?;
        match outcome {
            GateOutcome::Healthy => {}
            GateOutcome::Cancelled => {
                debug!("cancelled while waiting for dependencies");
                return Ok(());
            }
            GateOutcome::TimedOut => {
                warn!(timeout = ?self.dependency_timeout, "dependencies not healthy in time");
                return self.fail("dependency timeout");
            }
            GateOutcome::DependencyFailed(dependency) => {
                warn!(%dependency, "dependency failed");
                return self.fail(format!("dependency failed: {dependency}"));
            }
        }
        if self.cancel.is_cancelled() {
            return Ok(());
        }

        self.states.transition(id, LifecycleState::Starting, None)?;
        let Some(operation) = &self.operation else {
            error!("no provisioning operation registered");
            return self.fail(ProvisionError::NotConfigured.to_string());
        };

        let report = self
            .provisioner
            .provision(&self.spec, operation.as_ref(), &self.policy, &self.cancel)
            .await;
        match report.outcome {
            Ok(provisioned) => {
                self.states.transition(
                    id,
                    LifecycleState::Running,
                    Some(provisioned.reason().to_owned()),
                )?;
                info!(attempts = report.attempts.len(), outcome = provisioned.reason(), "running");
            }
            Err(ProvisionError::Cancelled { .. }) => return Ok(()),
            Err(error) => return self.fail(error.to_string()),
        }

        if let Some(interval) = self.monitor_interval
            && self.registry.has_probe(id)
        {
            self.monitors.spawn(monitor(
                id.clone(),
                Arc::clone(&self.states),
                Arc::clone(&self.registry),
                interval,
                self.cancel.clone(),
            ));
        }
        Ok(())
    }

    fn fail(&self, reason: impl Into<String>) -> Result<(), EngineError> {
        self.states.transition(
            &self.spec.id,
            LifecycleState::FailedToStart,
            Some(reason.into()),
        )?;
        Ok(())
    }
}

/// Re-probe a running resource every `interval` until cancelled or failed.
#[instrument(skip(states, registry, cancel))]
async fn monitor(
    id: ResourceId,
    states: Arc<StateMachine>,
    registry: Arc<HealthCheckRegistry>,
    interval: Duration,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(interval) => {}
        }

        let refreshed = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            refreshed = registry.refresh(&id) => refreshed,
        };
        let result = match refreshed {
            Ok(Some(result)) => result,
            Ok(None) => break,
            Err(error) => {
                warn!(%error, "health refresh failed");
                break;
            }
        };
        let Ok(current) = states.state(&id) else {
            break;
        };

        let next = match (&result, current) {
            (ProbeResult::Gone, LifecycleState::Running | LifecycleState::Unhealthy) => {
                Some((LifecycleState::FailedToStart, "resource vanished".to_owned()))
            }
            (ProbeResult::Unhealthy { reason }, LifecycleState::Running) => {
                Some((LifecycleState::Unhealthy, reason.clone()))
            }
            (ProbeResult::Healthy, LifecycleState::Unhealthy) => {
                Some((LifecycleState::Running, "recovered".to_owned()))
            }
            _ => None,
        };
        if let Some((to, reason)) = next {
            if let Err(error) = states.transition(&id, to, Some(reason)) {
                warn!(%error, "monitor transition rejected");
            }
            if to == LifecycleState::FailedToStart {
                break;
            }
        }
    }
    debug!("monitor stopped");
}

/// A run in progress.
#[derive(Debug)]
pub struct RunHandle {
    states: Arc<StateMachine>,
    registry: Arc<HealthCheckRegistry>,
    tasks: JoinSet<()>,
    task_ids: HashMap<task::Id, ResourceId>,
    monitors: TaskTracker,
    cancel: CancellationToken,
    accept_unhealthy: bool,
}

impl RunHandle {
    /// Current health of `id` as seen by dependents.
    pub async fn check(&self, id: &ResourceId) -> Result<HealthStatus, EngineError> {
        self.registry.check(id).await
    }

    /// Point-in-time view of `id`.
    pub fn snapshot(&self, id: &ResourceId) -> Result<ResourceSnapshot, EngineError> {
        self.states.snapshot(id)
    }

    /// The run's state machine.
    #[must_use]
    pub fn state_machine(&self) -> &Arc<StateMachine> {
        &self.states
    }

    /// The run's health check registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<HealthCheckRegistry> {
        &self.registry
    }

    /// Cancel every task of this run.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait for every resource task to finish and summarise the run.
    ///
    /// Health monitors keep running; stop them with [`shutdown`](Self::shutdown).
    pub async fn wait(&mut self) -> RunSummary {
        while let Some(joined) = self.tasks.join_next_with_id().await {
            let Err(join_error) = joined else {
                continue;
            };
            let resource = self.task_ids.get(&join_error.id()).cloned();
            if join_error.is_panic() {
                error!(resource = ?resource, error = %join_error, "resource task panicked");
                if let Some(resource) = resource
                    && let Err(error) = self.states.transition(
                        &resource,
                        LifecycleState::FailedToStart,
                        Some(PANIC_REASON.to_owned()),
                    )
                {
                    warn!(%resource, %error, "could not mark panicked resource");
                }
            } else {
                debug!(resource = ?resource, "resource task aborted");
            }
        }

        let summary = RunSummary {
            resources: self.states.snapshots(),
            cancelled: self.cancel.is_cancelled(),
            accept_unhealthy: self.accept_unhealthy,
        };
        info!(
            success = summary.is_success(),
            failed = summary.failed().count(),
            cancelled = summary.cancelled,
            "run settled"
        );
        summary
    }

    /// Cancel the run and wait for all tasks, monitors included, to stop.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        while self.tasks.join_next().await.is_some() {}
        self.monitors.close();
        self.monitors.wait().await;
    }
}

/// Final view of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    /// Every resource in topological order.
    pub resources: Vec<ResourceSnapshot>,
    /// Whether the run was cancelled before settling.
    pub cancelled: bool,
    #[serde(skip)]
    accept_unhealthy: bool,
}

impl RunSummary {
    /// `true` if every resource is `Running`, or `Unhealthy` when the
    /// configuration accepts it.
    #[must_use]
    pub fn is_success(&self) -> bool {
        !self.cancelled
            && self.resources.iter().all(|r| match r.state {
                LifecycleState::Running => true,
                LifecycleState::Unhealthy => self.accept_unhealthy,
                _ => false,
            })
    }

    /// Resources that ended in `FailedToStart`.
    pub fn failed(&self) -> impl Iterator<Item = &ResourceSnapshot> {
        self.resources
            .iter()
            .filter(|r| r.state == LifecycleState::FailedToStart)
    }

    /// The snapshot of `id`.
    #[must_use]
    pub fn resource(&self, id: &str) -> Option<&ResourceSnapshot> {
        self.resources.iter().find(|r| r.id.as_str() == id)
    }
}
