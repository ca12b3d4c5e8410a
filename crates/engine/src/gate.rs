//! Waiting for dependencies to become healthy.

use std::sync::Arc;
use std::time::Duration;

use converge_core::{HealthStatus, LifecycleState, ResourceId};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use crate::error::EngineError;
use crate::health::HealthCheckRegistry;
use crate::state::StateMachine;

/// How a wait on dependencies ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateOutcome {
    /// Every dependency reported `Healthy`.
    Healthy,
    /// The wait budget ran out first.
    TimedOut,
    /// The run was cancelled.
    Cancelled,
    /// A dependency reached `FailedToStart` and will never become healthy.
    DependencyFailed(ResourceId),
}

/// Blocks a resource until all of its dependencies are healthy.
#[derive(Debug, Clone)]
pub struct HealthGate {
    registry: Arc<HealthCheckRegistry>,
    states: Arc<StateMachine>,
    poll_interval: Duration,
}

impl HealthGate {
    /// Create a gate re-checking at least every `poll_interval`.
    #[must_use]
    pub fn new(
        registry: Arc<HealthCheckRegistry>,
        states: Arc<StateMachine>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            registry,
            states,
            poll_interval,
        }
    }

    /// Wait until every id in `deps` is healthy.
    ///
    /// Re-checks whenever a dependency publishes an event, and otherwise every
    /// poll interval.
    #[instrument(skip(self, deps, cancel), fields(deps = deps.len()))]
    pub async fn wait_until_healthy(
        &self,
        id: &ResourceId,
        deps: &[ResourceId],
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<GateOutcome, EngineError> {
        if deps.is_empty() {
            return Ok(GateOutcome::Healthy);
        }

        // Subscribe before the first check so no transition slips between them.
        let mut events = self.states.bus().subscribe_to(deps);
        let deadline = Instant::now() + timeout;
        let mut checks = 0u32;

        loop {
            checks += 1;
            // Probes may hang up to their own timeout; cancellation and the
            // deadline still win.
            let settled = tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    debug!(checks, "gate cancelled");
                    return Ok(GateOutcome::Cancelled);
                }
                settled = self.evaluate(deps) => settled?,
                () = tokio::time::sleep_until(deadline) => {
                    debug!(checks, "gate timed out while checking");
                    return Ok(GateOutcome::TimedOut);
                }
            };
            if let Some(outcome) = settled {
                debug!(checks, ?outcome, "gate settled");
                return Ok(outcome);
            }

            tokio::select! {
                () = cancel.cancelled() => {
                    debug!(checks, "gate cancelled");
                    return Ok(GateOutcome::Cancelled);
                }
                () = tokio::time::sleep_until(deadline) => {
                    debug!(checks, "gate timed out");
                    return Ok(GateOutcome::TimedOut);
                }
                Some(event) = events.recv() => {
                    debug!(dependency = %event.resource_id, to = %event.to, "dependency changed");
                }
                () = tokio::time::sleep(self.poll_interval) => {}
            }
        }
    }

    /// `Some` once the gate can stop waiting.
    async fn evaluate(&self, deps: &[ResourceId]) -> Result<Option<GateOutcome>, EngineError> {
        let mut all_healthy = true;
        for dep in deps {
            if self.states.state(dep)? == LifecycleState::FailedToStart {
                return Ok(Some(GateOutcome::DependencyFailed(dep.clone())));
            }
            if self.registry.check(dep).await? != HealthStatus::Healthy {
                all_healthy = false;
            }
        }
        Ok(all_healthy.then_some(GateOutcome::Healthy))
    }
}
