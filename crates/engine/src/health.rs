//! Health probes and the per-run health check registry.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use converge_core::{HealthStatus, LifecycleState, ProbeResult, ResourceId};
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::EngineError;
use crate::state::StateMachine;

/// Asks the remote system whether a provisioned resource is usable.
#[async_trait]
pub trait HealthProbe: Send + Sync {
    /// Probe `id` once.
    async fn probe(&self, id: &ResourceId) -> ProbeResult;
}

struct FnProbe<F>(F);

#[async_trait]
impl<F, Fut> HealthProbe for FnProbe<F>
where
    F: Fn(ResourceId) -> Fut + Send + Sync,
    Fut: Future<Output = ProbeResult> + Send,
{
    async fn probe(&self, id: &ResourceId) -> ProbeResult {
        (self.0)(id.clone()).await
    }
}

/// Wrap an async closure as a [`HealthProbe`].
pub fn probe_fn<F, Fut>(f: F) -> Arc<dyn HealthProbe>
where
    F: Fn(ResourceId) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ProbeResult> + Send + 'static,
{
    Arc::new(FnProbe(f))
}

struct HealthCheckEntry {
    probe: Arc<dyn HealthProbe>,
    cached: Mutex<Option<(ProbeResult, Instant)>>,
    // Serialises probes of one resource so concurrent checks share a result.
    refresh: tokio::sync::Mutex<()>,
}

impl HealthCheckEntry {
    fn fresh(&self, ttl: Duration) -> Option<ProbeResult> {
        self.cached
            .lock()
            .as_ref()
            .filter(|(_, at)| at.elapsed() < ttl)
            .map(|(result, _)| result.clone())
    }
}

/// Answers "is this resource healthy?" for one run.
///
/// The answer is derived from the resource's lifecycle state. Only
/// provisioned resources (`Running` or `Unhealthy`) consult their probe,
/// and a probe result is reused until `ttl` has elapsed.
pub struct HealthCheckRegistry {
    states: Arc<StateMachine>,
    entries: DashMap<ResourceId, Arc<HealthCheckEntry>>,
    ttl: Duration,
    probe_timeout: Duration,
}

impl std::fmt::Debug for HealthCheckRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthCheckRegistry")
            .field("probes", &self.entries.len())
            .field("ttl", &self.ttl)
            .field("probe_timeout", &self.probe_timeout)
            .finish_non_exhaustive()
    }
}

impl HealthCheckRegistry {
    /// Create an empty registry over `states`.
    #[must_use]
    pub fn new(states: Arc<StateMachine>, ttl: Duration, probe_timeout: Duration) -> Self {
        Self {
            states,
            entries: DashMap::new(),
            ttl,
            probe_timeout,
        }
    }

    /// Attach `probe` to `id`, replacing any previous probe and its cache.
    pub fn register(
        &self,
        id: ResourceId,
        probe: Arc<dyn HealthProbe>,
    ) -> Result<(), EngineError> {
        if !self.states.contains(&id) {
            return Err(EngineError::UnknownResource(id));
        }
        self.entries.insert(
            id,
            Arc::new(HealthCheckEntry {
                probe,
                cached: Mutex::new(None),
                refresh: tokio::sync::Mutex::new(()),
            }),
        );
        Ok(())
    }

    /// Returns `true` if a probe is registered for `id`.
    #[must_use]
    pub fn has_probe(&self, id: &ResourceId) -> bool {
        self.entries.contains_key(id)
    }

    fn entry(&self, id: &ResourceId) -> Option<Arc<HealthCheckEntry>> {
        self.entries.get(id).map(|e| Arc::clone(e.value()))
    }

    /// Current health of `id`.
    pub async fn check(&self, id: &ResourceId) -> Result<HealthStatus, EngineError> {
        let state = self.states.state(id)?;
        let status = match state {
            LifecycleState::NotStarted | LifecycleState::Waiting | LifecycleState::Starting => {
                HealthStatus::Unknown
            }
            LifecycleState::FailedToStart => HealthStatus::Unhealthy,
            LifecycleState::Running | LifecycleState::Unhealthy => match self.entry(id) {
                Some(entry) => self.cached_or_probe(id, &entry).await?.status(),
                None if state == LifecycleState::Running => HealthStatus::Healthy,
                None => HealthStatus::Unhealthy,
            },
        };
        Ok(status)
    }

    /// Probe `id` now, ignoring the cache. `None` if no probe is registered.
    pub async fn refresh(&self, id: &ResourceId) -> Result<Option<ProbeResult>, EngineError> {
        let Some(entry) = self.entry(id) else {
            return Ok(None);
        };
        let _guard = entry.refresh.lock().await;
        self.probe(id, &entry).await.map(Some)
    }

    /// The last probe result for `id`, without probing.
    #[must_use]
    pub fn cached(&self, id: &ResourceId) -> Option<ProbeResult> {
        self.entry(id)?
            .cached
            .lock()
            .as_ref()
            .map(|(result, _)| result.clone())
    }

    async fn cached_or_probe(
        &self,
        id: &ResourceId,
        entry: &HealthCheckEntry,
    ) -> Result<ProbeResult, EngineError> {
        if let Some(result) = entry.fresh(self.ttl) {
            return Ok(result);
        }
        let _guard = entry.refresh.lock().await;
        // Another checker may have probed while we waited for the lock.
        if let Some(result) = entry.fresh(self.ttl) {
            return Ok(result);
        }
        self.probe(id, entry).await
    }

    async fn probe(
        &self,
        id: &ResourceId,
        entry: &HealthCheckEntry,
    ) -> Result<ProbeResult, EngineError> {
        let result = match tokio::time::timeout(self.probe_timeout, entry.probe.probe(id)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(resource = %id, timeout = ?self.probe_timeout, "health probe timed out");
                ProbeResult::unhealthy("probe timed out")
            }
        };
        debug!(resource = %id, ?result, "health probe");
        *entry.cached.lock() = Some((result.clone(), Instant::now()));
        self.states.note_health(id, result.status())?;
        Ok(result)
    }
}
