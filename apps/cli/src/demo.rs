//! Simulated topology for `converge demo`.
//!
//! A message broker with a topic and a subscription, and a model server with
//! one model to pull. Every remote call hits an in-memory store, so repeated
//! creates conflict exactly like a real API would.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use anyhow::{Context, bail};
use async_trait::async_trait;
use converge_core::{IdempotencyKey, ProbeResult, ResourceSpec};
use converge_engine::{
    EngineConfig, OperationError, Orchestrator, ProvisionOperation, ProvisionRequest, Provisioned,
    probe_fn,
};
use converge_graph::ResourceGraph;
use parking_lot::Mutex;
use tracing::debug;

use crate::cli::DemoArgs;

const CONTAINER_BOOT: Duration = Duration::from_millis(200);
const PULL_CHUNKS: u64 = 20;
const PULL_CHUNK_DELAY: Duration = Duration::from_millis(25);

/// Objects that exist on the simulated remote side.
#[derive(Debug, Clone, Default)]
pub struct Store {
    objects: Arc<Mutex<HashSet<IdempotencyKey>>>,
}

impl Store {
    fn contains(&self, key: &IdempotencyKey) -> bool {
        self.objects.lock().contains(key)
    }

    /// Returns `false` if the key was already present.
    fn insert(&self, key: IdempotencyKey) -> bool {
        self.objects.lock().insert(key)
    }
}

/// Starts a container, skipping ones already running.
struct Container {
    store: Store,
}

#[async_trait]
impl ProvisionOperation for Container {
    async fn invoke(&self, request: &ProvisionRequest) -> Result<Provisioned, OperationError> {
        request.progress.report("starting container");
        tokio::time::sleep(CONTAINER_BOOT).await;
        self.store.insert(request.key.clone());
        Ok(Provisioned::Created)
    }

    async fn exists(&self, request: &ProvisionRequest) -> Result<bool, OperationError> {
        Ok(self.store.contains(&request.key))
    }
}

/// Creates a topic or subscription; the API answers `Conflict` on repeats.
struct Entity {
    store: Store,
}

#[async_trait]
impl ProvisionOperation for Entity {
    async fn invoke(&self, request: &ProvisionRequest) -> Result<Provisioned, OperationError> {
        if self.store.insert(request.key.clone()) {
            Ok(Provisioned::Created)
        } else {
            Err(OperationError::Conflict(format!(
                "{} '{}'",
                request.spec.kind, request.key
            )))
        }
    }
}

/// Pulls a model in chunks, reporting download progress.
struct ModelPull {
    store: Store,
}

#[async_trait]
impl ProvisionOperation for ModelPull {
    async fn invoke(&self, request: &ProvisionRequest) -> Result<Provisioned, OperationError> {
        let source = request
            .spec
            .property("source")
            .ok_or_else(|| OperationError::Fatal("model has no source".to_owned()))?;
        let label = format!("pulling {source}");
        for chunk in 0..=PULL_CHUNKS {
            request.progress.report_fraction(&label, chunk, PULL_CHUNKS);
            if chunk < PULL_CHUNKS {
                tokio::time::sleep(PULL_CHUNK_DELAY).await;
            }
        }
        self.store.insert(request.key.clone());
        Ok(Provisioned::Created)
    }

    async fn exists(&self, request: &ProvisionRequest) -> Result<bool, OperationError> {
        Ok(self.store.contains(&request.key))
    }
}

/// Fails every call; selected with `--fail`.
struct Broken;

#[async_trait]
impl ProvisionOperation for Broken {
    async fn invoke(&self, request: &ProvisionRequest) -> Result<Provisioned, OperationError> {
        Err(OperationError::Fatal(format!(
            "simulated failure creating '{}'",
            request.spec.id
        )))
    }
}

/// broker ← topic ← subscription, ollama ← model.
pub fn topology() -> anyhow::Result<ResourceGraph> {
    let mut graph = ResourceGraph::new();
    graph.add_resource("broker", "container")?;
    graph.add_resource("topic", "topic")?;
    graph.add_resource("subscription", "subscription")?;
    graph.add_resource("ollama", "container")?;
    graph.add_spec(
        ResourceSpec::new("model", "model")
            .with_idempotency_key("llama3:8b")
            .with_property("source", "llama3:8b"),
    )?;
    graph.add_dependency("topic", "broker")?;
    graph.add_dependency("subscription", "topic")?;
    graph.add_dependency("model", "ollama")?;
    Ok(graph)
}

pub fn orchestrator(config: EngineConfig, args: &DemoArgs) -> anyhow::Result<Orchestrator> {
    let graph = topology().context("building demo topology")?;
    let store = Store::default();

    for id in &args.conflict {
        let Some(spec) = graph.spec(&id.as_str().into()) else {
            bail!("--conflict: unknown resource '{id}'");
        };
        debug!(resource = %id, key = %spec.idempotency_key(), "pre-creating");
        store.insert(spec.idempotency_key());
    }
    for id in &args.fail {
        if !graph.contains(&id.as_str().into()) {
            bail!("--fail: unknown resource '{id}'");
        }
    }

    // The broker answers its first probe as still booting.
    let probes = Arc::new(AtomicU32::new(0));
    let broker_probe = probe_fn(move |_| {
        let n = probes.fetch_add(1, Ordering::SeqCst);
        async move {
            if n == 0 {
                ProbeResult::unhealthy("broker booting")
            } else {
                ProbeResult::Healthy
            }
        }
    });

    let mut orchestrator = Orchestrator::new(graph, config)?
        .with_kind_operation(
            "container",
            Arc::new(Container {
                store: store.clone(),
            }),
        )
        .with_kind_operation(
            "topic",
            Arc::new(Entity {
                store: store.clone(),
            }),
        )
        .with_kind_operation(
            "subscription",
            Arc::new(Entity {
                store: store.clone(),
            }),
        )
        .with_kind_operation("model", Arc::new(ModelPull { store }))
        .with_probe("broker", broker_probe);
    for id in &args.fail {
        orchestrator = orchestrator.with_operation(id.as_str(), Arc::new(Broken));
    }
    Ok(orchestrator)
}
