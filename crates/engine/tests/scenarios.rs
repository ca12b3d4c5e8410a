//! End-to-end behaviour of a run: gating, idempotence and bounded retry.

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use common::{Flaky, Observe, Remote, counter, id, path_of, position};
use converge_core::{HealthStatus, LifecycleState, ProbeResult, ResourceSpec};
use converge_engine::{EngineConfig, Noop, OperationError, Orchestrator, probe_fn};
use converge_graph::ResourceGraph;
use converge_resilience::RetryPolicy;
use pretty_assertions::assert_eq;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

fn broker_topic() -> ResourceGraph {
    let mut graph = ResourceGraph::new();
    graph.add_resource("broker", "container").unwrap();
    graph.add_resource("topic", "topic").unwrap();
    graph.add_dependency("topic", "broker").unwrap();
    graph
}

fn fast_config() -> EngineConfig {
    EngineConfig {
        poll_interval: Duration::from_millis(10),
        health_ttl: Duration::ZERO,
        ..EngineConfig::default()
    }
}

#[tokio::test(start_paused = true)]
async fn topic_waits_for_unhealthy_broker() {
    let probes = counter();
    let seen = probes.clone();
    let broker_probe = probe_fn(move |_| {
        let n = seen.fetch_add(1, Ordering::SeqCst) + 1;
        async move {
            if n <= 3 {
                ProbeResult::unhealthy("broker booting")
            } else {
                ProbeResult::Healthy
            }
        }
    });

    let probes_at_create = Arc::new(AtomicU32::new(0));
    let probes_now = probes.clone();
    let recorded = probes_at_create.clone();
    let create_topic = Observe(move |_: &converge_engine::ProvisionRequest| {
        recorded.store(probes_now.load(Ordering::SeqCst), Ordering::SeqCst);
    });

    let orchestrator = Orchestrator::new(broker_topic(), fast_config())
        .unwrap()
        .with_operation("broker", Arc::new(Noop))
        .with_operation("topic", Arc::new(create_topic))
        .with_probe("broker", broker_probe);

    let summary = orchestrator.run(&CancellationToken::new()).await;

    assert!(summary.is_success());
    assert!(probes_at_create.load(Ordering::SeqCst) >= 4);
    let history = orchestrator.bus().history();
    assert_eq!(
        path_of(&history, "topic"),
        vec![
            LifecycleState::Waiting,
            LifecycleState::Starting,
            LifecycleState::Running
        ]
    );
    assert!(
        position(&history, "broker", LifecycleState::Running)
            < position(&history, "topic", LifecycleState::Starting)
    );
}

#[tokio::test]
async fn conflict_on_first_call_is_running() {
    let mut graph = ResourceGraph::new();
    graph.add_resource("model-x", "model").unwrap();
    let orchestrator = Orchestrator::new(graph, EngineConfig::default())
        .unwrap()
        .with_operation(
            "model-x",
            Arc::new(Flaky::always(OperationError::Conflict("model-x".into()))),
        );

    let summary = orchestrator.run(&CancellationToken::new()).await;

    let model = summary.resource("model-x").unwrap();
    assert_eq!(model.state, LifecycleState::Running);
    assert_eq!(model.attempts, 1);
    assert_eq!(model.last_error, None);
    let running = orchestrator
        .bus()
        .history_for(&id("model-x"))
        .into_iter()
        .find(|e| e.to == LifecycleState::Running)
        .unwrap();
    assert_eq!(running.reason.as_deref(), Some("already exists"));
}

#[tokio::test(start_paused = true)]
async fn bounded_retry_gives_up_after_budget() {
    let mut graph = ResourceGraph::new();
    graph.add_resource("model", "model").unwrap();
    let config = EngineConfig::default()
        .with_kind_retry("model", RetryPolicy::fixed(5, Duration::from_secs(30)));
    let list_models = Arc::new(Flaky::always(OperationError::Timeout("list models".into())));
    let orchestrator = Orchestrator::new(graph, config)
        .unwrap()
        .with_operation("model", list_models.clone());

    let started = Instant::now();
    let summary = orchestrator.run(&CancellationToken::new()).await;

    let model = summary.resource("model").unwrap();
    assert_eq!(model.state, LifecycleState::FailedToStart);
    assert!(
        model
            .last_error
            .as_deref()
            .is_some_and(|e| e.contains("exceeded retries"))
    );
    assert_eq!(list_models.calls(), 5);
    assert_eq!(model.attempts, 5);
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_secs(120) && elapsed < Duration::from_secs(121));
    assert!(!summary.is_success());
}

#[tokio::test(start_paused = true)]
async fn succeeds_on_last_attempt() {
    let mut graph = ResourceGraph::new();
    graph.add_resource("model", "model").unwrap();
    let config = EngineConfig {
        retry: RetryPolicy::fixed(5, Duration::from_secs(30)),
        ..EngineConfig::default()
    };
    let pull = Arc::new(Flaky::new(4, OperationError::Transient("connection reset".into())));
    let orchestrator = Orchestrator::new(graph, config)
        .unwrap()
        .with_operation("model", pull.clone());

    let summary = orchestrator.run(&CancellationToken::new()).await;

    let model = summary.resource("model").unwrap();
    assert_eq!(model.state, LifecycleState::Running);
    assert_eq!(model.attempts, 5);
    assert_eq!(pull.calls(), 5);
    assert_eq!(model.last_error, None);
}

#[tokio::test]
async fn second_run_against_same_remote_is_idempotent() {
    let remote = Arc::new(Remote::default());
    let build = || {
        let mut graph = broker_topic();
        graph
            .add_spec(ResourceSpec::new("subscription", "subscription"))
            .unwrap();
        graph.add_dependency("subscription", "topic").unwrap();
        Orchestrator::new(graph, EngineConfig::default())
            .unwrap()
            .with_operation("broker", Arc::new(Noop))
            .with_kind_operation("topic", remote.clone())
            .with_kind_operation("subscription", remote.clone())
    };

    let first = build();
    assert!(first.run(&CancellationToken::new()).await.is_success());
    assert_eq!(remote.creates(), 2);

    let second = build();
    let summary = second.run(&CancellationToken::new()).await;
    assert!(summary.is_success());
    assert_eq!(remote.creates(), 2);
    assert_eq!(remote.conflicts(), 2);

    let history = second.bus().history();
    for resource in ["topic", "subscription"] {
        let running = history
            .iter()
            .filter(|e| e.resource_id.as_str() == resource && e.to == LifecycleState::Running)
            .count();
        assert_eq!(running, 1, "{resource}");
        let snap = summary.resource(resource).unwrap();
        assert_eq!(snap.attempts, 1);
        assert_eq!(snap.last_error, None);
    }
}

#[tokio::test]
async fn explicit_idempotency_key_is_used() {
    let remote = Arc::new(Remote::default());
    let mut graph = ResourceGraph::new();
    graph
        .add_spec(ResourceSpec::new("model-a", "model").with_idempotency_key("llama3:8b"))
        .unwrap();
    graph
        .add_spec(ResourceSpec::new("model-b", "model").with_idempotency_key("llama3:8b"))
        .unwrap();
    let orchestrator = Orchestrator::new(graph, EngineConfig::default())
        .unwrap()
        .with_kind_operation("model", remote.clone());

    let summary = orchestrator.run(&CancellationToken::new()).await;

    assert!(summary.is_success());
    assert_eq!(remote.creates(), 1);
    assert_eq!(remote.conflicts(), 1);
}

#[tokio::test(start_paused = true)]
async fn dependents_start_only_after_dependencies_are_healthy() {
    let mut graph = ResourceGraph::new();
    for (name, kind) in [
        ("broker", "container"),
        ("topic", "topic"),
        ("subscription", "subscription"),
        ("ollama", "container"),
        ("model", "model"),
    ] {
        graph.add_resource(name, kind).unwrap();
    }
    graph.add_dependency("topic", "broker").unwrap();
    graph.add_dependency("subscription", "topic").unwrap();
    graph.add_dependency("model", "ollama").unwrap();

    let orchestrator = Orchestrator::new(graph, fast_config())
        .unwrap()
        .with_kind_operation("container", Arc::new(common::Slow(Duration::from_secs(2))))
        .with_kind_operation("topic", Arc::new(Noop))
        .with_kind_operation("subscription", Arc::new(Noop))
        .with_kind_operation("model", Arc::new(common::Slow(Duration::from_secs(1))));

    let mut handle = orchestrator.start(&CancellationToken::new());
    let summary = handle.wait().await;
    assert!(summary.is_success());
    assert_eq!(
        handle.check(&id("subscription")).await.unwrap(),
        HealthStatus::Healthy
    );
    handle.shutdown().await;

    let history = orchestrator.bus().history();
    for (dependent, dependency) in [
        ("topic", "broker"),
        ("subscription", "topic"),
        ("model", "ollama"),
    ] {
        let ready = position(&history, dependency, LifecycleState::Running).unwrap();
        let starting = position(&history, dependent, LifecycleState::Starting).unwrap();
        assert!(ready < starting, "{dependent} started before {dependency}");
    }

    let order: Vec<&str> = summary.resources.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(
        order,
        vec!["broker", "topic", "subscription", "ollama", "model"]
    );
}

#[tokio::test]
async fn per_resource_sequences_increase() {
    let mut graph = broker_topic();
    graph.add_resource("ollama", "container").unwrap();
    let orchestrator = Orchestrator::new(graph, fast_config())
        .unwrap()
        .with_kind_operation("container", Arc::new(Noop))
        .with_kind_operation("topic", Arc::new(Noop));

    orchestrator.run(&CancellationToken::new()).await;

    for resource in ["broker", "topic", "ollama"] {
        let seqs: Vec<u64> = orchestrator
            .bus()
            .history_for(&id(resource))
            .iter()
            .map(|e| e.sequence)
            .collect();
        let expected: Vec<u64> = (1..=seqs.len() as u64).collect();
        assert_eq!(seqs, expected, "{resource}");
    }
}
