//! Fake remotes shared by the engine integration tests.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use converge_core::{IdempotencyKey, LifecycleState, ResourceId, StateTransitionEvent};
use converge_engine::{OperationError, ProvisionOperation, ProvisionRequest, Provisioned};
use parking_lot::Mutex;

/// An in-memory remote: creating a key twice conflicts.
#[derive(Debug, Default)]
pub struct Remote {
    objects: Mutex<HashSet<IdempotencyKey>>,
    creates: AtomicU32,
    conflicts: AtomicU32,
}

impl Remote {
    pub fn creates(&self) -> u32 {
        self.creates.load(Ordering::SeqCst)
    }

    pub fn conflicts(&self) -> u32 {
        self.conflicts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProvisionOperation for Remote {
    async fn invoke(&self, request: &ProvisionRequest) -> Result<Provisioned, OperationError> {
        if self.objects.lock().insert(request.key.clone()) {
            self.creates.fetch_add(1, Ordering::SeqCst);
            Ok(Provisioned::Created)
        } else {
            self.conflicts.fetch_add(1, Ordering::SeqCst);
            Err(OperationError::Conflict(request.key.to_string()))
        }
    }
}

/// Fails `failures` times with `error`, then creates.
#[derive(Debug)]
pub struct Flaky {
    failures: u32,
    error: OperationError,
    calls: AtomicU32,
}

impl Flaky {
    pub fn new(failures: u32, error: OperationError) -> Self {
        Self {
            failures,
            error,
            calls: AtomicU32::new(0),
        }
    }

    pub fn always(error: OperationError) -> Self {
        Self::new(u32::MAX, error)
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProvisionOperation for Flaky {
    async fn invoke(&self, _request: &ProvisionRequest) -> Result<Provisioned, OperationError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call <= self.failures {
            Err(self.error.clone())
        } else {
            Ok(Provisioned::Created)
        }
    }
}

/// Never answers.
#[derive(Debug, Default)]
pub struct Hang {
    calls: AtomicU32,
}

impl Hang {
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProvisionOperation for Hang {
    async fn invoke(&self, _request: &ProvisionRequest) -> Result<Provisioned, OperationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        std::future::pending().await
    }
}

/// Takes `delay` to create.
#[derive(Debug)]
pub struct Slow(pub Duration);

#[async_trait]
impl ProvisionOperation for Slow {
    async fn invoke(&self, _request: &ProvisionRequest) -> Result<Provisioned, OperationError> {
        tokio::time::sleep(self.0).await;
        Ok(Provisioned::Created)
    }
}

/// Panics inside the provisioning task.
#[derive(Debug)]
pub struct Panics;

#[async_trait]
impl ProvisionOperation for Panics {
    async fn invoke(&self, _request: &ProvisionRequest) -> Result<Provisioned, OperationError> {
        panic!("remote client bug");
    }
}

/// Runs `f` and reports it as created; lets a test observe the moment of
/// provisioning.
pub struct Observe<F>(pub F);

#[async_trait]
impl<F> ProvisionOperation for Observe<F>
where
    F: Fn(&ProvisionRequest) + Send + Sync,
{
    async fn invoke(&self, request: &ProvisionRequest) -> Result<Provisioned, OperationError> {
        (self.0)(request);
        Ok(Provisioned::Created)
    }
}

pub fn counter() -> Arc<AtomicU32> {
    Arc::new(AtomicU32::new(0))
}

pub fn id(s: &str) -> ResourceId {
    ResourceId::new(s)
}

/// States `id` entered, in publish order, progress events excluded.
pub fn path_of(history: &[StateTransitionEvent], resource: &str) -> Vec<LifecycleState> {
    history
        .iter()
        .filter(|e| e.resource_id.as_str() == resource && !e.is_progress())
        .map(|e| e.to)
        .collect()
}

/// Position in `history` of the first event moving `resource` into `to`.
pub fn position(
    history: &[StateTransitionEvent],
    resource: &str,
    to: LifecycleState,
) -> Option<usize> {
    history
        .iter()
        .position(|e| e.resource_id.as_str() == resource && e.to == to && !e.is_progress())
}
