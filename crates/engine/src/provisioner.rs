//! Creating remote objects through injected operations.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use converge_core::{
    AttemptOutcome, IdempotencyKey, ProvisioningAttempt, ResourceId, ResourceSpec,
};
use converge_resilience::{RetryError, RetryPolicy, Retryable};
use parking_lot::Mutex;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::state::StateMachine;

/// Failure vocabulary of a provisioning operation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum OperationError {
    /// The object already exists. Never an error for the orchestrator.
    #[error("already exists: {0}")]
    Conflict(String),
    /// Something the operation needs is not visible yet.
    #[error("not found: {0}")]
    NotFound(String),
    /// Connection reset, rate limiting and the like.
    #[error("{0}")]
    Transient(String),
    /// The remote call did not answer in time.
    #[error("timed out: {0}")]
    Timeout(String),
    /// Bad configuration, permission denied, missing identifier.
    #[error("{0}")]
    Fatal(String),
}

impl Retryable for OperationError {
    fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::NotFound(_) | Self::Transient(_) | Self::Timeout(_)
        )
    }
}

/// Successful end of a provisioning call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provisioned {
    /// This call created the object.
    Created,
    /// The object was there already.
    AlreadyExists,
}

impl Provisioned {
    /// Reason attached to the `Running` transition.
    #[must_use]
    pub fn reason(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::AlreadyExists => "already exists",
        }
    }
}

impl From<Provisioned> for AttemptOutcome {
    fn from(value: Provisioned) -> Self {
        match value {
            Provisioned::Created => Self::Created,
            Provisioned::AlreadyExists => Self::AlreadyExists,
        }
    }
}

struct ReporterInner {
    states: Arc<StateMachine>,
    id: ResourceId,
    last: Mutex<Option<String>>,
    last_percent: Mutex<Option<u64>>,
}

/// Publishes progress of a long-running operation as same-state `Starting`
/// events.
#[derive(Clone)]
pub struct ProgressReporter {
    inner: Arc<ReporterInner>,
}

impl std::fmt::Debug for ProgressReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressReporter")
            .field("resource", &self.inner.id)
            .finish_non_exhaustive()
    }
}

impl ProgressReporter {
    /// Reporter for `id`.
    #[must_use]
    pub fn new(states: Arc<StateMachine>, id: ResourceId) -> Self {
        Self {
            inner: Arc::new(ReporterInner {
                states,
                id,
                last: Mutex::new(None),
                last_percent: Mutex::new(None),
            }),
        }
    }

    /// Publish `reason` unless it repeats the previous report.
    pub fn report(&self, reason: impl Into<String>) {
        let reason = reason.into();
        {
            let mut last = self.inner.last.lock();
            if last.as_deref() == Some(reason.as_str()) {
                return;
            }
            *last = Some(reason.clone());
        }
        if let Err(error) = self.inner.states.report_progress(&self.inner.id, reason) {
            debug!(resource = %self.inner.id, %error, "progress dropped");
        }
    }

    /// Publish `"<label> <n> percent"` when the whole percentage changes.
    pub fn report_fraction(&self, label: &str, completed: u64, total: u64) {
        let percent = if total == 0 {
            100
        } else {
            completed.min(total).saturating_mul(100) / total
        };
        {
            let mut last = self.inner.last_percent.lock();
            if *last == Some(percent) {
                return;
            }
            *last = Some(percent);
        }
        self.report(format!("{label} {percent} percent"));
    }
}

/// Everything an operation gets for one attempt.
#[derive(Debug, Clone)]
pub struct ProvisionRequest {
    /// The resource being created.
    pub spec: ResourceSpec,
    /// Stable key identifying the remote object.
    pub key: IdempotencyKey,
    /// 1-indexed attempt number.
    pub attempt: u32,
    /// Progress sink for long-running calls.
    pub progress: ProgressReporter,
}

/// The side-effecting call that creates a resource remotely.
#[async_trait]
pub trait ProvisionOperation: Send + Sync {
    /// Create the object identified by `request.key`.
    async fn invoke(&self, request: &ProvisionRequest) -> Result<Provisioned, OperationError>;

    /// Cheap existence check run before every `invoke`.
    async fn exists(&self, _request: &ProvisionRequest) -> Result<bool, OperationError> {
        Ok(false)
    }
}

/// Operation for resources managed elsewhere; always reports `AlreadyExists`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Noop;

#[async_trait]
impl ProvisionOperation for Noop {
    async fn invoke(&self, _request: &ProvisionRequest) -> Result<Provisioned, OperationError> {
        Ok(Provisioned::AlreadyExists)
    }
}

/// Why provisioning did not succeed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProvisionError {
    /// A non-retryable failure.
    #[error("{message}")]
    Fatal {
        /// Rendered operation error.
        message: String,
        /// Attempt that failed.
        attempt: u32,
    },
    /// Every attempt failed with a retryable error.
    #[error("exceeded retries after {attempts} attempts: {last}")]
    Exhausted {
        /// Rendered error of the final attempt.
        last: String,
        /// Attempts made.
        attempts: u32,
    },
    /// The run was cancelled.
    #[error("cancelled after {attempts} attempts")]
    Cancelled {
        /// Attempts started before cancellation.
        attempts: u32,
    },
    /// No operation is registered for the resource or its kind.
    #[error("no provisioning operation registered")]
    NotConfigured,
}

impl From<RetryError<OperationError>> for ProvisionError {
    fn from(error: RetryError<OperationError>) -> Self {
        match error {
            RetryError::Fatal { error, attempt } => Self::Fatal {
                message: error.to_string(),
                attempt,
            },
            RetryError::Exhausted { last, attempts } => Self::Exhausted {
                last: last.to_string(),
                attempts,
            },
            RetryError::Cancelled { attempts } => Self::Cancelled { attempts },
        }
    }
}

/// Result of [`Provisioner::provision`].
#[derive(Debug, Clone)]
pub struct ProvisionReport {
    /// How provisioning ended.
    pub outcome: Result<Provisioned, ProvisionError>,
    /// Every finished attempt, in order.
    pub attempts: Vec<ProvisioningAttempt>,
}

/// Runs an operation under a retry policy and records each attempt.
#[derive(Debug, Clone)]
pub struct Provisioner {
    states: Arc<StateMachine>,
}

impl Provisioner {
    /// Provisioner publishing through `states`.
    #[must_use]
    pub fn new(states: Arc<StateMachine>) -> Self {
        Self { states }
    }

    /// Create `spec` remotely.
    ///
    /// `Conflict` and a positive existence check both count as
    /// `AlreadyExists`. The resource must already be `Starting`: every retry
    /// publishes a same-state event explaining the delay.
    #[instrument(skip_all, fields(resource = %spec.id, kind = %spec.kind))]
    pub async fn provision(
        &self,
        spec: &ResourceSpec,
        operation: &dyn ProvisionOperation,
        policy: &RetryPolicy,
        cancel: &CancellationToken,
    ) -> ProvisionReport {
        let id = &spec.id;
        let key = spec.idempotency_key();
        let progress = ProgressReporter::new(Arc::clone(&self.states), id.clone());
        let attempts: Mutex<Vec<ProvisioningAttempt>> = Mutex::new(Vec::new());
        let started: Mutex<(u32, DateTime<Utc>)> = Mutex::new((0, Utc::now()));

        let result = policy
            .execute(
                cancel,
                |attempt| {
                    let request = ProvisionRequest {
                        spec: spec.clone(),
                        key: key.clone(),
                        attempt,
                        progress: progress.clone(),
                    };
                    let states = &self.states;
                    let started = &started;
                    async move {
                        let number = states
                            .begin_attempt(&request.spec.id)
                            .map_err(|e| OperationError::Fatal(e.to_string()))?;
                        *started.lock() = (number, Utc::now());
                        attempt_once(operation, &request).await
                    }
                },
                |notice| {
                    let (number, started_at) = *started.lock();
                    let message = notice.error.to_string();
                    let next = chrono::Duration::from_std(notice.delay)
                        .ok()
                        .and_then(|d| Utc::now().checked_add_signed(d));
                    let mut attempt = ProvisioningAttempt::new(
                        id.clone(),
                        number,
                        started_at,
                        AttemptOutcome::Retryable(message.clone()),
                    );
                    if let Some(next) = next {
                        attempt = attempt.with_next_retry_at(next);
                    }
                    attempts.lock().push(attempt);

                    if let Err(error) = self.states.record_error(id, message) {
                        debug!(%error, "could not record retry error");
                    }
                    if let Err(error) = self.states.report_progress(id, notice.to_string()) {
                        debug!(%error, "could not publish retry");
                    }
                },
            )
            .await;

        let (number, started_at) = *started.lock();
        let outcome = match result {
            Ok((provisioned, stats)) => {
                info!(
                    attempts = stats.attempts,
                    outcome = provisioned.reason(),
                    "provisioned"
                );
                attempts.lock().push(ProvisioningAttempt::new(
                    id.clone(),
                    number,
                    started_at,
                    provisioned.into(),
                ));
                Ok(provisioned)
            }
            Err(error) => {
                let error = ProvisionError::from(error);
                match &error {
                    ProvisionError::Cancelled { attempts } => {
                        debug!(attempts, "provisioning cancelled");
                    }
                    _ => {
                        warn!(%error, "provisioning failed");
                        attempts.lock().push(ProvisioningAttempt::new(
                            id.clone(),
                            number,
                            started_at,
                            AttemptOutcome::Fatal(error.to_string()),
                        ));
                    }
                }
                Err(error)
            }
        };

        ProvisionReport {
            outcome,
            attempts: attempts.into_inner(),
        }
    }
}

async fn attempt_once(
    operation: &dyn ProvisionOperation,
    request: &ProvisionRequest,
) -> Result<Provisioned, OperationError> {
    let result = match operation.exists(request).await {
        Ok(true) => {
            debug!(key = %request.key, "already present, skipping create");
            Ok(Provisioned::AlreadyExists)
        }
        Ok(false) => operation.invoke(request).await,
        Err(error) => Err(error),
    };
    match result {
        Err(OperationError::Conflict(detail)) => {
            debug!(key = %request.key, %detail, "create conflicted, treating as existing");
            Ok(Provisioned::AlreadyExists)
        }
        other => other,
    }
}
