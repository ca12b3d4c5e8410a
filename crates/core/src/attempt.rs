//! Provisioning attempt tracking.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::ResourceId;

/// How a single provisioning attempt ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "error", rename_all = "snake_case")]
pub enum AttemptOutcome {
    /// The remote object was created by this attempt.
    Created,
    /// The remote object was already there. Treated exactly like `Created`.
    AlreadyExists,
    /// A transient failure; the attempt may be retried.
    Retryable(String),
    /// A permanent failure; no retry.
    Fatal(String),
}

impl AttemptOutcome {
    /// Returns `true` for `Created` and `AlreadyExists`.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Created | Self::AlreadyExists)
    }

    /// The error carried by a failed outcome.
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Retryable(e) | Self::Fatal(e) => Some(e),
            Self::Created | Self::AlreadyExists => None,
        }
    }
}

/// One try at creating a remote object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisioningAttempt {
    /// Resource being provisioned.
    pub resource_id: ResourceId,
    /// Which attempt this is (1-indexed).
    pub attempt: u32,
    /// When this attempt started.
    pub started_at: DateTime<Utc>,
    /// How the attempt ended.
    pub outcome: AttemptOutcome,
    /// When the next attempt is scheduled, if this one will be retried.
    #[serde(default)]
    pub next_retry_at: Option<DateTime<Utc>>,
}

impl ProvisioningAttempt {
    /// Record a finished attempt that started at `started_at`.
    #[must_use]
    pub fn new(
        resource_id: ResourceId,
        attempt: u32,
        started_at: DateTime<Utc>,
        outcome: AttemptOutcome,
    ) -> Self {
        Self {
            resource_id,
            attempt,
            started_at,
            outcome,
            next_retry_at: None,
        }
    }

    /// Attach the time the following attempt is due.
    #[must_use]
    pub fn with_next_retry_at(mut self, at: DateTime<Utc>) -> Self {
        self.next_retry_at = Some(at);
        self
    }
}
