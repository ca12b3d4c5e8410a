//! Engine configuration.

use std::collections::BTreeMap;
use std::time::Duration;

use converge_core::ResourceKind;
use converge_resilience::{PolicyError, RetryPolicy};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Upper bound for the gate's polling interval. Cancellation and health
/// polling must stay responsive.
pub const MAX_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Invalid [`EngineConfig`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A duration field is out of range.
    #[error("{field}: {reason}")]
    InvalidDuration {
        /// Offending field.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },

    /// The event buffer must hold at least one event.
    #[error("event_buffer must be at least 1")]
    ZeroEventBuffer,

    /// The default retry policy is invalid.
    #[error("retry policy: {0}")]
    Retry(#[source] PolicyError),

    /// A per-kind retry policy is invalid.
    #[error("retry policy for kind '{kind}': {source}")]
    KindRetry {
        /// Kind the policy applies to.
        kind: ResourceKind,
        /// Validation failure.
        source: PolicyError,
    },
}

/// Tuning for one orchestrator.
///
/// Durations are written in humantime form (`"250ms"`, `"5m"`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// How long a resource waits for its dependencies before failing with
    /// `dependency timeout`.
    #[serde(with = "humantime_serde")]
    pub dependency_timeout: Duration,

    /// Gate re-check interval when no events arrive. At most one second.
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,

    /// How long a probe result stays fresh.
    #[serde(with = "humantime_serde")]
    pub health_ttl: Duration,

    /// Upper bound on a single probe call; a slower probe counts as unhealthy.
    #[serde(with = "humantime_serde")]
    pub probe_timeout: Duration,

    /// When set, every probed resource is re-probed at this interval after
    /// reaching `Running`.
    #[serde(with = "humantime_serde")]
    pub monitor_interval: Option<Duration>,

    /// Per-subscriber buffer of the notification bus.
    pub event_buffer: usize,

    /// Events kept in the bus history; 0 disables it.
    pub history_limit: usize,

    /// Count `Unhealthy` resources as successful in the run summary.
    pub accept_unhealthy: bool,

    /// Default retry policy.
    pub retry: RetryPolicy,

    /// Retry policy overrides by resource kind.
    pub kind_retry: BTreeMap<ResourceKind, RetryPolicy>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            dependency_timeout: Duration::from_secs(300),
            poll_interval: Duration::from_millis(250),
            health_ttl: Duration::from_secs(5),
            probe_timeout: Duration::from_secs(10),
            monitor_interval: None,
            event_buffer: 1024,
            history_limit: 10_000,
            accept_unhealthy: false,
            retry: RetryPolicy::default(),
            kind_retry: BTreeMap::new(),
        }
    }
}

impl EngineConfig {
    /// Check every field for out-of-range values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval.is_zero() || self.poll_interval > MAX_POLL_INTERVAL {
            return Err(ConfigError::InvalidDuration {
                field: "poll_interval",
                reason: format!(
                    "must be between 1ns and {MAX_POLL_INTERVAL:?}, got {:?}",
                    self.poll_interval
                ),
            });
        }
        if self.dependency_timeout.is_zero() {
            return Err(ConfigError::InvalidDuration {
                field: "dependency_timeout",
                reason: "must be positive".into(),
            });
        }
        if self.probe_timeout.is_zero() {
            return Err(ConfigError::InvalidDuration {
                field: "probe_timeout",
                reason: "must be positive".into(),
            });
        }
        if self.monitor_interval.is_some_and(|d| d.is_zero()) {
            return Err(ConfigError::InvalidDuration {
                field: "monitor_interval",
                reason: "must be positive when set".into(),
            });
        }
        if self.event_buffer == 0 {
            return Err(ConfigError::ZeroEventBuffer);
        }
        self.retry
            .validate()
            .map_err(ConfigError::Retry)?;
        for (kind, policy) in &self.kind_retry {
            policy.validate().map_err(|source| ConfigError::KindRetry {
                kind: kind.clone(),
                source,
            })?;
        }
        Ok(())
    }

    /// Retry policy for resources of `kind`.
    #[must_use]
    pub fn retry_for(&self, kind: &ResourceKind) -> &RetryPolicy {
        self.kind_retry.get(kind).unwrap_or(&self.retry)
    }

    /// Override the retry policy for one kind.
    pub fn with_kind_retry(mut self, kind: impl Into<ResourceKind>, policy: RetryPolicy) -> Self {
        self.kind_retry.insert(kind.into(), policy);
        self
    }
}
