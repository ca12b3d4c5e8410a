//! Health values exchanged between probes, the registry and the gate.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Health of a resource as reported to gates and external observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    /// Safe for dependents to proceed.
    Healthy,
    /// Exists but should not be relied on.
    Unhealthy,
    /// No opinion yet (not provisioned or never probed).
    #[default]
    Unknown,
}

impl HealthStatus {
    /// Returns `true` only for [`HealthStatus::Healthy`].
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy)
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Healthy => "healthy",
            Self::Unhealthy => "unhealthy",
            Self::Unknown => "unknown",
        })
    }
}

/// What a health probe observed on the remote system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum ProbeResult {
    /// The remote object answered and is usable.
    Healthy,
    /// The remote object answered but is not usable right now.
    Unhealthy {
        /// Why the probe considers it unhealthy.
        reason: String,
    },
    /// The remote object no longer exists.
    Gone,
}

impl ProbeResult {
    /// Build an unhealthy result.
    pub fn unhealthy(reason: impl Into<String>) -> Self {
        Self::Unhealthy {
            reason: reason.into(),
        }
    }

    /// Collapse the probe result into the health vocabulary.
    #[must_use]
    pub fn status(&self) -> HealthStatus {
        match self {
            Self::Healthy => HealthStatus::Healthy,
            Self::Unhealthy { .. } | Self::Gone => HealthStatus::Unhealthy,
        }
    }
}
