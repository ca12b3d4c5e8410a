//! Resource lifecycle states.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Where a resource is in its lifecycle.
///
/// The happy path is `NotStarted → Waiting → Starting → Running`. A running
/// resource may flip between `Running` and `Unhealthy` as probes report, and
/// `FailedToStart` is terminal for the current run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    /// Declared in the graph; its task has not begun.
    #[default]
    NotStarted,
    /// Blocked on the health gate until every dependency is healthy.
    Waiting,
    /// The provisioning operation is in flight (or between retries).
    Starting,
    /// Provisioned and, as far as the last probe knows, healthy.
    Running,
    /// Provisioned but the latest probe reported it unhealthy.
    Unhealthy,
    /// Provisioning failed or was abandoned. Terminal.
    FailedToStart,
}

impl LifecycleState {
    /// Returns `true` if no further automatic transitions can occur.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::FailedToStart)
    }

    /// Returns `true` once the resource exists remotely.
    #[must_use]
    pub fn is_provisioned(&self) -> bool {
        matches!(self, Self::Running | Self::Unhealthy)
    }

    /// Returns `true` if the resource has stopped progressing through
    /// provisioning, whether it succeeded or not.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        matches!(self, Self::Running | Self::Unhealthy | Self::FailedToStart)
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NotStarted => "not_started",
            Self::Waiting => "waiting",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Unhealthy => "unhealthy",
            Self::FailedToStart => "failed_to_start",
        };
        f.write_str(name)
    }
}
