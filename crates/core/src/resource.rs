//! Declared resources and their observable records.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::health::HealthStatus;
use crate::id::{IdempotencyKey, ResourceId, ResourceKind};
use crate::state::LifecycleState;

/// What a caller declares when composing a resource graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceSpec {
    /// Unique resource name.
    pub id: ResourceId,
    /// Opaque kind tag used to pick a provisioning operation and retry policy.
    pub kind: ResourceKind,
    /// Explicit idempotency key; defaults to the resource id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<IdempotencyKey>,
    /// Typed construction-time configuration handed to the operation.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, String>,
}

impl ResourceSpec {
    /// Declare a resource with no extra configuration.
    pub fn new(id: impl Into<ResourceId>, kind: impl Into<ResourceKind>) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
            idempotency_key: None,
            properties: BTreeMap::new(),
        }
    }

    /// Override the idempotency key.
    pub fn with_idempotency_key(mut self, key: impl Into<IdempotencyKey>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }

    /// Attach a property.
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Look up a property.
    #[must_use]
    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    /// The effective idempotency key: the override, or one derived from the id.
    #[must_use]
    pub fn idempotency_key(&self) -> IdempotencyKey {
        self.idempotency_key
            .clone()
            .unwrap_or_else(|| IdempotencyKey::for_resource(&self.id))
    }
}

/// Point-in-time view of a resource during a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceSnapshot {
    /// Resource name.
    pub id: ResourceId,
    /// Kind tag.
    pub kind: ResourceKind,
    /// Dependencies in the order they were declared.
    pub dependencies: Vec<ResourceId>,
    /// Current lifecycle state.
    pub state: LifecycleState,
    /// Last known health.
    pub health: HealthStatus,
    /// Most recent error, if any.
    #[serde(default)]
    pub last_error: Option<String>,
    /// Number of provisioning attempts started.
    pub attempts: u32,
    /// Key used to recognise an already-created remote object.
    pub idempotency_key: IdempotencyKey,
}
