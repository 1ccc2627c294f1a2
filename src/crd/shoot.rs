//! Shoot custom resource, as far as health checks and cleanup read it.
//!
//! The shoot is owned by the garden cluster's API; this crate never writes
//! it. Only the fields that influence condition computation or cleanup
//! timing are modelled, everything else is ignored on deserialization.

use jiff::Timestamp;
use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::condition::Condition;

/// Shoot purpose that disables monitoring and logging stacks.
pub const PURPOSE_TESTING: &str = "testing";

/// Shoot is a managed Kubernetes cluster whose control plane runs in a seed.
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "core.gardener.cloud",
    version = "v1beta1",
    kind = "Shoot",
    plural = "shoots",
    status = "ShootStatus",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct ShootSpec {
    /// Hibernation settings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hibernation: Option<Hibernation>,

    /// Kubernetes settings of the cluster.
    #[serde(default)]
    pub kubernetes: KubernetesSettings,

    /// Provider settings including the worker pools.
    #[serde(default)]
    pub provider: Provider,

    /// Purpose of the cluster (evaluation, testing, development, production).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub purpose: Option<String>,

    /// Monitoring settings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub monitoring: Option<Monitoring>,
}

/// Hibernation settings of a shoot.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Hibernation {
    /// Whether the cluster is supposed to be hibernated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
}

/// Kubernetes settings of a shoot.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct KubernetesSettings {
    /// Desired Kubernetes version, e.g. `1.30.2`.
    #[serde(default)]
    pub version: String,

    /// Vertical pod autoscaler settings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vertical_pod_autoscaler: Option<VerticalPodAutoscaler>,
}

/// Vertical pod autoscaler settings.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
pub struct VerticalPodAutoscaler {
    #[serde(default)]
    pub enabled: bool,
}

/// Provider settings of a shoot.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Provider {
    /// Infrastructure provider type.
    #[serde(default, rename = "type")]
    pub provider_type: String,

    /// Worker pools of the cluster.
    #[serde(default)]
    pub workers: Vec<WorkerPool>,
}

/// A group of nodes with the same configuration.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct WorkerPool {
    /// Name of the pool; nodes carry it in the `worker.gardener.cloud/pool` label.
    pub name: String,

    /// Minimum number of nodes.
    #[serde(default)]
    pub minimum: i32,

    /// Maximum number of nodes.
    #[serde(default)]
    pub maximum: i32,

    /// Pool specific Kubernetes settings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kubernetes: Option<WorkerKubernetes>,
}

/// Pool specific Kubernetes settings.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
pub struct WorkerKubernetes {
    /// Kubelet version of the pool, defaults to the cluster version.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// Monitoring settings.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
pub struct Monitoring {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alerting: Option<Alerting>,
}

/// Alerting settings.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Alerting {
    /// Receivers of alert emails.
    #[serde(default)]
    pub email_receivers: Vec<String>,
}

/// Observed state of a shoot.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ShootStatus {
    /// Health conditions of the cluster.
    #[serde(default)]
    pub conditions: Vec<Condition>,

    /// Most recent operation performed on the cluster.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_operation: Option<LastOperation>,

    /// Errors of the most recent operation.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub last_errors: Vec<LastError>,

    /// Whether the cluster is actually hibernated.
    #[serde(default)]
    pub is_hibernated: bool,

    /// Name of the control plane namespace in the seed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub technical_id: Option<String>,
}

/// Type of an operation performed on a shoot.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Deserialize, Serialize, JsonSchema)]
pub enum LastOperationType {
    Create,
    Reconcile,
    Delete,
    Migrate,
    Restore,
}

/// State of an operation performed on a shoot.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Deserialize, Serialize, JsonSchema)]
pub enum LastOperationState {
    Processing,
    Succeeded,
    Error,
    Failed,
    Pending,
    Aborted,
}

/// Most recent operation performed on a shoot.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LastOperation {
    #[serde(rename = "type")]
    pub operation_type: LastOperationType,
    pub state: LastOperationState,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub progress: i32,
    #[schemars(with = "String")]
    pub last_update_time: Timestamp,
}

impl LastOperation {
    /// Whether the operation finished successfully
    pub fn succeeded(&self) -> bool {
        self.state == LastOperationState::Succeeded
    }
}

/// Error reported for the most recent operation.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LastError {
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub codes: Vec<String>,
}

impl Shoot {
    /// Whether hibernation is requested in the spec
    pub fn hibernation_enabled(&self) -> bool {
        self.spec
            .hibernation
            .as_ref()
            .and_then(|h| h.enabled)
            .unwrap_or(false)
    }

    /// Whether the cluster is hibernated or about to be
    pub fn is_hibernated(&self) -> bool {
        self.hibernation_enabled() || self.status.as_ref().is_some_and(|s| s.is_hibernated)
    }

    /// The cluster autoscaler is wanted when any pool may grow beyond its minimum
    pub fn wants_cluster_autoscaler(&self) -> bool {
        self.spec
            .provider
            .workers
            .iter()
            .any(|w| w.maximum > w.minimum)
    }

    /// Whether the vertical pod autoscaler is enabled
    pub fn wants_vertical_pod_autoscaler(&self) -> bool {
        self.spec
            .kubernetes
            .vertical_pod_autoscaler
            .as_ref()
            .is_some_and(|v| v.enabled)
    }

    /// Alertmanager is deployed only if someone receives the alerts
    pub fn wants_alertmanager(&self) -> bool {
        self.spec
            .monitoring
            .as_ref()
            .and_then(|m| m.alerting.as_ref())
            .is_some_and(|a| !a.email_receivers.is_empty())
    }

    /// Testing clusters run without monitoring and logging
    pub fn is_testing(&self) -> bool {
        self.spec.purpose.as_deref() == Some(PURPOSE_TESTING)
    }

    /// Namespace of the control plane in the seed
    pub fn seed_namespace(&self) -> String {
        self.status
            .as_ref()
            .and_then(|s| s.technical_id.clone())
            .unwrap_or_else(|| {
                let namespace = self.namespace().unwrap_or_default();
                let project = namespace.strip_prefix("garden-").unwrap_or(&namespace);
                format!("shoot--{}--{}", project, self.name_any())
            })
    }

    /// Most recent operation, if any
    pub fn last_operation(&self) -> Option<&LastOperation> {
        self.status.as_ref().and_then(|s| s.last_operation.as_ref())
    }

    /// Errors of the most recent operation
    pub fn last_errors(&self) -> &[LastError] {
        self.status
            .as_ref()
            .map(|s| s.last_errors.as_slice())
            .unwrap_or_default()
    }

    /// Current conditions
    pub fn conditions(&self) -> &[Condition] {
        self.status
            .as_ref()
            .map(|s| s.conditions.as_slice())
            .unwrap_or_default()
    }

    /// Desired Kubernetes version of a worker pool
    pub fn pool_kubernetes_version<'a>(&'a self, pool: &'a WorkerPool) -> &'a str {
        pool.kubernetes
            .as_ref()
            .and_then(|k| k.version.as_deref())
            .unwrap_or(self.spec.kubernetes.version.as_str())
    }
}
