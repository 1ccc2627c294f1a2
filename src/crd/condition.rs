//! Status conditions shared by shoots, managed resources and extensions.

use jiff::Timestamp;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Condition type: the shoot's API server answers health probes.
pub const API_SERVER_AVAILABLE: &str = "APIServerAvailable";
/// Condition type: all control plane components in the seed are healthy.
pub const CONTROL_PLANE_HEALTHY: &str = "ControlPlaneHealthy";
/// Condition type: every worker node is registered, ready and up to date.
pub const EVERY_NODE_READY: &str = "EveryNodeReady";
/// Condition type: all system components in the shoot are healthy.
pub const SYSTEM_COMPONENTS_HEALTHY: &str = "SystemComponentsHealthy";

/// Managed resource condition: all resources have been applied.
pub const RESOURCES_APPLIED: &str = "ResourcesApplied";
/// Managed resource condition: all applied resources are healthy.
pub const RESOURCES_HEALTHY: &str = "ResourcesHealthy";

/// Error code attached to conditions and last errors when leftover
/// resources block the deletion of a cluster.
pub const ERR_CLEANUP_CLUSTER_RESOURCES: &str = "ERR_CLEANUP_CLUSTER_RESOURCES";
/// Error code for problems caused by user configuration.
pub const ERR_CONFIGURATION_PROBLEM: &str = "ERR_CONFIGURATION_PROBLEM";

/// Status of a condition.
#[derive(
    Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Deserialize, Serialize, JsonSchema,
)]
pub enum ConditionStatus {
    True,
    False,
    /// Failing, but still within the tolerated grace period
    Progressing,
    #[default]
    Unknown,
}

impl std::fmt::Display for ConditionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConditionStatus::True => write!(f, "True"),
            ConditionStatus::False => write!(f, "False"),
            ConditionStatus::Progressing => write!(f, "Progressing"),
            ConditionStatus::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Condition describes the state of one aspect of a resource at a certain point.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition.
    pub r#type: String,
    /// Status of the condition.
    pub status: ConditionStatus,
    /// Machine-readable reason for the condition's last update.
    #[serde(default)]
    pub reason: String,
    /// Human-readable message indicating details about the last update.
    #[serde(default)]
    pub message: String,
    /// Well-defined error codes describing the failure, if any.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub codes: Vec<String>,
    /// Last time the condition transitioned from one status to another.
    #[schemars(with = "String")]
    pub last_transition_time: Timestamp,
    /// Last time the reason, message or codes changed.
    #[schemars(with = "String")]
    pub last_update_time: Timestamp,
}

impl Condition {
    /// Whether the condition reports `True`
    pub fn is_true(&self) -> bool {
        self.status == ConditionStatus::True
    }
}

/// Find a condition by type.
pub fn get_condition<'a>(conditions: &'a [Condition], condition_type: &str) -> Option<&'a Condition> {
    conditions.iter().find(|c| c.r#type == condition_type)
}
