//! ManagedResource custom resource reconciled by the resource manager.
//!
//! A managed resource bundles the manifests of one system component; its
//! conditions tell whether the bundle has been applied and is healthy.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::condition::Condition;

/// Set of objects applied to the shoot by the resource manager.
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "resources.gardener.cloud",
    version = "v1alpha1",
    kind = "ManagedResource",
    plural = "managedresources",
    shortname = "mr",
    status = "ManagedResourceStatus",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct ManagedResourceSpec {
    /// Resource class responsible for this resource.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class: Option<String>,

    /// Whether objects are kept in the target cluster when the resource is deleted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keep_objects: Option<bool>,
}

/// Observed state of a managed resource.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ManagedResourceStatus {
    /// Generation last processed by the resource manager.
    #[serde(default)]
    pub observed_generation: i64,

    /// Conditions such as `ResourcesApplied` and `ResourcesHealthy`.
    #[serde(default)]
    pub conditions: Vec<Condition>,
}
