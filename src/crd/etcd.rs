//! Etcd custom resource managed by etcd-druid in the seed.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Name of the etcd holding the cluster state.
pub const ETCD_MAIN: &str = "etcd-main";
/// Name of the etcd holding Kubernetes events.
pub const ETCD_EVENTS: &str = "etcd-events";

/// Etcd cluster backing a shoot's API server.
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "druid.gardener.cloud",
    version = "v1alpha1",
    kind = "Etcd",
    plural = "etcds",
    status = "EtcdStatus",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct EtcdSpec {
    /// Desired number of members.
    #[serde(default)]
    pub replicas: i32,
}

/// Observed state of an etcd cluster.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct EtcdStatus {
    /// Whether the cluster is ready to serve.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ready: Option<bool>,

    /// Last error reported by etcd-druid.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,

    /// Generation last processed by etcd-druid.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}
