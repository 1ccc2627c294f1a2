//! Extension resources whose controllers report health conditions.
//!
//! Extension kinds are pluggable, so they are read as dynamic objects and
//! projected onto [`ExtensionObject`]. The worker extension is additionally
//! modelled as a typed resource because its rolling-update state changes
//! which control plane deployments are required.

use kube::api::{ApiResource, DynamicObject, GroupVersionKind};
use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::condition::{Condition, ConditionStatus, get_condition};
use crate::error::Result;

/// API group of all extension resources.
pub const EXTENSIONS_GROUP: &str = "extensions.gardener.cloud";
/// API version of all extension resources.
pub const EXTENSIONS_VERSION: &str = "v1alpha1";

/// Worker condition that is `True` while machines are being rolled.
pub const WORKER_ROLLING_UPDATE: &str = "RollingUpdate";

/// An extension resource kind to collect health reports from.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtensionKind {
    /// Kind, e.g. `Infrastructure`.
    pub kind: String,
    /// Plural resource name, e.g. `infrastructures`.
    pub plural: String,
    #[serde(default = "default_group")]
    pub group: String,
    #[serde(default = "default_version")]
    pub version: String,
}

fn default_group() -> String {
    EXTENSIONS_GROUP.to_string()
}

fn default_version() -> String {
    EXTENSIONS_VERSION.to_string()
}

impl ExtensionKind {
    /// Extension kind in the default extensions API group
    pub fn new(kind: &str, plural: &str) -> Self {
        Self {
            kind: kind.to_string(),
            plural: plural.to_string(),
            group: default_group(),
            version: default_version(),
        }
    }

    /// API resource used to list objects of this kind
    pub fn api_resource(&self) -> ApiResource {
        ApiResource::from_gvk_with_plural(
            &GroupVersionKind::gvk(&self.group, &self.version, &self.kind),
            &self.plural,
        )
    }
}

/// Extension kinds whose health reports are aggregated by default.
pub fn default_extension_kinds() -> Vec<ExtensionKind> {
    vec![
        ExtensionKind::new("ContainerRuntime", "containerruntimes"),
        ExtensionKind::new("ControlPlane", "controlplanes"),
        ExtensionKind::new("Extension", "extensions"),
        ExtensionKind::new("Infrastructure", "infrastructures"),
        ExtensionKind::new("Network", "networks"),
        ExtensionKind::new("OperatingSystemConfig", "operatingsystemconfigs"),
        ExtensionKind::new("Worker", "workers"),
    ]
}

/// An extension object reduced to what health aggregation needs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExtensionObject {
    pub kind: String,
    pub name: String,
    pub namespace: String,
    pub conditions: Vec<Condition>,
}

impl ExtensionObject {
    /// Project a dynamic object onto its status conditions.
    ///
    /// Objects without a status yield no conditions; malformed conditions are
    /// an error since they cannot be attributed to any parent condition.
    pub fn from_dynamic(kind: &str, object: &DynamicObject) -> Result<Self> {
        let conditions = match object.data.get("status").and_then(|s| s.get("conditions")) {
            Some(raw) => serde_json::from_value(raw.clone())?,
            None => Vec::new(),
        };
        Ok(Self {
            kind: kind.to_string(),
            name: object.name_any(),
            namespace: object.namespace().unwrap_or_default(),
            conditions,
        })
    }
}

/// Worker extension resource managing the machines of a shoot.
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "extensions.gardener.cloud",
    version = "v1alpha1",
    kind = "Worker",
    plural = "workers",
    status = "WorkerStatus",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct WorkerSpec {
    /// Provider type of the worker.
    #[serde(default, rename = "type")]
    pub worker_type: String,
}

/// Observed state of a worker.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct WorkerStatus {
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

impl Worker {
    /// Whether machines of any pool are currently being replaced
    pub fn rolling_update_in_progress(&self) -> bool {
        self.status
            .as_ref()
            .and_then(|s| get_condition(&s.conditions, WORKER_ROLLING_UPDATE))
            .is_some_and(|c| c.status == ConditionStatus::True)
    }
}
