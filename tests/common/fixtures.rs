//! Test fixtures and builder patterns for shoots and the objects their
//! health checks look at.

use std::collections::BTreeMap;

use jiff::{SignedDuration, Timestamp};
use k8s_openapi::api::apps::v1::{
    DaemonSet, DaemonSetStatus, Deployment, DeploymentCondition, DeploymentSpec, DeploymentStatus, StatefulSet,
    StatefulSetSpec, StatefulSetStatus,
};
use k8s_openapi::api::core::v1::{
    ContainerState, ContainerStateRunning, ContainerStatus, Node, NodeCondition, NodeStatus,
    NodeSystemInfo, Pod, PodStatus,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use shoot_care::care::required;
use shoot_care::crd::{
    Condition, ConditionStatus, Etcd, EtcdSpec, EtcdStatus, Hibernation, LastOperation,
    LastOperationState, LastOperationType, ManagedResource, ManagedResourceSpec,
    ManagedResourceStatus, RESOURCES_APPLIED, RESOURCES_HEALTHY, Shoot, ShootSpec, ShootStatus,
    WorkerPool,
};

/// Fixed point in time all tests count from.
pub fn epoch() -> Timestamp {
    Timestamp::from_second(1_700_000_000).expect("valid timestamp")
}

/// `epoch()` shifted by `secs`.
pub fn at(secs: i64) -> Timestamp {
    epoch()
        .checked_add(SignedDuration::from_secs(secs))
        .expect("valid timestamp")
}

fn meta(name: &str, namespace: &str) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: Some(namespace.to_string()),
        generation: Some(1),
        ..Default::default()
    }
}

/// Builder for creating Shoot test fixtures.
///
/// # Example
/// ```
/// let shoot = ShootBuilder::new("aws")
///     .pool("worker", 1, 3)
///     .last_operation(LastOperationType::Reconcile, LastOperationState::Succeeded, at(-3600))
///     .build();
/// ```
#[derive(Clone, Debug)]
pub struct ShootBuilder {
    name: String,
    namespace: String,
    version: String,
    pools: Vec<WorkerPool>,
    hibernated: bool,
    purpose: Option<String>,
    conditions: Vec<Condition>,
    last_operation: Option<LastOperation>,
    annotations: BTreeMap<String, String>,
}

impl ShootBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: "garden-dev".to_string(),
            version: "1.30.2".to_string(),
            pools: Vec::new(),
            hibernated: false,
            purpose: None,
            conditions: Vec::new(),
            last_operation: None,
            annotations: BTreeMap::new(),
        }
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Add a worker pool.
    pub fn pool(mut self, name: &str, minimum: i32, maximum: i32) -> Self {
        self.pools.push(WorkerPool {
            name: name.to_string(),
            minimum,
            maximum,
            kubernetes: None,
        });
        self
    }

    pub fn hibernated(mut self) -> Self {
        self.hibernated = true;
        self
    }

    pub fn purpose(mut self, purpose: &str) -> Self {
        self.purpose = Some(purpose.to_string());
        self
    }

    /// Set a current condition of the shoot.
    pub fn condition(mut self, condition: Condition) -> Self {
        self.conditions.retain(|c| c.r#type != condition.r#type);
        self.conditions.push(condition);
        self
    }

    pub fn last_operation(
        mut self,
        operation_type: LastOperationType,
        state: LastOperationState,
        last_update_time: Timestamp,
    ) -> Self {
        self.last_operation = Some(LastOperation {
            operation_type,
            state,
            description: String::new(),
            progress: 100,
            last_update_time,
        });
        self
    }

    pub fn annotation(mut self, key: &str, value: &str) -> Self {
        self.annotations.insert(key.to_string(), value.to_string());
        self
    }

    pub fn build(self) -> Shoot {
        let spec = ShootSpec {
            hibernation: self.hibernated.then_some(Hibernation {
                enabled: Some(true),
            }),
            kubernetes: shoot_care::crd::KubernetesSettings {
                version: self.version,
                vertical_pod_autoscaler: None,
            },
            provider: shoot_care::crd::Provider {
                provider_type: "aws".to_string(),
                workers: self.pools,
            },
            purpose: self.purpose,
            monitoring: None,
        };
        let mut shoot = Shoot::new(&self.name, spec);
        shoot.metadata.namespace = Some(self.namespace);
        shoot.metadata.annotations = Some(self.annotations);
        shoot.status = Some(ShootStatus {
            conditions: self.conditions,
            last_operation: self.last_operation,
            ..Default::default()
        });
        shoot
    }
}

/// A shoot condition.
pub fn condition(
    condition_type: &str,
    status: ConditionStatus,
    reason: &str,
    since: Timestamp,
) -> Condition {
    Condition {
        r#type: condition_type.to_string(),
        status,
        reason: reason.to_string(),
        message: String::new(),
        codes: Vec::new(),
        last_transition_time: since,
        last_update_time: since,
    }
}

/// A deployment with all replicas available.
pub fn deployment(name: &str) -> Deployment {
    Deployment {
        metadata: meta(name, "shoot--dev--aws"),
        spec: Some(DeploymentSpec {
            replicas: Some(1),
            ..Default::default()
        }),
        status: Some(DeploymentStatus {
            observed_generation: Some(1),
            replicas: Some(1),
            available_replicas: Some(1),
            conditions: Some(vec![DeploymentCondition {
                type_: "Available".to_string(),
                status: "True".to_string(),
                ..Default::default()
            }]),
            ..Default::default()
        }),
    }
}

/// A deployment without available replicas.
pub fn unavailable_deployment(name: &str) -> Deployment {
    let mut deployment = deployment(name);
    if let Some(status) = deployment.status.as_mut() {
        status.available_replicas = Some(0);
        status.conditions = Some(vec![DeploymentCondition {
            type_: "Available".to_string(),
            status: "False".to_string(),
            reason: Some("MinimumReplicasUnavailable".to_string()),
            message: Some("Deployment does not have minimum availability.".to_string()),
            ..Default::default()
        }]);
    }
    deployment
}

/// A stateful set with all replicas ready.
pub fn stateful_set(name: &str) -> StatefulSet {
    StatefulSet {
        metadata: meta(name, "shoot--dev--aws"),
        spec: Some(StatefulSetSpec {
            replicas: Some(1),
            ..Default::default()
        }),
        status: Some(StatefulSetStatus {
            observed_generation: Some(1),
            replicas: 1,
            ready_replicas: Some(1),
            ..Default::default()
        }),
    }
}

/// A system component daemon set in the shoot's `kube-system` with
/// `available` of `desired` pods available.
pub fn daemon_set(name: &str, desired: i32, available: i32) -> DaemonSet {
    let mut metadata = meta(name, "kube-system");
    metadata.labels = Some(BTreeMap::from([(
        "gardener.cloud/role".to_string(),
        "system-component".to_string(),
    )]));
    DaemonSet {
        metadata,
        spec: None,
        status: Some(DaemonSetStatus {
            observed_generation: Some(1),
            desired_number_scheduled: desired,
            current_number_scheduled: desired,
            number_available: Some(available),
            number_ready: available,
            ..Default::default()
        }),
    }
}

/// A ready etcd.
pub fn etcd(name: &str) -> Etcd {
    let mut etcd = Etcd::new(name, EtcdSpec { replicas: 3 });
    etcd.metadata.namespace = Some("shoot--dev--aws".to_string());
    etcd.status = Some(EtcdStatus {
        ready: Some(true),
        last_error: None,
        observed_generation: Some(1),
    });
    etcd
}

/// A managed resource that has been applied and is healthy.
pub fn managed_resource(name: &str) -> ManagedResource {
    let mut mr = ManagedResource::new(name, ManagedResourceSpec::default());
    mr.metadata.namespace = Some("shoot--dev--aws".to_string());
    mr.metadata.generation = Some(1);
    mr.status = Some(ManagedResourceStatus {
        observed_generation: 1,
        conditions: vec![
            condition(RESOURCES_APPLIED, ConditionStatus::True, "ApplySucceeded", epoch()),
            condition(RESOURCES_HEALTHY, ConditionStatus::True, "ResourcesHealthy", epoch()),
        ],
    });
    mr
}

/// A ready node of `pool` running `kubelet_version`.
pub fn node(name: &str, pool: &str, kubelet_version: &str) -> Node {
    Node {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            labels: Some(BTreeMap::from([(
                "worker.gardener.cloud/pool".to_string(),
                pool.to_string(),
            )])),
            ..Default::default()
        },
        spec: None,
        status: Some(NodeStatus {
            conditions: Some(vec![
                NodeCondition {
                    type_: "Ready".to_string(),
                    status: "True".to_string(),
                    ..Default::default()
                },
                NodeCondition {
                    type_: "DiskPressure".to_string(),
                    status: "False".to_string(),
                    ..Default::default()
                },
            ]),
            node_info: Some(NodeSystemInfo {
                kubelet_version: kubelet_version.to_string(),
                ..Default::default()
            }),
            ..Default::default()
        }),
    }
}

/// A running tunnel pod.
pub fn tunnel_pod(name: &str) -> Pod {
    Pod {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some("kube-system".to_string()),
            labels: Some(BTreeMap::from([("app".to_string(), "vpn-shoot".to_string())])),
            ..Default::default()
        },
        spec: None,
        status: Some(PodStatus {
            phase: Some("Running".to_string()),
            container_statuses: Some(vec![ContainerStatus {
                name: "vpn-shoot".to_string(),
                ready: true,
                state: Some(ContainerState {
                    running: Some(ContainerStateRunning::default()),
                    ..Default::default()
                }),
                ..Default::default()
            }]),
            ..Default::default()
        }),
    }
}

/// Healthy control plane deployments for `shoot`, including monitoring.
pub fn control_plane_deployments(shoot: &Shoot) -> Vec<Deployment> {
    required::control_plane_deployments(shoot, false)
        .into_iter()
        .chain(required::monitoring_deployments(shoot))
        .map(deployment)
        .collect()
}

/// Healthy monitoring and logging stateful sets for `shoot`.
pub fn control_plane_stateful_sets(shoot: &Shoot, logging_enabled: bool) -> Vec<StatefulSet> {
    required::monitoring_stateful_sets(shoot)
        .into_iter()
        .chain(required::logging_stateful_sets(shoot, logging_enabled))
        .map(stateful_set)
        .collect()
}
