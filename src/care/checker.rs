//! Checks that turn observed objects into condition updates.
//!
//! Every check returns `None` when everything it looked at is healthy and
//! the updated condition of the first failure otherwise. Callers chain
//! checks in a fixed order and stop at the first `Some`.

use std::collections::BTreeMap;

use jiff::{SignedDuration, Timestamp};
use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, StatefulSet};
use k8s_openapi::api::core::v1::Node;
use kube::ResourceExt;

use super::condition::{advance, succeeded, updated_condition};
use super::extensions::ExtensionCondition;
use super::health::{
    Unhealthy, check_daemon_set, check_deployment, check_etcd, check_node, check_stateful_set,
    kubelet_version,
};
use super::required::{RequiredSet, missing};
use crate::config::Thresholds;
use crate::crd::{
    Condition, ConditionStatus, Etcd, LastOperation, ManagedResource, RESOURCES_APPLIED,
    RESOURCES_HEALTHY, Shoot, get_condition,
};
use crate::error::Result;

/// Label carrying the worker pool a node belongs to.
pub const WORKER_POOL_LABEL: &str = "worker.gardener.cloud/pool";

/// Evaluates observations against the previous conditions of one shoot.
#[derive(Clone, Debug)]
pub struct HealthChecker<'a> {
    thresholds: &'a Thresholds,
    staleness_threshold: Option<SignedDuration>,
    last_operation: Option<&'a LastOperation>,
    now: Timestamp,
}

impl<'a> HealthChecker<'a> {
    pub fn new(
        thresholds: &'a Thresholds,
        staleness_threshold: Option<SignedDuration>,
        last_operation: Option<&'a LastOperation>,
        now: Timestamp,
    ) -> Self {
        Self {
            thresholds,
            staleness_threshold,
            last_operation,
            now,
        }
    }

    pub fn now(&self) -> Timestamp {
        self.now
    }

    /// Advance `condition` after a failed observation.
    pub fn failed_condition(
        &self,
        condition: &Condition,
        reason: &str,
        message: &str,
        codes: Vec<String>,
    ) -> Condition {
        advance(
            condition,
            reason,
            message,
            codes,
            self.thresholds,
            self.last_operation,
            self.now,
        )
    }

    /// Mark `condition` healthy.
    pub fn succeeded(&self, condition: &Condition, reason: &str, message: &str) -> Condition {
        succeeded(condition, reason, message, self.now)
    }

    fn check_required(
        &self,
        condition: &Condition,
        required: &RequiredSet,
        actual: &[String],
        reason: &str,
        noun: &str,
    ) -> Option<Condition> {
        let missing = missing(required, actual);
        if missing.is_empty() {
            return None;
        }
        Some(self.failed_condition(
            condition,
            reason,
            &format!("Missing required {noun}: {missing:?}"),
            Vec::new(),
        ))
    }

    /// Fail if any required deployment does not exist.
    pub fn check_required_deployments(
        &self,
        condition: &Condition,
        required: &RequiredSet,
        deployments: &[Deployment],
    ) -> Option<Condition> {
        let actual: Vec<String> = deployments.iter().map(ResourceExt::name_any).collect();
        self.check_required(condition, required, &actual, "DeploymentMissing", "deployments")
    }

    /// Fail on the first unhealthy deployment.
    pub fn check_deployments(
        &self,
        condition: &Condition,
        deployments: &[Deployment],
    ) -> Option<Condition> {
        self.first_unhealthy(condition, deployments, check_deployment, "DeploymentUnhealthy", "Deployment")
    }

    /// Fail if any required etcd does not exist.
    pub fn check_required_etcds(
        &self,
        condition: &Condition,
        required: &RequiredSet,
        etcds: &[Etcd],
    ) -> Option<Condition> {
        let actual: Vec<String> = etcds.iter().map(ResourceExt::name_any).collect();
        self.check_required(condition, required, &actual, "EtcdMissing", "etcds")
    }

    /// Fail on the first unhealthy etcd.
    pub fn check_etcds(&self, condition: &Condition, etcds: &[Etcd]) -> Option<Condition> {
        self.first_unhealthy(condition, etcds, check_etcd, "EtcdUnhealthy", "Etcd")
    }

    /// Fail if any required stateful set does not exist.
    pub fn check_required_stateful_sets(
        &self,
        condition: &Condition,
        required: &RequiredSet,
        stateful_sets: &[StatefulSet],
    ) -> Option<Condition> {
        let actual: Vec<String> = stateful_sets.iter().map(ResourceExt::name_any).collect();
        self.check_required(condition, required, &actual, "StatefulSetMissing", "stateful sets")
    }

    /// Fail on the first unhealthy stateful set.
    pub fn check_stateful_sets(
        &self,
        condition: &Condition,
        stateful_sets: &[StatefulSet],
    ) -> Option<Condition> {
        self.first_unhealthy(
            condition,
            stateful_sets,
            check_stateful_set,
            "StatefulSetUnhealthy",
            "Stateful set",
        )
    }

    /// Fail on the first unhealthy daemon set.
    pub fn check_daemon_sets(
        &self,
        condition: &Condition,
        daemon_sets: &[DaemonSet],
    ) -> Option<Condition> {
        self.first_unhealthy(
            condition,
            daemon_sets,
            check_daemon_set,
            "DaemonSetUnhealthy",
            "Daemon set",
        )
    }

    fn first_unhealthy<K: ResourceExt>(
        &self,
        condition: &Condition,
        objects: &[K],
        predicate: fn(&K) -> std::result::Result<(), Unhealthy>,
        reason: &str,
        noun: &str,
    ) -> Option<Condition> {
        objects.iter().find_map(|object| {
            predicate(object).err().map(|e| {
                self.failed_condition(
                    condition,
                    reason,
                    &format!("{noun} {:?} is unhealthy: {e}", object.name_any()),
                    Vec::new(),
                )
            })
        })
    }

    /// Fail unless the managed resource has been applied and is healthy.
    pub fn check_managed_resource(
        &self,
        condition: &Condition,
        managed_resource: &ManagedResource,
    ) -> Option<Condition> {
        let key = format!(
            "{}/{}",
            managed_resource.namespace().unwrap_or_default(),
            managed_resource.name_any()
        );
        let status = managed_resource.status.clone().unwrap_or_default();
        let generation = managed_resource.metadata.generation.unwrap_or(0);
        if status.observed_generation < generation {
            return Some(self.failed_condition(
                condition,
                "OutdatedObservedGeneration",
                &format!(
                    "observed generation of managed resource {key} outdated ({}/{generation})",
                    status.observed_generation
                ),
                Vec::new(),
            ));
        }

        for condition_type in [RESOURCES_APPLIED, RESOURCES_HEALTHY] {
            let Some(observed) = get_condition(&status.conditions, condition_type) else {
                return Some(self.failed_condition(
                    condition,
                    "MissingManagedResourceCondition",
                    &format!("condition {condition_type} for managed resource {key} is missing"),
                    Vec::new(),
                ));
            };
            if !observed.is_true() {
                return Some(self.failed_condition(
                    condition,
                    &observed.reason,
                    &observed.message,
                    observed.codes.clone(),
                ));
            }
        }
        None
    }

    /// Check the nodes of every worker pool of the shoot.
    ///
    /// Per pool, node health is checked first, then kubelet versions, then
    /// the node count against the pool's minimum and maximum.
    pub fn check_cluster_nodes(
        &self,
        condition: &Condition,
        shoot: &Shoot,
        nodes: &[Node],
    ) -> Option<Condition> {
        let mut by_pool: BTreeMap<&str, Vec<&Node>> = BTreeMap::new();
        for node in nodes {
            if let Some(pool) = node.labels().get(WORKER_POOL_LABEL) {
                by_pool.entry(pool.as_str()).or_default().push(node);
            }
        }

        for pool in &shoot.spec.provider.workers {
            let pool_nodes = by_pool.get(pool.name.as_str()).map(Vec::as_slice).unwrap_or_default();

            for node in pool_nodes {
                if let Err(e) = check_node(node) {
                    return Some(self.failed_condition(
                        condition,
                        "NodeUnhealthy",
                        &format!(
                            "Node {:?} in worker group {:?} is unhealthy: {e}",
                            node.name_any(),
                            pool.name
                        ),
                        Vec::new(),
                    ));
                }

                let desired = shoot.pool_kubernetes_version(pool);
                if let Some(failed) = self.check_kubelet_version(condition, node, desired) {
                    return Some(failed);
                }
            }

            let registered = i32::try_from(pool_nodes.len()).unwrap_or(i32::MAX);
            if registered < pool.minimum {
                return Some(self.failed_condition(
                    condition,
                    "MissingNodes",
                    &format!(
                        "Not enough worker nodes registered in worker pool {:?} to meet minimum desired machine count. ({registered}/{})",
                        pool.name, pool.minimum
                    ),
                    Vec::new(),
                ));
            }
            if registered > pool.maximum {
                return Some(self.failed_condition(
                    condition,
                    "TooManyNodes",
                    &format!(
                        "Too many worker nodes registered in worker pool {:?}, exceeding maximum desired machine count. ({registered}/{})",
                        pool.name, pool.maximum
                    ),
                    Vec::new(),
                ));
            }
        }
        None
    }

    fn check_kubelet_version(
        &self,
        condition: &Condition,
        node: &Node,
        desired: &str,
    ) -> Option<Condition> {
        let actual = kubelet_version(node).unwrap_or_default();
        let parsed = parse_version(actual).and_then(|a| parse_version(desired).map(|d| (a, d)));
        match parsed {
            Err(e) => Some(self.failed_condition(
                condition,
                "VersionParseError",
                &format!("Error checking kubelet version of node {:?}: {e}", node.name_any()),
                Vec::new(),
            )),
            Ok((actual_version, desired_version)) if actual_version != desired_version => {
                Some(self.failed_condition(
                    condition,
                    "KubeletVersionMismatch",
                    &format!(
                        "The kubelet version for node {:?} ({actual}) does not match the desired Kubernetes version ({desired})",
                        node.name_any()
                    ),
                    Vec::new(),
                ))
            }
            Ok(_) => None,
        }
    }

    /// Propagate the first unhealthy extension report.
    ///
    /// Reports not updated within the staleness threshold are `Unknown`,
    /// progressing reports stay `Progressing`, everything else not `True`
    /// is a failure.
    pub fn check_extension_conditions(
        &self,
        condition: &Condition,
        extension_conditions: &[ExtensionCondition],
    ) -> Option<Condition> {
        for ext in extension_conditions {
            let kind = &ext.extension_kind;
            let origin = format!("{} extension ({}/{})", kind, ext.extension_namespace, ext.extension_name);

            if let Some(threshold) = self.staleness_threshold {
                let age = self.now.duration_since(ext.condition.last_update_time);
                if age > threshold {
                    return Some(updated_condition(
                        condition,
                        ConditionStatus::Unknown,
                        &format!("{kind}OutdatedHealthCheckReport"),
                        &format!(
                            "{origin} reports an outdated health status (last updated: {age} ago at {}).",
                            ext.condition.last_update_time
                        ),
                        Vec::new(),
                        self.now,
                    ));
                }
            }

            match ext.condition.status {
                ConditionStatus::True => {}
                ConditionStatus::Progressing => {
                    return Some(updated_condition(
                        condition,
                        ConditionStatus::Progressing,
                        &format!("{kind}{}", ext.condition.reason),
                        &ext.condition.message,
                        ext.condition.codes.clone(),
                        self.now,
                    ));
                }
                ConditionStatus::False | ConditionStatus::Unknown => {
                    return Some(self.failed_condition(
                        condition,
                        &format!("{kind}UnhealthyReport"),
                        &format!("{origin} reports failing health check: {}", ext.condition.message),
                        ext.condition.codes.clone(),
                    ));
                }
            }
        }
        None
    }

    /// Condition for the outcome of the API server `/healthz` probe.
    pub fn check_api_server_availability(
        &self,
        condition: &Condition,
        probe: Result<u16>,
    ) -> Condition {
        match probe {
            Err(e) => self.failed_condition(
                condition,
                "HealthzRequestFailed",
                &format!("Request to Shoot API server /healthz endpoint failed due to {e}"),
                Vec::new(),
            ),
            Ok(200) => self.succeeded(
                condition,
                "HealthzRequestSucceeded",
                "API server /healthz endpoint responded with success status code.",
            ),
            Ok(code) => self.failed_condition(
                condition,
                "HealthzRequestError",
                &format!("API server /healthz endpoint check returned a non ok status code {code}."),
                Vec::new(),
            ),
        }
    }
}

fn parse_version(version: &str) -> std::result::Result<semver::Version, semver::Error> {
    let mut parsed = semver::Version::parse(version.trim_start_matches('v'))?;
    parsed.build = semver::BuildMetadata::EMPTY;
    Ok(parsed)
}
