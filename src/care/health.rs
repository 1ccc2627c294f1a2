//! Health predicates for single observed objects.
//!
//! Each predicate inspects the status an object reports and either accepts
//! it or returns the first problem found as a human-readable message.

use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, StatefulSet};
use k8s_openapi::api::core::v1::{Node, Pod};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::ResourceExt;
use thiserror::Error;

use crate::crd::Etcd;

/// Reason an object is considered unhealthy.
#[derive(Clone, Debug, Eq, PartialEq, Error)]
#[error("{0}")]
pub struct Unhealthy(pub String);

/// Result of a health predicate.
pub type Health = std::result::Result<(), Unhealthy>;

const CONDITION_TRUE: &str = "True";
const CONDITION_FALSE: &str = "False";

const DEPLOYMENT_AVAILABLE: &str = "Available";
const DEPLOYMENT_REPLICA_FAILURE: &str = "ReplicaFailure";

const NODE_READY: &str = "Ready";
const NODE_FALSE_CONDITIONS: [&str; 4] = [
    "DiskPressure",
    "MemoryPressure",
    "NetworkUnavailable",
    "PIDPressure",
];

/// A status condition as reported by a built-in Kubernetes kind.
struct ObservedCondition<'a> {
    status: &'a str,
    reason: Option<&'a str>,
    message: Option<&'a str>,
}

fn check_observed_generation(observed: Option<i64>, generation: Option<i64>) -> Health {
    let observed = observed.unwrap_or(0);
    let generation = generation.unwrap_or(0);
    if observed < generation {
        return Err(Unhealthy(format!(
            "observed generation outdated ({observed}/{generation})"
        )));
    }
    Ok(())
}

fn check_condition_state(
    condition_type: &str,
    expected: &str,
    condition: &ObservedCondition<'_>,
) -> Health {
    if condition.status != expected {
        return Err(Unhealthy(format!(
            "condition {:?} has invalid status {} (expected {}) due to {}: {}",
            condition_type,
            condition.status,
            expected,
            condition.reason.unwrap_or_default(),
            condition.message.unwrap_or_default()
        )));
    }
    Ok(())
}

fn required_condition_missing(condition_type: &str) -> Unhealthy {
    Unhealthy(format!("condition {condition_type:?} is missing"))
}

/// Check that a deployment has rolled out and serves all its replicas.
pub fn check_deployment(deployment: &Deployment) -> Health {
    let status = deployment.status.clone().unwrap_or_default();
    check_observed_generation(status.observed_generation, deployment.metadata.generation)?;

    let conditions = status.conditions.unwrap_or_default();
    let find = |condition_type: &str| {
        conditions
            .iter()
            .find(|c| c.type_ == condition_type)
            .map(|c| ObservedCondition {
                status: c.status.as_str(),
                reason: c.reason.as_deref(),
                message: c.message.as_deref(),
            })
    };

    let available =
        find(DEPLOYMENT_AVAILABLE).ok_or_else(|| required_condition_missing(DEPLOYMENT_AVAILABLE))?;
    check_condition_state(DEPLOYMENT_AVAILABLE, CONDITION_TRUE, &available)?;

    if let Some(failure) = find(DEPLOYMENT_REPLICA_FAILURE) {
        check_condition_state(DEPLOYMENT_REPLICA_FAILURE, CONDITION_FALSE, &failure)?;
    }

    let desired = deployment
        .spec
        .as_ref()
        .and_then(|s| s.replicas)
        .unwrap_or(1);
    let available_replicas = status.available_replicas.unwrap_or(0);
    if available_replicas < desired {
        return Err(Unhealthy(format!(
            "not enough available replicas ({available_replicas}/{desired})"
        )));
    }
    Ok(())
}

/// Check that a stateful set has enough ready replicas.
pub fn check_stateful_set(stateful_set: &StatefulSet) -> Health {
    let status = stateful_set.status.clone().unwrap_or_default();
    check_observed_generation(status.observed_generation, stateful_set.metadata.generation)?;

    let replicas = stateful_set
        .spec
        .as_ref()
        .and_then(|s| s.replicas)
        .unwrap_or(1);
    let ready = status.ready_replicas.unwrap_or(0);
    if replicas > ready {
        return Err(Unhealthy(format!(
            "not enough ready replicas ({ready}/{replicas})"
        )));
    }
    Ok(())
}

/// Number of pods of a daemon set that may be unavailable during a rolling update.
fn daemon_set_max_unavailable(daemon_set: &DaemonSet, desired: i32) -> i32 {
    if desired == 0 {
        return 0;
    }
    let Some(strategy) = daemon_set
        .spec
        .as_ref()
        .and_then(|s| s.update_strategy.as_ref())
    else {
        return 0;
    };
    if strategy.type_.as_deref() != Some("RollingUpdate") {
        return 0;
    }
    let Some(rolling_update) = strategy.rolling_update.as_ref() else {
        return 0;
    };

    match rolling_update.max_unavailable.as_ref() {
        None => 1,
        Some(IntOrString::Int(value)) => *value,
        Some(IntOrString::String(value)) => value
            .strip_suffix('%')
            .and_then(|p| p.trim().parse::<i64>().ok())
            .and_then(|percent| i64::from(desired).checked_mul(percent.clamp(0, 100)))
            .and_then(|scaled| i32::try_from(scaled / 100).ok())
            .unwrap_or(0),
    }
}

/// Check that a daemon set runs on all nodes it should run on.
pub fn check_daemon_set(daemon_set: &DaemonSet) -> Health {
    let status = daemon_set.status.clone().unwrap_or_default();
    check_observed_generation(status.observed_generation, daemon_set.metadata.generation)?;

    let desired = status.desired_number_scheduled;
    let max_unavailable = daemon_set_max_unavailable(daemon_set, desired);

    let required_available = desired - max_unavailable;
    if status.current_number_scheduled < required_available {
        return Err(Unhealthy(format!(
            "not enough scheduled pods ({}/{})",
            status.current_number_scheduled, required_available
        )));
    }

    if status.number_misscheduled > 0 {
        return Err(Unhealthy(format!(
            "misscheduled pods found ({})",
            status.number_misscheduled
        )));
    }

    let unavailable = desired - status.number_available.unwrap_or(0);
    if unavailable > max_unavailable {
        return Err(Unhealthy(format!(
            "too many unavailable pods found ({}/{}, only max. {} unavailable pods allowed)",
            unavailable, status.current_number_scheduled, max_unavailable
        )));
    }
    Ok(())
}

/// Check that a node is ready and reports no pressure.
pub fn check_node(node: &Node) -> Health {
    let conditions = node
        .status
        .as_ref()
        .and_then(|s| s.conditions.clone())
        .unwrap_or_default();
    let find = |condition_type: &str| {
        conditions
            .iter()
            .find(|c| c.type_ == condition_type)
            .map(|c| ObservedCondition {
                status: c.status.as_str(),
                reason: c.reason.as_deref(),
                message: c.message.as_deref(),
            })
    };

    let ready = find(NODE_READY).ok_or_else(|| required_condition_missing(NODE_READY))?;
    check_condition_state(NODE_READY, CONDITION_TRUE, &ready)?;

    for condition_type in NODE_FALSE_CONDITIONS {
        if let Some(condition) = find(condition_type) {
            check_condition_state(condition_type, CONDITION_FALSE, &condition)?;
        }
    }
    Ok(())
}

/// Check that an etcd cluster is ready and reports no error.
pub fn check_etcd(etcd: &Etcd) -> Health {
    let status = etcd.status.clone().unwrap_or_default();
    if let Some(last_error) = status.last_error {
        return Err(Unhealthy(last_error));
    }
    if status.ready != Some(true) {
        return Err(Unhealthy(format!(
            "etcd {:?} is not ready yet",
            etcd.name_any()
        )));
    }
    Ok(())
}

/// Whether a pod is running with all containers started.
pub fn is_pod_running(pod: &Pod) -> bool {
    let Some(status) = pod.status.as_ref() else {
        return false;
    };
    if status.phase.as_deref() != Some("Running") {
        return false;
    }
    status
        .container_statuses
        .as_ref()
        .is_none_or(|containers| containers.iter().all(|c| c.state.as_ref().is_some_and(|s| s.running.is_some())))
}

/// Kubelet version a node reports.
pub fn kubelet_version(node: &Node) -> Option<&str> {
    node.status
        .as_ref()
        .and_then(|s| s.node_info.as_ref())
        .map(|info| info.kubelet_version.as_str())
}
