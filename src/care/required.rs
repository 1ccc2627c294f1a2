//! Names of the objects a healthy control plane must consist of.

use std::collections::BTreeSet;

use crate::crd::{ETCD_EVENTS, ETCD_MAIN, Shoot};

pub const GARDENER_RESOURCE_MANAGER: &str = "gardener-resource-manager";
pub const KUBE_APISERVER: &str = "kube-apiserver";
pub const KUBE_CONTROLLER_MANAGER: &str = "kube-controller-manager";
pub const KUBE_SCHEDULER: &str = "kube-scheduler";
pub const CLUSTER_AUTOSCALER: &str = "cluster-autoscaler";

pub const VPA_ADMISSION_CONTROLLER: &str = "vpa-admission-controller";
pub const VPA_RECOMMENDER: &str = "vpa-recommender";
pub const VPA_UPDATER: &str = "vpa-updater";

pub const KUBE_STATE_METRICS: &str = "kube-state-metrics";
pub const PLUTONO: &str = "plutono";
pub const PROMETHEUS: &str = "prometheus";
pub const ALERTMANAGER: &str = "alertmanager";
pub const VALI: &str = "vali";

/// Set of object names expected for one workload role.
pub type RequiredSet = BTreeSet<&'static str>;

/// Control plane deployments expected for the shoot.
///
/// The cluster autoscaler is not required while workers are rolled, since it
/// is scaled down for the duration of the update.
pub fn control_plane_deployments(shoot: &Shoot, rolling_update: bool) -> RequiredSet {
    let mut required = RequiredSet::from([
        GARDENER_RESOURCE_MANAGER,
        KUBE_APISERVER,
        KUBE_CONTROLLER_MANAGER,
        KUBE_SCHEDULER,
    ]);
    if shoot.wants_cluster_autoscaler() && !rolling_update {
        required.insert(CLUSTER_AUTOSCALER);
    }
    if shoot.wants_vertical_pod_autoscaler() {
        required.extend([VPA_ADMISSION_CONTROLLER, VPA_RECOMMENDER, VPA_UPDATER]);
    }
    required
}

/// Etcd clusters every control plane runs.
pub fn control_plane_etcds() -> RequiredSet {
    RequiredSet::from([ETCD_MAIN, ETCD_EVENTS])
}

/// Monitoring deployments, empty for testing clusters.
pub fn monitoring_deployments(shoot: &Shoot) -> RequiredSet {
    if shoot.is_testing() {
        return RequiredSet::new();
    }
    RequiredSet::from([KUBE_STATE_METRICS, PLUTONO])
}

/// Monitoring stateful sets, empty for testing clusters.
pub fn monitoring_stateful_sets(shoot: &Shoot) -> RequiredSet {
    if shoot.is_testing() {
        return RequiredSet::new();
    }
    let mut required = RequiredSet::from([PROMETHEUS]);
    if shoot.wants_alertmanager() {
        required.insert(ALERTMANAGER);
    }
    required
}

/// Logging stateful sets.
pub fn logging_stateful_sets(shoot: &Shoot, logging_enabled: bool) -> RequiredSet {
    if !logging_enabled || shoot.is_testing() {
        return RequiredSet::new();
    }
    RequiredSet::from([VALI])
}

/// Required names not found among the observed ones, in sorted order.
pub fn missing<'a, I, S>(required: &RequiredSet, actual: I) -> Vec<&'static str>
where
    I: IntoIterator<Item = &'a S>,
    S: AsRef<str> + ?Sized + 'a,
{
    let actual: BTreeSet<&str> = actual.into_iter().map(AsRef::as_ref).collect();
    required
        .iter()
        .copied()
        .filter(|name| !actual.contains(name))
        .collect()
}
