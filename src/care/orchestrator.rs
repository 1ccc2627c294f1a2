//! Computes the four health conditions of a shoot.
//!
//! The conditions are checked concurrently and independently: a check that
//! cannot be performed turns its own condition `Unknown` while the others
//! still report their results.

use std::sync::Arc;

use futures::future::try_join_all;
use jiff::Timestamp;
use kube::ResourceExt;
use tracing::{debug, info, warn};

use super::checker::HealthChecker;
use super::condition::{
    ConditionBuilder, REASON_NOT_CHECKED, new_condition_or_error, pardon, unknown_error,
    updated_condition,
};
use super::extensions::ExtensionConditions;
use super::reader::{SeedReader, ShootClientInit, ShootReader};
use super::required;
use super::tunnel::running_tunnel_pod;
use crate::config::{CareConfig, Thresholds};
use crate::crd::{
    API_SERVER_AVAILABLE, CONTROL_PLANE_HEALTHY, Condition, ConditionStatus, EVERY_NODE_READY,
    LastOperation, LastOperationType, SYSTEM_COMPONENTS_HEALTHY, Shoot,
};
use crate::error::{Error, Result};
use crate::flow::{self, task};
use crate::metrics::CareMetrics;

/// Namespace of the tunnel pods in the shoot.
const TUNNEL_NAMESPACE: &str = "kube-system";

/// Extension health reports, or why they could not be read.
type ExtensionReports = std::result::Result<ExtensionConditions, String>;

fn reports(extensions: &ExtensionReports) -> Result<&ExtensionConditions> {
    extensions
        .as_ref()
        .map_err(|e| Error::Transient(format!("Failed to read extension health reports: {e}")))
}

/// The health conditions of a shoot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShootConditions {
    pub api_server_available: Condition,
    pub control_plane_healthy: Condition,
    pub every_node_ready: Condition,
    pub system_components_healthy: Condition,
}

impl ShootConditions {
    fn map(self, f: impl Fn(Condition) -> Condition) -> Self {
        Self {
            api_server_available: f(self.api_server_available),
            control_plane_healthy: f(self.control_plane_healthy),
            every_node_ready: f(self.every_node_ready),
            system_components_healthy: f(self.system_components_healthy),
        }
    }

    pub fn into_vec(self) -> Vec<Condition> {
        vec![
            self.api_server_available,
            self.control_plane_healthy,
            self.every_node_ready,
            self.system_components_healthy,
        ]
    }
}

/// Message for conditions that cannot be checked because the control plane
/// is not running.
pub fn control_plane_not_running_message(last_operation: Option<&LastOperation>) -> &'static str {
    match last_operation {
        Some(op) if op.operation_type == LastOperationType::Create && !op.succeeded() => {
            "Shoot control plane has not been fully created yet."
        }
        None => "Shoot control plane has not been fully created yet.",
        Some(op) if op.operation_type == LastOperationType::Delete => {
            "Shoot control plane is being deleted."
        }
        Some(_) => "Shoot control plane is not running at the moment.",
    }
}

/// Health check of one shoot.
pub struct Health {
    shoot: Shoot,
    config: CareConfig,
    seed: Arc<dyn SeedReader>,
    shoot_client: Arc<dyn ShootClientInit>,
    metrics: Option<Arc<CareMetrics>>,
}

impl Health {
    pub fn new(
        shoot: Shoot,
        config: CareConfig,
        seed: Arc<dyn SeedReader>,
        shoot_client: Arc<dyn ShootClientInit>,
    ) -> Self {
        Self {
            shoot,
            config,
            seed,
            shoot_client,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<CareMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    fn shoot_key(&self) -> String {
        format!(
            "{}/{}",
            self.shoot.namespace().unwrap_or_default(),
            self.shoot.name_any()
        )
    }

    /// Compute the next health conditions from the shoot's current ones.
    pub async fn check(&self, now: Timestamp) -> ShootConditions {
        let started = tokio::time::Instant::now();
        let key = self.shoot_key();
        info!(shoot = %key, "Checking shoot health");

        let existing = ConditionBuilder::from_existing(self.shoot.conditions());
        let old = ShootConditions {
            api_server_available: existing.get_or_init(API_SERVER_AVAILABLE, now),
            control_plane_healthy: existing.get_or_init(CONTROL_PLANE_HEALTHY, now),
            every_node_ready: existing.get_or_init(EVERY_NODE_READY, now),
            system_components_healthy: existing.get_or_init(SYSTEM_COMPONENTS_HEALTHY, now),
        };

        let conditions = if self.shoot.is_hibernated() {
            debug!(shoot = %key, "Shoot is hibernated, skipping health checks");
            old.map(|c| {
                updated_condition(
                    &c,
                    ConditionStatus::True,
                    REASON_NOT_CHECKED,
                    "Shoot cluster has been hibernated.",
                    Vec::new(),
                    now,
                )
            })
        } else {
            let thresholds = self.config.thresholds();
            let checked = self.check_all(old, &thresholds, now).await;
            let last_operation = self.shoot.last_operation();
            let last_errors = self.shoot.last_errors();
            checked.map(|c| pardon(&c, last_operation, last_errors, now))
        };

        for condition in [
            &conditions.api_server_available,
            &conditions.control_plane_healthy,
            &conditions.every_node_ready,
            &conditions.system_components_healthy,
        ] {
            debug!(
                shoot = %key,
                condition = %condition.r#type,
                status = %condition.status,
                reason = %condition.reason,
                "Computed condition"
            );
        }

        if let Some(metrics) = &self.metrics {
            metrics.record_conditions(&key, &conditions.clone().into_vec());
            metrics.record_health_check(&key, started.elapsed().as_secs_f64());
        }
        conditions
    }

    async fn check_all(
        &self,
        old: ShootConditions,
        thresholds: &Thresholds,
        now: Timestamp,
    ) -> ShootConditions {
        let checker = HealthChecker::new(
            thresholds,
            self.config.staleness_threshold(),
            self.shoot.last_operation(),
            now,
        );

        let extensions: ExtensionReports = self.extension_conditions().await.map_err(|e| {
            warn!(shoot = %self.shoot_key(), error = %e, "Failed to read extension health reports");
            e.to_string()
        });

        let reader = match self.shoot_client.init().await {
            Ok(Some(reader)) => reader,
            Ok(None) => {
                let message = control_plane_not_running_message(self.shoot.last_operation());
                return old.map(|c| unknown_error(&c, message, now));
            }
            Err(e) => {
                warn!(shoot = %self.shoot_key(), error = %e, "Could not initialize shoot client");
                let control_plane = new_condition_or_error(
                    &old.control_plane_healthy,
                    self.check_control_plane(&checker, &old.control_plane_healthy, &extensions)
                        .await,
                    now,
                );
                let message = format!("Shoot client initialization failed: {e}");
                return ShootConditions {
                    api_server_available: updated_condition(
                        &old.api_server_available,
                        ConditionStatus::False,
                        "APIServerDown",
                        "Could not reach API server during client initialization.",
                        Vec::new(),
                        now,
                    ),
                    control_plane_healthy: control_plane,
                    every_node_ready: unknown_error(&old.every_node_ready, &message, now),
                    system_components_healthy: unknown_error(
                        &old.system_components_healthy,
                        &message,
                        now,
                    ),
                };
            }
        };

        let tasks = vec![
            task(async {
                let probe = reader.healthz().await;
                Ok::<_, crate::Error>(Some(
                    checker.check_api_server_availability(&old.api_server_available, probe),
                ))
            }),
            task(self.check_control_plane(&checker, &old.control_plane_healthy, &extensions)),
            task(self.check_nodes(&checker, reader.as_ref(), &old.every_node_ready, &extensions)),
            task(self.check_system_components(
                &checker,
                reader.as_ref(),
                &old.system_components_healthy,
                &extensions,
            )),
        ];
        let mut results = flow::parallel(tasks).await.into_iter();
        let mut next = |old: &Condition| {
            let result = results.next().unwrap_or(Ok(None));
            new_condition_or_error(old, result, now)
        };

        ShootConditions {
            api_server_available: next(&old.api_server_available),
            control_plane_healthy: next(&old.control_plane_healthy),
            every_node_ready: next(&old.every_node_ready),
            system_components_healthy: next(&old.system_components_healthy),
        }
    }

    async fn extension_conditions(&self) -> Result<ExtensionConditions> {
        let namespace = self.shoot.seed_namespace();
        let objects = try_join_all(
            self.config
                .extension_kinds
                .iter()
                .map(|kind| self.seed.extension_objects(&namespace, kind)),
        )
        .await?;
        Ok(ExtensionConditions::collect(objects.iter().flatten()))
    }

    async fn check_control_plane(
        &self,
        checker: &HealthChecker<'_>,
        condition: &Condition,
        extensions: &ExtensionReports,
    ) -> Result<Option<Condition>> {
        let namespace = self.shoot.seed_namespace();
        let rolling_update = self
            .seed
            .worker(&namespace, &self.shoot.name_any())
            .await?
            .is_some_and(|w| w.rolling_update_in_progress());

        let deployments = self.seed.deployments(&namespace).await?;
        let stateful_sets = self.seed.stateful_sets(&namespace).await?;
        let etcds = self.seed.etcds(&namespace).await?;

        let required_deployments = required::control_plane_deployments(&self.shoot, rolling_update);
        let required_etcds = required::control_plane_etcds();
        let monitoring_deployments = required::monitoring_deployments(&self.shoot);
        let monitoring_stateful_sets = required::monitoring_stateful_sets(&self.shoot);
        let logging_stateful_sets =
            required::logging_stateful_sets(&self.shoot, self.config.logging_enabled);

        let control_plane = select_named(&required_deployments, &deployments);
        let control_plane_etcds = select_named(&required_etcds, &etcds);
        let monitoring = select_named(&monitoring_deployments, &deployments);
        let monitoring_sts = select_named(&monitoring_stateful_sets, &stateful_sets);
        let logging = select_named(&logging_stateful_sets, &stateful_sets);

        let failed = checker
            .check_required_deployments(condition, &required_deployments, &deployments)
            .or_else(|| checker.check_deployments(condition, &control_plane))
            .or_else(|| checker.check_required_etcds(condition, &required_etcds, &etcds))
            .or_else(|| checker.check_etcds(condition, &control_plane_etcds))
            .or_else(|| {
                checker.check_required_deployments(condition, &monitoring_deployments, &deployments)
            })
            .or_else(|| checker.check_deployments(condition, &monitoring))
            .or_else(|| {
                checker.check_required_stateful_sets(
                    condition,
                    &monitoring_stateful_sets,
                    &stateful_sets,
                )
            })
            .or_else(|| checker.check_stateful_sets(condition, &monitoring_sts))
            .or_else(|| {
                checker.check_required_stateful_sets(condition, &logging_stateful_sets, &stateful_sets)
            })
            .or_else(|| checker.check_stateful_sets(condition, &logging));
        let failed = match failed {
            Some(failed) => Some(failed),
            None => checker
                .check_extension_conditions(condition, &reports(extensions)?.control_plane),
        };

        Ok(Some(failed.unwrap_or_else(|| {
            checker.succeeded(
                condition,
                "ControlPlaneRunning",
                "All control plane components are healthy.",
            )
        })))
    }

    async fn check_nodes(
        &self,
        checker: &HealthChecker<'_>,
        reader: &dyn ShootReader,
        condition: &Condition,
        extensions: &ExtensionReports,
    ) -> Result<Option<Condition>> {
        let nodes = reader.nodes().await?;

        let failed = match checker.check_cluster_nodes(condition, &self.shoot, &nodes) {
            Some(failed) => Some(failed),
            None => checker
                .check_extension_conditions(condition, &reports(extensions)?.every_node_ready),
        };

        Ok(Some(failed.unwrap_or_else(|| {
            checker.succeeded(condition, "EveryNodeReady", "All nodes are ready.")
        })))
    }

    async fn check_system_components(
        &self,
        checker: &HealthChecker<'_>,
        reader: &dyn ShootReader,
        condition: &Condition,
        extensions: &ExtensionReports,
    ) -> Result<Option<Condition>> {
        let namespace = self.shoot.seed_namespace();
        let managed_resources = self.seed.managed_resources(&namespace).await?;

        let missing: Vec<&str> = self
            .config
            .managed_resource_names
            .iter()
            .filter(|name| !managed_resources.iter().any(|mr| mr.name_any() == **name))
            .map(String::as_str)
            .collect();
        if !missing.is_empty() {
            return Ok(Some(checker.failed_condition(
                condition,
                "ManagedResourceMissing",
                &format!("Missing required managed resources: {missing:?}"),
                Vec::new(),
            )));
        }

        for name in &self.config.managed_resource_names {
            let managed_resource = managed_resources.iter().find(|mr| mr.name_any() == *name);
            if let Some(failed) =
                managed_resource.and_then(|mr| checker.check_managed_resource(condition, mr))
            {
                return Ok(Some(failed));
            }
        }

        let daemon_sets = reader
            .daemon_sets(TUNNEL_NAMESPACE, &self.config.system_component_labels)
            .await?;
        if let Some(failed) = checker.check_daemon_sets(condition, &daemon_sets) {
            return Ok(Some(failed));
        }

        if let Some(failed) =
            checker.check_extension_conditions(condition, &reports(extensions)?.system_components)
        {
            return Ok(Some(failed));
        }

        let pods = reader
            .pods(TUNNEL_NAMESPACE, &self.config.tunnel_pod_labels)
            .await?;
        let Some(pod) = running_tunnel_pod(&pods) else {
            return Ok(Some(checker.failed_condition(
                condition,
                "NoTunnelDeployed",
                "Tunnel connection has not been established: no running tunnel pod found.",
                Vec::new(),
            )));
        };
        if let Err(e) = reader
            .probe_tunnel(TUNNEL_NAMESPACE, &pod.name_any(), self.config.tunnel_port)
            .await
        {
            return Ok(Some(checker.failed_condition(
                condition,
                "TunnelConnectionBroken",
                &format!("Tunnel connection has been broken: {e}"),
                Vec::new(),
            )));
        }

        Ok(Some(checker.succeeded(
            condition,
            "SystemComponentsRunning",
            "All system components are healthy.",
        )))
    }
}

/// Objects whose names are in `names`, in their original order.
fn select_named<K: ResourceExt + Clone>(names: &required::RequiredSet, objects: &[K]) -> Vec<K> {
    objects
        .iter()
        .filter(|o| names.contains(o.name_any().as_str()))
        .cloned()
        .collect()
}
