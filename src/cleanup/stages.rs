//! Cleanup of all user workload left in a shoot before its deletion.
//!
//! Kinds are grouped into stages. Groups are started one after another, so
//! that e.g. webhooks are gone before they can block the deletion of other
//! objects. Within a group every kind is cleaned concurrently. A failing kind
//! stops neither the other kinds nor the later groups.

use std::collections::BTreeMap;
use std::sync::Arc;

use jiff::Timestamp;
use k8s_openapi::api::admissionregistration::v1::{
    MutatingWebhookConfiguration, ValidatingWebhookConfiguration,
};
use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, ReplicaSet, StatefulSet};
use k8s_openapi::api::batch::v1::{CronJob, Job};
use k8s_openapi::api::core::v1::{PersistentVolumeClaim, Pod, ReplicationController, Service};
use k8s_openapi::api::networking::v1::Ingress;
use k8s_openapi::api::storage::v1::VolumeAttachment;
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use k8s_openapi::kube_aggregator::pkg::apis::apiregistration::v1::APIService;
use kube::Client;
use tokio::time::Instant;
use tracing::{info, warn};

use super::cleaner::{CleanOptions, Cleaner, FinalizeAfter};
use super::options::StageTiming;
use super::selector::{Field, FieldSelector, Selector, cleanup_selector, unprotected_namespaces};
use super::target::{Cleanable, KubeTarget, NamespaceTarget};
use crate::config::CleanupConfig;
use crate::error::{CleanupErrors, Result, StageError};
use crate::flow::{self, task};
use crate::metrics::CareMetrics;

/// Groups of kinds cleaned together, in execution order.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub enum StageGroup {
    Webhooks,
    ExtendedApis,
    KubernetesResources,
    Namespaces,
    VolumeAttachments,
}

impl StageGroup {
    pub const ALL: [StageGroup; 5] = [
        StageGroup::Webhooks,
        StageGroup::ExtendedApis,
        StageGroup::KubernetesResources,
        StageGroup::Namespaces,
        StageGroup::VolumeAttachments,
    ];

    /// Name used in annotations and configuration
    pub fn name(self) -> &'static str {
        match self {
            StageGroup::Webhooks => "webhooks",
            StageGroup::ExtendedApis => "extended-apis",
            StageGroup::KubernetesResources => "kubernetes-resources",
            StageGroup::Namespaces => "namespaces",
            StageGroup::VolumeAttachments => "volume-attachments",
        }
    }

    /// Built-in timing of the group.
    pub fn default_timing(self) -> StageTiming {
        let five_minutes = Some(jiff::SignedDuration::from_mins(5));
        match self {
            StageGroup::Webhooks => StageTiming {
                grace_period_seconds: Some(0),
                finalize_after: five_minutes,
            },
            StageGroup::ExtendedApis => StageTiming {
                grace_period_seconds: None,
                finalize_after: Some(jiff::SignedDuration::from_hours(1)),
            },
            StageGroup::KubernetesResources
            | StageGroup::Namespaces
            | StageGroup::VolumeAttachments => StageTiming {
                grace_period_seconds: None,
                finalize_after: five_minutes,
            },
        }
    }

    /// Objects of the group that are cleaned.
    ///
    /// Every group honors the `no-cleanup` and `system-component` exclusions.
    pub fn selector(self) -> Result<Selector> {
        let selector = Selector::labels(cleanup_selector()?);
        Ok(match self {
            StageGroup::Namespaces => selector.with_fields(unprotected_namespaces()),
            _ => selector,
        })
    }

    /// Timing after configuration and annotation overrides.
    pub fn timing(
        self,
        config: &CleanupConfig,
        annotations: &BTreeMap<String, String>,
    ) -> Result<StageTiming> {
        config
            .stages
            .get(self.name())
            .copied()
            .unwrap_or_else(|| self.default_timing())
            .with_overrides(self.name(), annotations)
    }
}

/// Clean options of a group with the given timing.
pub fn options_for(selector: Selector, timing: StageTiming) -> CleanOptions {
    CleanOptions {
        selector,
        grace_period_seconds: timing.grace_period_seconds,
        finalize_after: timing.finalize_after.map(FinalizeAfter::Fixed),
        gone_before: None,
    }
}

/// One kind to clean.
pub struct Stage {
    pub group: StageGroup,
    pub target: Arc<dyn Cleanable>,
    pub options: CleanOptions,
}

/// Ordered set of cleanup stages for a shoot.
pub struct ShootCleanup {
    cleaner: Cleaner,
    stages: Vec<Stage>,
    gone_before: Option<Timestamp>,
    metrics: Option<Arc<CareMetrics>>,
}

impl ShootCleanup {
    pub fn new(cleaner: Cleaner) -> Self {
        Self {
            cleaner,
            stages: Vec::new(),
            gone_before: None,
            metrics: None,
        }
    }

    /// Add a kind to a group
    pub fn stage(mut self, group: StageGroup, target: Arc<dyn Cleanable>, options: CleanOptions) -> Self {
        self.stages.push(Stage {
            group,
            target,
            options,
        });
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<CareMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Ignore objects created at or after `cutoff` in every stage.
    pub fn with_gone_before(mut self, cutoff: Timestamp) -> Self {
        self.gone_before = Some(cutoff);
        self
    }

    /// Options of `stage` as they are used for cleaning.
    fn options_of(&self, stage: &Stage) -> CleanOptions {
        let mut options = stage.options.clone();
        if let Some(cutoff) = self.gone_before {
            options.gone_before = Some(cutoff);
        }
        options
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    /// All stages for a shoot cluster, reachable through `client`.
    ///
    /// `annotations` are the shoot's annotations; an invalid override fails
    /// before anything is deleted.
    pub fn for_cluster(
        client: Client,
        cleaner: Cleaner,
        config: &CleanupConfig,
        annotations: &BTreeMap<String, String>,
    ) -> Result<Self> {
        let stage_options = |group: StageGroup| -> Result<CleanOptions> {
            Ok(options_for(group.selector()?, group.timing(config, annotations)?))
        };

        let webhooks = stage_options(StageGroup::Webhooks)?;
        let extended = stage_options(StageGroup::ExtendedApis)?;
        let resources = stage_options(StageGroup::KubernetesResources)?;
        let services = CleanOptions {
            selector: resources
                .selector
                .clone()
                .with_fields(FieldSelector::everything().not_equals(Field::Name, "kubernetes")),
            ..resources.clone()
        };
        let namespaces = stage_options(StageGroup::Namespaces)?;
        let volume_attachments = stage_options(StageGroup::VolumeAttachments)?;

        use StageGroup::*;
        let cleanup = Self::new(cleaner)
            .stage(Webhooks, Arc::new(KubeTarget::<MutatingWebhookConfiguration>::all(client.clone())), webhooks.clone())
            .stage(Webhooks, Arc::new(KubeTarget::<ValidatingWebhookConfiguration>::all(client.clone())), webhooks)
            .stage(ExtendedApis, Arc::new(KubeTarget::<APIService>::all(client.clone())), extended.clone())
            .stage(ExtendedApis, Arc::new(KubeTarget::<CustomResourceDefinition>::all(client.clone())), extended)
            .stage(KubernetesResources, Arc::new(KubeTarget::<CronJob>::all(client.clone())), resources.clone())
            .stage(KubernetesResources, Arc::new(KubeTarget::<DaemonSet>::all(client.clone())), resources.clone())
            .stage(KubernetesResources, Arc::new(KubeTarget::<Deployment>::all(client.clone())), resources.clone())
            .stage(KubernetesResources, Arc::new(KubeTarget::<Ingress>::all(client.clone())), resources.clone())
            .stage(KubernetesResources, Arc::new(KubeTarget::<Job>::all(client.clone())), resources.clone())
            .stage(KubernetesResources, Arc::new(KubeTarget::<Pod>::all(client.clone())), resources.clone())
            .stage(KubernetesResources, Arc::new(KubeTarget::<ReplicaSet>::all(client.clone())), resources.clone())
            .stage(KubernetesResources, Arc::new(KubeTarget::<ReplicationController>::all(client.clone())), resources.clone())
            .stage(KubernetesResources, Arc::new(KubeTarget::<Service>::all(client.clone())), services)
            .stage(KubernetesResources, Arc::new(KubeTarget::<StatefulSet>::all(client.clone())), resources.clone())
            .stage(KubernetesResources, Arc::new(KubeTarget::<PersistentVolumeClaim>::all(client.clone())), resources)
            .stage(Namespaces, Arc::new(NamespaceTarget::new(client.clone())), namespaces)
            .stage(VolumeAttachments, Arc::new(KubeTarget::<VolumeAttachment>::all(client)), volume_attachments);
        Ok(cleanup)
    }

    /// Run all groups in order until `deadline`.
    ///
    /// Every group runs even if an earlier one failed; the error names every
    /// failing kind of every group.
    pub async fn run(&self, deadline: Instant) -> std::result::Result<(), CleanupErrors> {
        let mut failures: Vec<StageError> = Vec::new();

        for group in StageGroup::ALL {
            let stages: Vec<&Stage> = self.stages.iter().filter(|s| s.group == group).collect();
            if stages.is_empty() {
                continue;
            }
            info!(group = group.name(), kinds = stages.len(), "Cleaning stage group");

            let options: Vec<CleanOptions> = stages.iter().map(|s| self.options_of(s)).collect();
            let tasks = stages
                .iter()
                .zip(&options)
                .map(|(stage, options)| {
                    let kind = stage.target.kind().to_string();
                    let future = self.cleaner.clean(stage.target.as_ref(), options, deadline);
                    (kind, task(future))
                })
                .collect();
            let result = flow::parallel_named(tasks).await;

            if let Some(metrics) = &self.metrics {
                let failed = result.as_ref().err().map(CleanupErrors::kinds).unwrap_or_default();
                for stage in &stages {
                    let kind = stage.target.kind();
                    metrics.record_stage(kind, !failed.contains(&kind));
                }
            }

            if let Err(errors) = result {
                warn!(group = group.name(), error = %errors, "Cleanup stage group failed");
                failures.extend(errors.0);
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(CleanupErrors(failures))
        }
    }
}
