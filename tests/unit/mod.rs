// Test code is allowed to panic on failure
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic,
    clippy::string_slice
)]

//! Unit tests for shoot-care.
//!
//! These tests run without a Kubernetes cluster and test individual
//! components in isolation.

#[path = "../common/mod.rs"]
mod common;

mod condition_tests {
    use jiff::SignedDuration;
    use shoot_care::care::{advance, init_condition, pardon, updated_condition};
    use shoot_care::config::Thresholds;
    use shoot_care::crd::{
        CONTROL_PLANE_HEALTHY, ConditionStatus, LastError, LastOperation, LastOperationState,
        LastOperationType,
    };

    use crate::common::fixtures::{at, condition};

    fn five_minutes() -> Thresholds {
        Thresholds::from([(CONTROL_PLANE_HEALTHY.to_string(), SignedDuration::from_mins(5))])
    }

    fn operation(operation_type: LastOperationType, state: LastOperationState, secs: i64) -> LastOperation {
        LastOperation {
            operation_type,
            state,
            description: String::new(),
            progress: 100,
            last_update_time: at(secs),
        }
    }

    #[test]
    fn test_init_condition() {
        let c = init_condition(CONTROL_PLANE_HEALTHY, at(0));
        assert_eq!(c.status, ConditionStatus::Unknown);
        assert_eq!(c.reason, "ConditionInitialized");
        assert_eq!(c.last_transition_time, at(0));
    }

    #[test]
    fn test_advance_table() {
        // (previous status, previous reason, transitioned at, threshold?, new reason, expected)
        let cases = [
            (ConditionStatus::True, "Running", -3600, false, "DeploymentUnhealthy", ConditionStatus::False),
            (ConditionStatus::True, "Running", -3600, true, "DeploymentUnhealthy", ConditionStatus::Progressing),
            (ConditionStatus::Progressing, "DeploymentUnhealthy", -240, true, "DeploymentUnhealthy", ConditionStatus::Progressing),
            (ConditionStatus::Progressing, "DeploymentUnhealthy", -360, true, "DeploymentUnhealthy", ConditionStatus::False),
            (ConditionStatus::Progressing, "DeploymentUnhealthy", -10, false, "DeploymentUnhealthy", ConditionStatus::False),
            (ConditionStatus::False, "DeploymentUnhealthy", -3600, true, "DeploymentUnhealthy", ConditionStatus::False),
            (ConditionStatus::False, "DeploymentUnhealthy", -3600, true, "EtcdUnhealthy", ConditionStatus::Progressing),
            (ConditionStatus::False, "DeploymentUnhealthy", -3600, false, "EtcdUnhealthy", ConditionStatus::False),
            (ConditionStatus::Unknown, "ConditionCheckError", -10, true, "DeploymentUnhealthy", ConditionStatus::False),
        ];

        for (status, reason, since, with_threshold, new_reason, expected) in cases {
            let thresholds = if with_threshold { five_minutes() } else { Thresholds::new() };
            let previous = condition(CONTROL_PLANE_HEALTHY, status, reason, at(since));
            let next = advance(&previous, new_reason, "message", vec![], &thresholds, None, at(0));
            assert_eq!(
                next.status, expected,
                "{status} ({reason}, {since}s, threshold {with_threshold}) -> {new_reason}"
            );
            assert_eq!(next.reason, new_reason);
        }
    }

    #[test]
    fn test_recent_success_keeps_progressing() {
        let thresholds = five_minutes();
        let recent = operation(LastOperationType::Reconcile, LastOperationState::Succeeded, -60);
        let failed = operation(LastOperationType::Reconcile, LastOperationState::Failed, -60);

        let stale_progressing =
            condition(CONTROL_PLANE_HEALTHY, ConditionStatus::Progressing, "X", at(-3600));
        let next = advance(&stale_progressing, "X", "m", vec![], &thresholds, Some(&recent), at(0));
        assert_eq!(next.status, ConditionStatus::Progressing);
        let next = advance(&stale_progressing, "X", "m", vec![], &thresholds, Some(&failed), at(0));
        assert_eq!(next.status, ConditionStatus::False);

        let stale_false = condition(CONTROL_PLANE_HEALTHY, ConditionStatus::False, "X", at(-3600));
        let next = advance(&stale_false, "X", "m", vec![], &thresholds, Some(&recent), at(0));
        assert_eq!(next.status, ConditionStatus::Progressing);
    }

    #[test]
    fn test_healthy_observation_replaces_reason() {
        let previous = condition(CONTROL_PLANE_HEALTHY, ConditionStatus::False, "DeploymentUnhealthy", at(-60));
        let next = updated_condition(
            &previous,
            ConditionStatus::True,
            "ControlPlaneRunning",
            "All control plane components are healthy.",
            vec![],
            at(0),
        );
        assert_eq!(next.reason, "ControlPlaneRunning");
        assert_eq!(next.last_transition_time, at(0));
    }

    #[test]
    fn test_pardon_table() {
        let failed = condition(CONTROL_PLANE_HEALTHY, ConditionStatus::False, "EtcdMissing", at(-60));
        let error = LastError {
            description: "infrastructure not ready".into(),
            task_id: None,
            codes: vec![],
        };
        let create = operation(LastOperationType::Create, LastOperationState::Processing, -60);
        let delete = operation(LastOperationType::Delete, LastOperationState::Error, -60);
        let reconcile = operation(LastOperationType::Reconcile, LastOperationState::Processing, -60);

        let cases: [(Option<&LastOperation>, &[LastError], ConditionStatus); 5] = [
            (None, &[], ConditionStatus::Progressing),
            (Some(&create), &[], ConditionStatus::Progressing),
            (Some(&delete), &[], ConditionStatus::Progressing),
            (Some(&create), std::slice::from_ref(&error), ConditionStatus::False),
            (Some(&reconcile), &[], ConditionStatus::False),
        ];
        for (last_operation, last_errors, expected) in cases {
            let pardoned = pardon(&failed, last_operation, last_errors, at(0));
            assert_eq!(pardoned.status, expected, "{last_operation:?} {last_errors:?}");
            assert_eq!(pardoned.reason, failed.reason);
        }

        let healthy = condition(CONTROL_PLANE_HEALTHY, ConditionStatus::True, "Running", at(-60));
        assert_eq!(pardon(&healthy, None, &[], at(0)), healthy);
    }
}

mod health_tests {
    use k8s_openapi::api::apps::v1::{
        DaemonSet, DaemonSetSpec, DaemonSetStatus, DaemonSetUpdateStrategy, RollingUpdateDaemonSet,
    };
    use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
    use shoot_care::care::health::{
        check_daemon_set, check_deployment, check_etcd, check_node, check_stateful_set,
    };
    use shoot_care::crd::EtcdStatus;

    use crate::common::fixtures::{deployment, etcd, node, stateful_set, unavailable_deployment};

    fn daemon_set(max_unavailable: Option<IntOrString>, desired: i32, available: i32) -> DaemonSet {
        DaemonSet {
            spec: Some(DaemonSetSpec {
                update_strategy: Some(DaemonSetUpdateStrategy {
                    type_: Some("RollingUpdate".into()),
                    rolling_update: Some(RollingUpdateDaemonSet {
                        max_unavailable,
                        ..Default::default()
                    }),
                }),
                ..Default::default()
            }),
            status: Some(DaemonSetStatus {
                desired_number_scheduled: desired,
                current_number_scheduled: desired,
                number_available: Some(available),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_deployment() {
        assert!(check_deployment(&deployment("kube-apiserver")).is_ok());
        let err = check_deployment(&unavailable_deployment("kube-apiserver")).unwrap_err();
        assert!(err.to_string().contains("\"Available\""), "{err}");

        let mut outdated = deployment("kube-apiserver");
        outdated.metadata.generation = Some(2);
        let err = check_deployment(&outdated).unwrap_err();
        assert_eq!(err.to_string(), "observed generation outdated (1/2)");
    }

    #[test]
    fn test_stateful_set() {
        assert!(check_stateful_set(&stateful_set("prometheus")).is_ok());
        let mut scaling = stateful_set("prometheus");
        scaling.spec.as_mut().unwrap().replicas = Some(2);
        assert_eq!(
            check_stateful_set(&scaling).unwrap_err().to_string(),
            "not enough ready replicas (1/2)"
        );
    }

    #[test]
    fn test_daemon_set_max_unavailable() {
        // 10 desired, 25% may be unavailable: 2 (rounded down)
        assert!(check_daemon_set(&daemon_set(Some(IntOrString::String("25%".into())), 10, 8)).is_ok());
        assert!(check_daemon_set(&daemon_set(Some(IntOrString::String("25%".into())), 10, 7)).is_err());
        assert!(check_daemon_set(&daemon_set(Some(IntOrString::Int(3)), 10, 7)).is_ok());
        // unset allows one
        assert!(check_daemon_set(&daemon_set(None, 10, 9)).is_ok());
        assert!(check_daemon_set(&daemon_set(None, 10, 8)).is_err());
    }

    #[test]
    fn test_node() {
        assert!(check_node(&node("n", "worker", "v1.30.2")).is_ok());

        let mut pressured = node("n", "worker", "v1.30.2");
        let conditions = pressured
            .status
            .as_mut()
            .unwrap()
            .conditions
            .as_mut()
            .unwrap();
        conditions[1].status = "True".into();
        conditions[1].reason = Some("KubeletHasDiskPressure".into());
        let err = check_node(&pressured).unwrap_err();
        assert!(err.to_string().contains("DiskPressure"), "{err}");
    }

    #[test]
    fn test_etcd() {
        assert!(check_etcd(&etcd("etcd-main")).is_ok());

        let mut broken = etcd("etcd-main");
        broken.status = Some(EtcdStatus {
            ready: Some(false),
            last_error: Some("quorum lost".into()),
            observed_generation: Some(1),
        });
        assert_eq!(check_etcd(&broken).unwrap_err().to_string(), "quorum lost");

        broken.status = None;
        assert_eq!(
            check_etcd(&broken).unwrap_err().to_string(),
            "etcd \"etcd-main\" is not ready yet"
        );
    }
}

mod required_tests {
    use shoot_care::care::required::{
        control_plane_deployments, logging_stateful_sets, missing, monitoring_deployments,
        monitoring_stateful_sets,
    };

    use crate::common::fixtures::ShootBuilder;

    #[test]
    fn test_autoscaler_skipped_during_rolling_update() {
        let shoot = ShootBuilder::new("aws").pool("worker", 1, 3).build();
        assert!(control_plane_deployments(&shoot, false).contains("cluster-autoscaler"));
        assert!(!control_plane_deployments(&shoot, true).contains("cluster-autoscaler"));

        let fixed = ShootBuilder::new("aws").pool("worker", 2, 2).build();
        assert!(!control_plane_deployments(&fixed, false).contains("cluster-autoscaler"));
    }

    #[test]
    fn test_testing_shoots_have_no_observability_stack() {
        let shoot = ShootBuilder::new("aws").purpose("testing").build();
        assert!(monitoring_deployments(&shoot).is_empty());
        assert!(monitoring_stateful_sets(&shoot).is_empty());
        assert!(logging_stateful_sets(&shoot, true).is_empty());
    }

    #[test]
    fn test_missing_is_sorted_difference() {
        let shoot = ShootBuilder::new("aws").build();
        let required = control_plane_deployments(&shoot, false);
        assert_eq!(
            missing(&required, ["kube-apiserver", "unrelated"]),
            vec!["gardener-resource-manager", "kube-controller-manager", "kube-scheduler"]
        );
    }
}

mod selector_tests {
    use std::collections::BTreeMap;

    use shoot_care::Error;
    use shoot_care::cleanup::{
        Field, FieldSelector, LabelSelector, Operator, Requirement, Selector, cleanup_selector,
        unprotected_namespaces,
    };

    #[test]
    fn test_invalid_requirements_are_rejected() {
        for (key, value) in [("-bad", "x"), ("ok", "no spaces"), ("a/b/c", "x")] {
            assert!(
                matches!(
                    Requirement::new(key, Operator::Equals, &[value]),
                    Err(Error::InvalidSelector(_))
                ),
                "{key}={value}"
            );
        }
    }

    #[test]
    fn test_namespace_selector() {
        let selector = Selector::labels(cleanup_selector().unwrap()).with_fields(unprotected_namespaces());
        let none = BTreeMap::new();
        for protected in ["default", "kube-system", "kube-public", "kube-node-lease"] {
            assert!(!selector.matches(protected, None, &none), "{protected}");
        }
        assert!(selector.matches("team-a", None, &none));
        assert_eq!(
            unprotected_namespaces().to_string(),
            "metadata.name!=default,metadata.name!=kube-system,metadata.name!=kube-public,metadata.name!=kube-node-lease"
        );
    }

    #[test]
    fn test_everything_matches() {
        let labels = BTreeMap::from([("gardener.cloud/role".to_string(), "system-component".to_string())]);
        assert!(Selector::everything().matches("va-1", None, &labels));
        assert!(LabelSelector::everything().is_empty());
        assert!(FieldSelector::everything().equals(Field::Namespace, "default").matches("x", Some("default")));
    }
}

mod config_tests {
    use std::time::Duration;

    use jiff::SignedDuration;
    use shoot_care::CareConfig;

    #[test]
    fn test_care_config_from_json() {
        let config: CareConfig = serde_json::from_value(serde_json::json!({
            "conditionThresholds": [{"type": "ControlPlaneHealthy", "duration": "PT5M"}],
            "staleExtensionHealthChecks": {"enabled": true, "threshold": "3m"},
            "loggingEnabled": true
        }))
        .unwrap();

        assert_eq!(
            config.thresholds().get("ControlPlaneHealthy"),
            Some(&SignedDuration::from_mins(5))
        );
        assert_eq!(config.staleness_threshold(), Some(SignedDuration::from_mins(3)));
        assert!(config.logging_enabled);
        assert_eq!(config.managed_resource_names.len(), 4);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_negative_threshold_is_invalid() {
        let config = CareConfig::default()
            .with_threshold("EveryNodeReady", SignedDuration::from_secs(-1));
        assert!(config.validate().is_err());
        assert_eq!(shoot_care::CleanupConfig::default().interval(), Duration::from_secs(5));
    }
}

mod checksum_tests {
    use std::collections::BTreeMap;

    use shoot_care::{ChecksumCache, encryption_config_checksum};

    #[test]
    fn test_rollout_needed_only_on_change() {
        let cache = ChecksumCache::new();
        let mut data = BTreeMap::from([(
            "encryption-configuration.yaml".to_string(),
            b"resources: [secrets]".to_vec(),
        )]);

        assert!(cache.set("garden-dev/aws", encryption_config_checksum(&data)));
        assert!(!cache.set("garden-dev/aws", encryption_config_checksum(&data)));

        data.insert("extra".to_string(), b"x".to_vec());
        assert!(cache.set("garden-dev/aws", encryption_config_checksum(&data)));
    }
}
