// Test code is allowed to panic on failure
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic,
    clippy::string_slice
)]

//! Property-based tests for shoot-care.
//!
//! Uses proptest to generate random inputs and verify invariants.

use std::collections::BTreeMap;

use jiff::{SignedDuration, Timestamp};
use proptest::prelude::*;

use shoot_care::care::required::{RequiredSet, control_plane_deployments, missing};
use shoot_care::care::{advance, pardon, updated_condition};
use shoot_care::cleanup::selector::PROTECTED_NAMESPACES;
use shoot_care::cleanup::{Selector, cleanup_selector, unprotected_namespaces};
use shoot_care::config::Thresholds;
use shoot_care::crd::{
    Condition, ConditionStatus, LastError, LastOperation, LastOperationState, LastOperationType,
    Shoot, ShootSpec, WorkerPool,
};

const CONDITION_TYPE: &str = "ControlPlaneHealthy";

fn now() -> Timestamp {
    Timestamp::from_second(1_700_000_000).unwrap()
}

fn ago(secs: i64) -> Timestamp {
    now().checked_sub(SignedDuration::from_secs(secs)).unwrap()
}

/// Strategy for generating condition statuses.
fn any_status() -> impl Strategy<Value = ConditionStatus> {
    prop_oneof![
        Just(ConditionStatus::True),
        Just(ConditionStatus::False),
        Just(ConditionStatus::Progressing),
        Just(ConditionStatus::Unknown),
    ]
}

/// Strategy for generating reasons from a small set, so that equal reasons
/// come up often.
fn any_reason() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("DeploymentUnhealthy".to_string()),
        Just("EtcdUnhealthy".to_string()),
        Just("ControlPlaneRunning".to_string()),
    ]
}

fn any_condition() -> impl Strategy<Value = Condition> {
    (any_status(), any_reason(), 0i64..7200).prop_map(|(status, reason, age)| Condition {
        r#type: CONDITION_TYPE.to_string(),
        status,
        reason,
        message: "message".to_string(),
        codes: Vec::new(),
        last_transition_time: ago(age),
        last_update_time: ago(age),
    })
}

fn any_last_operation() -> impl Strategy<Value = Option<LastOperation>> {
    let operation_type = prop_oneof![
        Just(LastOperationType::Create),
        Just(LastOperationType::Reconcile),
        Just(LastOperationType::Delete),
        Just(LastOperationType::Migrate),
        Just(LastOperationType::Restore),
    ];
    let state = prop_oneof![
        Just(LastOperationState::Processing),
        Just(LastOperationState::Succeeded),
        Just(LastOperationState::Failed),
    ];
    proptest::option::of((operation_type, state, 0i64..7200).prop_map(
        |(operation_type, state, age)| LastOperation {
            operation_type,
            state,
            description: String::new(),
            progress: 0,
            last_update_time: ago(age),
        },
    ))
}

fn thresholds(minutes: Option<i64>) -> Thresholds {
    minutes
        .map(|m| Thresholds::from([(CONDITION_TYPE.to_string(), SignedDuration::from_mins(m))]))
        .unwrap_or_default()
}

proptest! {
    /// Applying the same observation twice changes nothing the second time.
    #[test]
    fn updated_condition_is_idempotent(
        condition in any_condition(),
        status in any_status(),
        reason in any_reason(),
        later in 0i64..600,
    ) {
        let once = updated_condition(&condition, status, &reason, "observed", vec![], now());
        let later = now().checked_add(SignedDuration::from_secs(later)).unwrap();
        let twice = updated_condition(&once, status, &reason, "observed", vec![], later);
        prop_assert_eq!(once, twice);
    }

    /// Without a threshold a failure is reported immediately.
    #[test]
    fn no_threshold_means_false(
        condition in any_condition(),
        reason in any_reason(),
        last_operation in any_last_operation(),
    ) {
        let next = advance(
            &condition,
            &reason,
            "m",
            vec![],
            &Thresholds::new(),
            last_operation.as_ref(),
            now(),
        );
        prop_assert_eq!(next.status, ConditionStatus::False);
    }

    /// A healthy condition with a threshold never jumps straight to `False`.
    #[test]
    fn healthy_goes_through_progressing(
        condition in any_condition(),
        reason in any_reason(),
        minutes in 1i64..60,
        last_operation in any_last_operation(),
    ) {
        let healthy = Condition { status: ConditionStatus::True, ..condition };
        let next = advance(
            &healthy,
            &reason,
            "m",
            vec![],
            &thresholds(Some(minutes)),
            last_operation.as_ref(),
            now(),
        );
        prop_assert_eq!(next.status, ConditionStatus::Progressing);
        prop_assert_eq!(next.last_transition_time, now());
    }

    /// `Progressing` turns `False` exactly when it lasted as long as the threshold.
    #[test]
    fn progressing_respects_threshold(age in 0i64..7200, minutes in 1i64..60) {
        let progressing = Condition {
            r#type: CONDITION_TYPE.to_string(),
            status: ConditionStatus::Progressing,
            reason: "DeploymentUnhealthy".to_string(),
            message: String::new(),
            codes: Vec::new(),
            last_transition_time: ago(age),
            last_update_time: ago(age),
        };
        let next = advance(
            &progressing,
            "DeploymentUnhealthy",
            "m",
            vec![],
            &thresholds(Some(minutes)),
            None,
            now(),
        );
        let expected = if age < minutes * 60 {
            ConditionStatus::Progressing
        } else {
            ConditionStatus::False
        };
        prop_assert_eq!(next.status, expected);
    }

    /// A failed observation never reports a healthy or unknown status.
    #[test]
    fn advance_reports_failure(
        condition in any_condition(),
        reason in any_reason(),
        minutes in proptest::option::of(1i64..60),
        last_operation in any_last_operation(),
    ) {
        let next = advance(
            &condition,
            &reason,
            "m",
            vec![],
            &thresholds(minutes),
            last_operation.as_ref(),
            now(),
        );
        prop_assert!(matches!(next.status, ConditionStatus::False | ConditionStatus::Progressing));
    }

    /// Pardon only turns `False` into `Progressing` during error-free
    /// creation or deletion, and applying it twice changes nothing.
    #[test]
    fn pardon_law(
        condition in any_condition(),
        last_operation in any_last_operation(),
        with_errors in any::<bool>(),
    ) {
        let errors = if with_errors {
            vec![LastError { description: "boom".into(), task_id: None, codes: vec![] }]
        } else {
            vec![]
        };
        let pardoned = pardon(&condition, last_operation.as_ref(), &errors, now());

        if pardoned != condition {
            prop_assert_eq!(condition.status, ConditionStatus::False);
            prop_assert_eq!(pardoned.status, ConditionStatus::Progressing);
            prop_assert!(!with_errors);
            prop_assert!(last_operation.as_ref().is_none_or(|op| matches!(
                op.operation_type,
                LastOperationType::Create | LastOperationType::Delete
            )));
        }
        prop_assert_eq!(pardon(&pardoned, last_operation.as_ref(), &errors, now()), pardoned);
    }

    /// A failure during error-free creation or deletion is always pardoned.
    #[test]
    fn pardon_softens_failures_during_create_and_delete(
        condition in any_condition(),
        operation in proptest::option::of(prop_oneof![
            Just(LastOperationType::Create),
            Just(LastOperationType::Delete),
        ]),
        age in 0i64..7200,
    ) {
        let failed = Condition { status: ConditionStatus::False, ..condition };
        let last_operation = operation.map(|operation_type| LastOperation {
            operation_type,
            state: LastOperationState::Processing,
            description: String::new(),
            progress: 0,
            last_update_time: ago(age),
        });

        let pardoned = pardon(&failed, last_operation.as_ref(), &[], now());
        prop_assert_eq!(pardoned.status, ConditionStatus::Progressing);
        prop_assert_eq!(pardoned.reason, failed.reason);
    }

    /// Exactly the required names that were not observed are reported missing.
    #[test]
    fn required_set_completeness(
        pools in proptest::collection::vec((0i32..3, 0i32..5), 0..4),
        rolling_update in any::<bool>(),
        dropped in proptest::collection::vec(any::<bool>(), 8),
        extras in proptest::collection::vec("[a-z]{3,10}", 0..5),
    ) {
        let mut spec = ShootSpec::default();
        spec.provider.workers = pools
            .into_iter()
            .enumerate()
            .map(|(i, (minimum, extra))| WorkerPool {
                name: format!("pool-{i}"),
                minimum,
                maximum: minimum + extra,
                kubernetes: None,
            })
            .collect();
        let shoot = Shoot::new("aws", spec);
        let required: RequiredSet = control_plane_deployments(&shoot, rolling_update);

        let mut observed: Vec<String> = extras;
        let mut expected = Vec::new();
        for (name, drop) in required.iter().zip(dropped.iter()) {
            if *drop {
                expected.push(*name);
            } else {
                observed.push((*name).to_string());
            }
        }

        prop_assert_eq!(missing(&required, &observed), expected);
    }

    /// Protected namespaces are never selected, whatever their labels.
    #[test]
    fn protected_namespaces_never_selected(
        index in 0usize..4,
        labels in proptest::collection::btree_map("[a-z]{1,8}", "[a-z]{1,8}", 0..4),
        name in "[a-z][a-z0-9-]{0,20}[a-z0-9]",
    ) {
        let selector =
            Selector::labels(cleanup_selector().unwrap()).with_fields(unprotected_namespaces());
        let labels: BTreeMap<String, String> = labels;
        prop_assert!(!selector.matches(PROTECTED_NAMESPACES[index], None, &labels));
        if !PROTECTED_NAMESPACES.contains(&name.as_str()) {
            prop_assert!(selector.matches(&name, None, &labels));
        }
    }
}
