//! Condition transitions.
//!
//! Every change of a condition goes through [`updated_condition`], which
//! keeps transition and update timestamps consistent. [`advance`] is the
//! hysteresis state machine applied to failed observations, and [`pardon`]
//! softens failures while a cluster is being created or deleted.
//!
//! All functions take `now` explicitly: the same inputs always produce the
//! same condition.

use jiff::{SignedDuration, Timestamp};

use crate::config::Thresholds;
use crate::crd::{Condition, ConditionStatus, LastError, LastOperation, LastOperationType};
use crate::error::Result;

/// Reason of a freshly initialized condition.
pub const REASON_INITIALIZED: &str = "ConditionInitialized";
/// Reason of a condition whose check could not be performed.
pub const REASON_CHECK_ERROR: &str = "ConditionCheckError";
/// Reason of a condition that is deliberately not evaluated.
pub const REASON_NOT_CHECKED: &str = "ConditionNotChecked";

/// Create a condition of the given type whose check has not run yet.
pub fn init_condition(condition_type: &str, now: Timestamp) -> Condition {
    Condition {
        r#type: condition_type.to_string(),
        status: ConditionStatus::Unknown,
        reason: REASON_INITIALIZED.to_string(),
        message: "The condition has been initialized but its semantic check has not been performed yet."
            .to_string(),
        codes: Vec::new(),
        last_transition_time: now,
        last_update_time: now,
    }
}

/// Return a copy of `condition` with new status, reason, message and codes.
///
/// `last_transition_time` moves only when the status changes and
/// `last_update_time` only when reason, message or codes change.
pub fn updated_condition(
    condition: &Condition,
    status: ConditionStatus,
    reason: &str,
    message: &str,
    codes: Vec<String>,
    now: Timestamp,
) -> Condition {
    let last_transition_time = if condition.status != status {
        now
    } else {
        condition.last_transition_time
    };
    let last_update_time =
        if condition.reason != reason || condition.message != message || condition.codes != codes {
            now
        } else {
            condition.last_update_time
        };

    Condition {
        r#type: condition.r#type.clone(),
        status,
        reason: reason.to_string(),
        message: message.to_string(),
        codes,
        last_transition_time,
        last_update_time,
    }
}

/// Mark a condition as healthy.
pub fn succeeded(condition: &Condition, reason: &str, message: &str, now: Timestamp) -> Condition {
    updated_condition(condition, ConditionStatus::True, reason, message, Vec::new(), now)
}

/// Mark a condition as `Unknown` because its check failed to run.
pub fn unknown_error(condition: &Condition, message: &str, now: Timestamp) -> Condition {
    updated_condition(
        condition,
        ConditionStatus::Unknown,
        REASON_CHECK_ERROR,
        message,
        Vec::new(),
        now,
    )
}

/// Resolve the outcome of a check into a condition.
///
/// A check that returns no new condition leaves `old` unchanged; a check
/// that failed to run turns the condition `Unknown` with the error as message.
pub fn new_condition_or_error(
    old: &Condition,
    result: Result<Option<Condition>>,
    now: Timestamp,
) -> Condition {
    match result {
        Ok(Some(condition)) => condition,
        Ok(None) => old.clone(),
        Err(e) => unknown_error(old, &e.to_string(), now),
    }
}

/// Compute the next condition after a failed observation.
///
/// - `True` becomes `Progressing` if a threshold is configured for the type,
///   `False` otherwise.
/// - `Progressing` stays `Progressing` while the last successful operation or
///   the condition's own last transition is within the threshold.
/// - `False` relaxes to `Progressing` when the last operation succeeded within
///   the threshold or the failure reason changed.
/// - Anything else becomes `False`.
pub fn advance(
    condition: &Condition,
    reason: &str,
    message: &str,
    codes: Vec<String>,
    thresholds: &Thresholds,
    last_operation: Option<&LastOperation>,
    now: Timestamp,
) -> Condition {
    let threshold = thresholds.get(&condition.r#type).copied();
    let succeeded_recently = |threshold: SignedDuration| {
        last_operation.is_some_and(|op| {
            op.succeeded() && now.duration_since(op.last_update_time) < threshold
        })
    };

    let status = match (condition.status, threshold) {
        (ConditionStatus::True, Some(_)) => ConditionStatus::Progressing,
        (ConditionStatus::Progressing, Some(threshold))
            if succeeded_recently(threshold)
                || now.duration_since(condition.last_transition_time) < threshold =>
        {
            ConditionStatus::Progressing
        }
        (ConditionStatus::False, Some(threshold))
            if succeeded_recently(threshold) || condition.reason != reason =>
        {
            ConditionStatus::Progressing
        }
        _ => ConditionStatus::False,
    };

    updated_condition(condition, status, reason, message, codes, now)
}

/// Whether failures are expected because the cluster is being created or
/// deleted without errors.
pub fn is_unstable_operation(
    last_operation: Option<&LastOperation>,
    last_errors: &[LastError],
) -> bool {
    let unstable_type = last_operation.is_none_or(|op| {
        matches!(
            op.operation_type,
            LastOperationType::Create | LastOperationType::Delete
        )
    });
    unstable_type && last_errors.is_empty()
}

/// Downgrade a `False` condition to `Progressing` while the cluster is in an
/// unstable operation; every other condition is returned unchanged.
pub fn pardon(
    condition: &Condition,
    last_operation: Option<&LastOperation>,
    last_errors: &[LastError],
    now: Timestamp,
) -> Condition {
    if condition.status == ConditionStatus::False
        && is_unstable_operation(last_operation, last_errors)
    {
        return updated_condition(
            condition,
            ConditionStatus::Progressing,
            &condition.reason,
            &condition.message,
            condition.codes.clone(),
            now,
        );
    }
    condition.clone()
}

/// Builder for managing conditions list
pub struct ConditionBuilder {
    conditions: Vec<Condition>,
}

impl ConditionBuilder {
    /// Start from an existing list of conditions
    pub fn from_existing(conditions: &[Condition]) -> Self {
        Self {
            conditions: conditions.to_vec(),
        }
    }

    /// Add or update a condition
    pub fn set(&mut self, condition: Condition) -> &mut Self {
        // Find and replace existing condition of same type
        if let Some(existing) = self
            .conditions
            .iter_mut()
            .find(|c| c.r#type == condition.r#type)
        {
            *existing = condition;
        } else {
            self.conditions.push(condition);
        }
        self
    }

    /// Existing condition of the given type, or a freshly initialized one
    pub fn get_or_init(&self, condition_type: &str, now: Timestamp) -> Condition {
        self.conditions
            .iter()
            .find(|c| c.r#type == condition_type)
            .cloned()
            .unwrap_or_else(|| init_condition(condition_type, now))
    }

    /// Build the conditions list
    pub fn build(self) -> Vec<Condition> {
        self.conditions
    }
}

impl Default for ConditionBuilder {
    fn default() -> Self {
        Self::from_existing(&[])
    }
}

/// Replace conditions in `existing` by the `updated` ones of the same type.
///
/// Conditions of new types are appended in the order given.
pub fn merge_conditions(existing: &[Condition], updated: Vec<Condition>) -> Vec<Condition> {
    let mut builder = ConditionBuilder::from_existing(existing);
    for condition in updated {
        builder.set(condition);
    }
    builder.build()
}

/// Check if a condition type is true
pub fn is_condition_true(conditions: &[Condition], condition_type: &str) -> bool {
    conditions
        .iter()
        .find(|c| c.r#type == condition_type)
        .is_some_and(|c| c.status == ConditionStatus::True)
}
