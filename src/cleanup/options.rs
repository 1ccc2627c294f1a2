//! Per-stage timing overrides read from shoot annotations.
//!
//! `shoot.gardener.cloud/cleanup-<group>-grace-period-seconds` overrides the
//! grace period of the first deletion, and
//! `shoot.gardener.cloud/cleanup-<group>-finalize-grace-period-seconds` the
//! time after which finalizers of stuck objects are removed.

use std::collections::BTreeMap;

use jiff::SignedDuration;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

const ANNOTATION_PREFIX: &str = "shoot.gardener.cloud/cleanup-";

/// Annotation overriding the deletion grace period of a stage group.
pub fn grace_period_annotation(group: &str) -> String {
    format!("{ANNOTATION_PREFIX}{group}-grace-period-seconds")
}

/// Annotation overriding the finalize-after period of a stage group.
pub fn finalize_grace_period_annotation(group: &str) -> String {
    format!("{ANNOTATION_PREFIX}{group}-finalize-grace-period-seconds")
}

/// Parse a non-negative number of seconds from an annotation.
///
/// A missing annotation is `None`; anything that is not a non-negative
/// integer fitting into 32 bits is an error.
pub fn parse_seconds(annotations: &BTreeMap<String, String>, key: &str) -> Result<Option<u32>> {
    let Some(raw) = annotations.get(key) else {
        return Ok(None);
    };
    let invalid = |reason: &str| Error::InvalidAnnotation {
        key: key.to_string(),
        value: raw.clone(),
        reason: reason.to_string(),
    };

    let seconds: i64 = raw
        .trim()
        .parse()
        .map_err(|_| invalid("not an integer number of seconds"))?;
    if seconds < 0 {
        return Err(invalid("must not be negative"));
    }
    let seconds = u32::try_from(seconds).map_err(|_| invalid("out of range"))?;
    Ok(Some(seconds))
}

/// Timing of one stage group.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StageTiming {
    /// Grace period of the first deletion; unset uses each object's default
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grace_period_seconds: Option<u32>,
    /// Time after deletion at which finalizers are removed; unset never does
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finalize_after: Option<SignedDuration>,
}

impl StageTiming {
    /// Apply the overrides of `group` found in `annotations` to `self`.
    pub fn with_overrides(
        self,
        group: &str,
        annotations: &BTreeMap<String, String>,
    ) -> Result<Self> {
        let grace_period_seconds =
            parse_seconds(annotations, &grace_period_annotation(group))?.or(self.grace_period_seconds);
        let finalize_after = parse_seconds(annotations, &finalize_grace_period_annotation(group))?
            .map(|s| SignedDuration::from_secs(i64::from(s)))
            .or(self.finalize_after);
        Ok(Self {
            grace_period_seconds,
            finalize_after,
        })
    }
}
