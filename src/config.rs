//! Configuration consumed by health checks and cleanup.
//!
//! Loaded once per reconciliation by the caller, typically from the
//! component configuration file. Durations accept both the friendly format
//! (`5m`, `1h 30m`) and ISO 8601 (`PT5M`).

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use jiff::SignedDuration;
use serde::{Deserialize, Serialize};

use crate::cleanup::StageTiming;
use crate::crd::{ExtensionKind, default_extension_kinds};
use crate::error::{Error, Result};

/// Per-condition grace periods, keyed by condition type.
pub type Thresholds = HashMap<String, SignedDuration>;

/// Configuration of the health checks.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CareConfig {
    /// How long a condition may fail before it is reported as `False`.
    #[serde(default)]
    pub condition_thresholds: Vec<ConditionThreshold>,

    /// Handling of extension health reports that stopped being updated.
    #[serde(default)]
    pub stale_extension_health_checks: StaleExtensionHealthChecks,

    /// Extension kinds whose health reports are aggregated.
    #[serde(default = "default_extension_kinds")]
    pub extension_kinds: Vec<ExtensionKind>,

    /// Managed resources that make up the shoot's system components.
    #[serde(default = "default_managed_resource_names")]
    pub managed_resource_names: Vec<String>,

    /// Whether the logging stack is deployed into control plane namespaces.
    #[serde(default)]
    pub logging_enabled: bool,

    /// Labels of the daemon sets in the shoot's `kube-system` namespace that
    /// belong to the system components.
    #[serde(default = "default_system_component_labels")]
    pub system_component_labels: BTreeMap<String, String>,

    /// Labels of the tunnel pods in the shoot's `kube-system` namespace.
    #[serde(default = "default_tunnel_pod_labels")]
    pub tunnel_pod_labels: BTreeMap<String, String>,

    /// Port probed on a tunnel pod to verify the connection.
    #[serde(default = "default_tunnel_port")]
    pub tunnel_port: u16,
}

/// Grace period of one condition type.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
pub struct ConditionThreshold {
    #[serde(rename = "type")]
    pub condition_type: String,
    pub duration: SignedDuration,
}

/// Staleness detection for extension health reports.
#[derive(Clone, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
pub struct StaleExtensionHealthChecks {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold: Option<SignedDuration>,
}

/// Default threshold for stale extension health reports.
pub const DEFAULT_STALENESS_THRESHOLD: SignedDuration = SignedDuration::from_secs(300);

fn default_managed_resource_names() -> Vec<String> {
    [
        "shoot-core-coredns",
        "shoot-core-kube-proxy",
        "shoot-core-system",
        "shoot-core-vpn-shoot",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_tunnel_pod_labels() -> BTreeMap<String, String> {
    BTreeMap::from([("app".to_string(), "vpn-shoot".to_string())])
}

fn default_system_component_labels() -> BTreeMap<String, String> {
    BTreeMap::from([(
        "gardener.cloud/role".to_string(),
        "system-component".to_string(),
    )])
}

fn default_tunnel_port() -> u16 {
    9443
}

impl Default for CareConfig {
    fn default() -> Self {
        Self {
            condition_thresholds: Vec::new(),
            stale_extension_health_checks: StaleExtensionHealthChecks::default(),
            extension_kinds: default_extension_kinds(),
            managed_resource_names: default_managed_resource_names(),
            logging_enabled: false,
            system_component_labels: default_system_component_labels(),
            tunnel_pod_labels: default_tunnel_pod_labels(),
            tunnel_port: default_tunnel_port(),
        }
    }
}

impl CareConfig {
    /// Add a grace period for a condition type
    pub fn with_threshold(mut self, condition_type: &str, duration: SignedDuration) -> Self {
        self.condition_thresholds.retain(|t| t.condition_type != condition_type);
        self.condition_thresholds.push(ConditionThreshold {
            condition_type: condition_type.to_string(),
            duration,
        });
        self
    }

    /// Enable staleness detection for extension health reports
    pub fn with_staleness_threshold(mut self, threshold: SignedDuration) -> Self {
        self.stale_extension_health_checks = StaleExtensionHealthChecks {
            enabled: true,
            threshold: Some(threshold),
        };
        self
    }

    /// Grace periods keyed by condition type
    pub fn thresholds(&self) -> Thresholds {
        self.condition_thresholds
            .iter()
            .map(|t| (t.condition_type.clone(), t.duration))
            .collect()
    }

    /// Age after which extension health reports are considered outdated
    pub fn staleness_threshold(&self) -> Option<SignedDuration> {
        let stale = &self.stale_extension_health_checks;
        stale
            .enabled
            .then(|| stale.threshold.unwrap_or(DEFAULT_STALENESS_THRESHOLD))
    }

    /// Reject negative durations
    pub fn validate(&self) -> Result<()> {
        for threshold in &self.condition_thresholds {
            if threshold.duration.is_negative() {
                return Err(Error::Validation(format!(
                    "threshold for condition {} must not be negative",
                    threshold.condition_type
                )));
            }
        }
        if self
            .stale_extension_health_checks
            .threshold
            .is_some_and(|t| t.is_negative())
        {
            return Err(Error::Validation(
                "staleness threshold for extension health checks must not be negative".into(),
            ));
        }
        Ok(())
    }
}

/// Configuration of the cleanup engine.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupConfig {
    /// Interval between two cleanup attempts of a stage.
    #[serde(default = "default_cleanup_interval")]
    pub interval: SignedDuration,

    /// Overall time budget of a cleanup run.
    #[serde(default = "default_cleanup_timeout")]
    pub timeout: SignedDuration,

    /// Timing per stage group, keyed by group name (e.g. `namespaces`);
    /// groups not listed use their built-in timing.
    #[serde(default)]
    pub stages: BTreeMap<String, StageTiming>,
}

fn default_cleanup_interval() -> SignedDuration {
    SignedDuration::from_secs(5)
}

fn default_cleanup_timeout() -> SignedDuration {
    SignedDuration::from_mins(10)
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            interval: default_cleanup_interval(),
            timeout: default_cleanup_timeout(),
            stages: BTreeMap::new(),
        }
    }
}

impl CleanupConfig {
    /// Polling interval as a std duration
    pub fn interval(&self) -> Duration {
        self.interval.unsigned_abs()
    }

    /// Time budget as a std duration
    pub fn timeout(&self) -> Duration {
        self.timeout.unsigned_abs()
    }

    /// Reject negative durations
    pub fn validate(&self) -> Result<()> {
        if self.interval.is_negative() || self.interval.is_zero() {
            return Err(Error::Validation("cleanup interval must be positive".into()));
        }
        if self.timeout.is_negative() {
            return Err(Error::Validation("cleanup timeout must not be negative".into()));
        }
        for (group, timing) in &self.stages {
            if timing.finalize_after.is_some_and(|d| d.is_negative()) {
                return Err(Error::Validation(format!(
                    "finalize-after of cleanup stage group {group} must not be negative"
                )));
            }
        }
        Ok(())
    }
}
