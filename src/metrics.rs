//! Prometheus metrics for health checks and cleanup.
//!
//! The registry is owned by [`CareMetrics`]; serving it is up to the
//! embedding process, which can call [`CareMetrics::encode`].

use prometheus_client::encoding::text::encode;
use prometheus_client::encoding::{EncodeLabel, EncodeLabelSet, LabelSetEncoder};
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::metrics::histogram::{Histogram, exponential_buckets};
use prometheus_client::registry::Registry;

use crate::crd::{Condition, ConditionStatus};

const STATUSES: [ConditionStatus; 4] = [
    ConditionStatus::True,
    ConditionStatus::False,
    ConditionStatus::Progressing,
    ConditionStatus::Unknown,
];

/// Labels of per-condition metrics
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct ConditionLabels {
    pub shoot: String,
    pub condition: String,
    pub status: String,
}

impl EncodeLabelSet for ConditionLabels {
    fn encode(&self, encoder: &mut LabelSetEncoder<'_>) -> Result<(), std::fmt::Error> {
        ("shoot", self.shoot.as_str()).encode(encoder.encode_label())?;
        ("condition", self.condition.as_str()).encode(encoder.encode_label())?;
        ("status", self.status.as_str()).encode(encoder.encode_label())?;
        Ok(())
    }
}

/// Labels of cleanup stage metrics
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct StageLabels {
    pub kind: String,
    pub outcome: String,
}

impl EncodeLabelSet for StageLabels {
    fn encode(&self, encoder: &mut LabelSetEncoder<'_>) -> Result<(), std::fmt::Error> {
        ("kind", self.kind.as_str()).encode(encoder.encode_label())?;
        ("outcome", self.outcome.as_str()).encode(encoder.encode_label())?;
        Ok(())
    }
}

/// Labels of per-shoot metrics
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct ShootLabels {
    pub shoot: String,
}

impl EncodeLabelSet for ShootLabels {
    fn encode(&self, encoder: &mut LabelSetEncoder<'_>) -> Result<(), std::fmt::Error> {
        ("shoot", self.shoot.as_str()).encode(encoder.encode_label())?;
        Ok(())
    }
}

/// Metrics of health checks and cleanup
pub struct CareMetrics {
    /// 1 for the current status of every condition, 0 for the others
    pub condition_status: Family<ConditionLabels, Gauge>,
    /// Finished cleanup stages by outcome
    pub cleanup_stages_total: Family<StageLabels, Counter>,
    /// Duration of one health check run
    pub health_check_duration_seconds: Family<ShootLabels, Histogram>,
    registry: Registry,
}

impl Default for CareMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl CareMetrics {
    /// Create a new metrics instance with registered metrics
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let condition_status = Family::<ConditionLabels, Gauge>::default();
        registry.register(
            "shoot_care_condition_status",
            "Current status of shoot health conditions",
            condition_status.clone(),
        );

        let cleanup_stages_total = Family::<StageLabels, Counter>::default();
        registry.register(
            "shoot_care_cleanup_stages",
            "Total number of finished cleanup stages by outcome",
            cleanup_stages_total.clone(),
        );

        let health_check_duration_seconds =
            Family::<ShootLabels, Histogram>::new_with_constructor(|| {
                Histogram::new(exponential_buckets(0.01, 2.0, 12))
            });
        registry.register(
            "shoot_care_health_check_duration_seconds",
            "Duration of shoot health checks in seconds",
            health_check_duration_seconds.clone(),
        );

        Self {
            condition_status,
            cleanup_stages_total,
            health_check_duration_seconds,
            registry,
        }
    }

    /// Record the status of each condition of a shoot
    pub fn record_conditions(&self, shoot: &str, conditions: &[Condition]) {
        for condition in conditions {
            for status in STATUSES {
                let labels = ConditionLabels {
                    shoot: shoot.to_string(),
                    condition: condition.r#type.clone(),
                    status: status.to_string(),
                };
                self.condition_status
                    .get_or_create(&labels)
                    .set(i64::from(condition.status == status));
            }
        }
    }

    /// Record the duration of a health check
    pub fn record_health_check(&self, shoot: &str, duration_secs: f64) {
        let labels = ShootLabels {
            shoot: shoot.to_string(),
        };
        self.health_check_duration_seconds
            .get_or_create(&labels)
            .observe(duration_secs);
    }

    /// Record the outcome of a cleanup stage
    pub fn record_stage(&self, kind: &str, succeeded: bool) {
        let labels = StageLabels {
            kind: kind.to_string(),
            outcome: if succeeded { "succeeded" } else { "failed" }.to_string(),
        };
        self.cleanup_stages_total.get_or_create(&labels).inc();
    }

    /// Encode metrics to Prometheus text format
    pub fn encode(&self) -> String {
        let mut buffer = String::new();
        if encode(&mut buffer, &self.registry).is_err() {
            tracing::error!("Failed to encode metrics");
            return "# Error encoding metrics".to_string();
        }
        buffer
    }
}
