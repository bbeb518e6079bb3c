//! Experiment and variant definitions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::metrics::VariantMetrics;

/// Status of an experiment
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExperimentStatus {
    Running,
    Paused,
    Completed,
    Cancelled,
}

/// Metric an experiment is primarily judged on
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PrimaryMetric {
    Clicks,
    #[default]
    Conversions,
    Revenue,
    Ctr,
}

/// A single variant (arm) of an experiment
///
/// IDs are caller-supplied: the hosting application owns identifier
/// minting, and persisted records round-trip the same strings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Variant {
    /// Unique variant identifier within the experiment
    pub id: String,
    /// Display name (e.g. "control", "subject-line-b")
    pub name: String,
    /// Share of traffic routed to this variant, in whole percent (0-100)
    pub traffic_allocation: u8,
    /// Whether this variant is the control arm
    pub is_control: bool,
    /// Aggregated metrics for this variant
    #[serde(default)]
    pub metrics: VariantMetrics,
}

impl Variant {
    /// Create a new variant with zeroed metrics
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        traffic_allocation: u8,
        is_control: bool,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            traffic_allocation,
            is_control,
            metrics: VariantMetrics::default(),
        }
    }
}

/// Configuration payload for registering an experiment
///
/// The optional fields fall back to engine-level defaults when absent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentConfig {
    /// Campaign this experiment belongs to
    pub campaign_id: String,
    /// Variants under test, in traffic-walk order
    pub variants: Vec<Variant>,
    /// When the experiment started (or is scheduled to start)
    pub start_date: DateTime<Utc>,
    /// Optional scheduled end
    #[serde(default)]
    pub end_date: Option<DateTime<Utc>>,
    /// Metric the experiment is judged on
    #[serde(default)]
    pub primary_metric: Option<PrimaryMetric>,
    /// Target confidence level in percent (e.g. 95.0)
    #[serde(default)]
    pub confidence_level: Option<f64>,
    /// Complete the experiment automatically once a winner is significant
    #[serde(default)]
    pub auto_select_winner: bool,
}

/// A registered experiment with its resolved configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Experiment {
    /// Unique experiment identifier
    pub id: String,
    /// Campaign this experiment belongs to
    pub campaign_id: String,
    /// Current status
    pub status: ExperimentStatus,
    /// Variants under test, in traffic-walk order
    pub variants: Vec<Variant>,
    /// Start time
    pub start_date: DateTime<Utc>,
    /// Scheduled end, if any
    pub end_date: Option<DateTime<Utc>>,
    /// Metric the experiment is judged on
    pub primary_metric: PrimaryMetric,
    /// Target confidence level in percent
    pub confidence_level: f64,
    /// Complete automatically once a winner is significant
    pub auto_select_winner: bool,
}

impl Experiment {
    /// The control variant, if one is marked
    pub fn control(&self) -> Option<&Variant> {
        self.variants.iter().find(|v| v.is_control)
    }

    /// Look up a variant by ID
    pub fn variant(&self, variant_id: &str) -> Option<&Variant> {
        self.variants.iter().find(|v| v.id == variant_id)
    }
}
