//! Significance reports, final outcomes and persisted records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::experiments::{Experiment, ExperimentStatus, PrimaryMetric, Variant};

/// Output of a statistical significance check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignificanceReport {
    /// Two-tailed p-value of the best candidate variant
    pub p_value: f64,
    /// Confidence in percent, (1 - p) x 100
    pub confidence: f64,
    /// Whether the result clears the experiment's confidence level
    pub is_significant: bool,
    /// Winning variant ID, present only when significant
    pub winning_variant: Option<String>,
    /// Relative conversion-rate lift vs. control, in percent
    pub lift_percent: f64,
}

/// Final result persisted when an experiment completes
///
/// `winning_variant` of `None` means the control was retained.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentOutcome {
    pub winning_variant: Option<String>,
    pub confidence: f64,
    pub lift_percent: f64,
    pub p_value: f64,
    /// Human-readable one-line summary for dashboards and audit logs
    pub summary: String,
}

/// Durable experiment record as held by the persistence store
///
/// Carries the full configuration so a restart restores experiments with
/// the same primary metric, confidence level and auto-select behavior
/// they were created with, not engine defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedExperiment {
    pub id: String,
    pub campaign_id: String,
    /// Serialized JSON array of [`Variant`] with their current metrics
    pub variants: String,
    pub start_date: DateTime<Utc>,
    pub end_date: Option<DateTime<Utc>>,
    pub primary_metric: PrimaryMetric,
    pub confidence_level: f64,
    pub auto_select_winner: bool,
    pub status: ExperimentStatus,
}

impl PersistedExperiment {
    /// Build a durable record from a registered experiment
    pub fn from_experiment(experiment: &Experiment) -> serde_json::Result<Self> {
        Ok(Self {
            id: experiment.id.clone(),
            campaign_id: experiment.campaign_id.clone(),
            variants: serde_json::to_string(&experiment.variants)?,
            start_date: experiment.start_date,
            end_date: experiment.end_date,
            primary_metric: experiment.primary_metric,
            confidence_level: experiment.confidence_level,
            auto_select_winner: experiment.auto_select_winner,
            status: experiment.status,
        })
    }

    /// Decode the serialized variant list
    pub fn decode_variants(&self) -> serde_json::Result<Vec<Variant>> {
        serde_json::from_str(&self.variants)
    }
}
