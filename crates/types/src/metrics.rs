//! Per-variant metric aggregates
//!
//! Counters mutate continuously while an experiment is active and are
//! frozen at completion or pause. The derived rates are recomputed after
//! every recorded event, so a dashboard read never observes a ratio that
//! lags its counters.

use serde::{Deserialize, Serialize};

/// Kind of tracked experiment event
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Impression,
    Click,
    Conversion,
}

/// Aggregated metrics for a single variant
///
/// Raw counters are monotonically non-decreasing; events are never
/// retracted. Derived fields are 0.0 whenever their denominator is 0.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct VariantMetrics {
    /// Impressions served
    pub impressions: u64,
    /// Clicks recorded
    pub clicks: u64,
    /// Conversions recorded
    pub conversions: u64,
    /// Revenue attributed to conversions
    pub revenue: f64,
    /// Click-through rate in percent (clicks / impressions x 100)
    pub ctr: f64,
    /// Conversion rate in percent (conversions / clicks x 100)
    pub conversion_rate: f64,
    /// Revenue per click
    pub cost_per_click: f64,
}

impl VariantMetrics {
    /// Record a single event and refresh the derived rates
    ///
    /// `value` is only meaningful for conversions, where it is added to
    /// revenue; it is ignored for impressions and clicks.
    pub fn record(&mut self, kind: EventKind, value: Option<f64>) {
        match kind {
            EventKind::Impression => self.impressions += 1,
            EventKind::Click => self.clicks += 1,
            EventKind::Conversion => {
                self.conversions += 1;
                if let Some(revenue) = value {
                    self.revenue += revenue;
                }
            }
        }
        self.recompute_rates();
    }

    /// Recompute ctr, conversion rate and cost-per-click from the raw
    /// counters
    pub fn recompute_rates(&mut self) {
        self.ctr = if self.impressions > 0 {
            self.clicks as f64 / self.impressions as f64 * 100.0
        } else {
            0.0
        };
        self.conversion_rate = if self.clicks > 0 {
            self.conversions as f64 / self.clicks as f64 * 100.0
        } else {
            0.0
        };
        self.cost_per_click = if self.clicks > 0 {
            self.revenue / self.clicks as f64
        } else {
            0.0
        };
    }

    /// Conversion rate as a fraction in [0, 1], as consumed by the z-test
    pub fn conversion_fraction(&self) -> f64 {
        if self.clicks > 0 {
            self.conversions as f64 / self.clicks as f64
        } else {
            0.0
        }
    }

    /// Total events recorded against this variant
    pub fn total_events(&self) -> u64 {
        self.impressions + self.clicks + self.conversions
    }
}
