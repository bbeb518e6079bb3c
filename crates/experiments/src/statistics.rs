//! Statistical significance testing for campaign experiments
//!
//! Two-proportion z-test over conversion counts, with conservative
//! handling of degenerate inputs: an undefined test (zero clicks in
//! either group, or zero standard error) reports a p-value of 1.0 rather
//! than erroring, so downstream dashboards always receive a well-defined
//! number and an unmeasurable difference is never declared significant.

use statrs::distribution::{ContinuousCDF, Normal};

use crate::errors::{ExperimentError, Result};

/// Statistical test seam
pub trait StatisticalTest {
    /// Two-tailed p-value for the null hypothesis of no difference
    fn p_value(&self) -> Result<f64>;

    /// Whether the result is significant at the given alpha level
    fn is_significant(&self, alpha: f64) -> Result<bool> {
        Ok(self.p_value()? < alpha)
    }
}

/// Two-proportion z-test comparing a variant's conversion rate to control
///
/// Conversions are successes and clicks are trials, matching how the
/// engine derives conversion rate.
#[derive(Debug, Clone, Copy)]
pub struct ConversionZTest {
    /// Conversions in the control group
    pub control_conversions: u64,
    /// Clicks in the control group
    pub control_clicks: u64,
    /// Conversions in the variant group
    pub variant_conversions: u64,
    /// Clicks in the variant group
    pub variant_clicks: u64,
}

impl ConversionZTest {
    /// Create a new z-test
    pub fn new(
        control_conversions: u64,
        control_clicks: u64,
        variant_conversions: u64,
        variant_clicks: u64,
    ) -> Self {
        Self {
            control_conversions,
            control_clicks,
            variant_conversions,
            variant_clicks,
        }
    }

    /// Per-group conversion fractions; a group with zero clicks reports 0.0
    pub fn proportions(&self) -> (f64, f64) {
        let control = if self.control_clicks > 0 {
            self.control_conversions as f64 / self.control_clicks as f64
        } else {
            0.0
        };

        let variant = if self.variant_clicks > 0 {
            self.variant_conversions as f64 / self.variant_clicks as f64
        } else {
            0.0
        };

        (control, variant)
    }

    /// Pooled proportion across both groups
    pub fn pooled_proportion(&self) -> f64 {
        let total_conversions = self.control_conversions + self.variant_conversions;
        let total_clicks = self.control_clicks + self.variant_clicks;

        if total_clicks > 0 {
            total_conversions as f64 / total_clicks as f64
        } else {
            0.0
        }
    }

    /// Pooled standard error: sqrt(p(1-p)(1/n1 + 1/n2))
    ///
    /// `None` when either group has zero clicks or the pooled proportion
    /// is degenerate (0 or 1), in which case the test is undefined.
    pub fn standard_error(&self) -> Option<f64> {
        if self.control_clicks == 0 || self.variant_clicks == 0 {
            return None;
        }

        let pooled = self.pooled_proportion();
        let n1 = self.control_clicks as f64;
        let n2 = self.variant_clicks as f64;

        let se = (pooled * (1.0 - pooled) * (1.0 / n1 + 1.0 / n2)).sqrt();
        if se > 0.0 {
            Some(se)
        } else {
            None
        }
    }
}

impl StatisticalTest for ConversionZTest {
    /// Two-tailed p-value: 2 x (1 - phi(|z|))
    ///
    /// An undefined test conservatively reports 1.0.
    fn p_value(&self) -> Result<f64> {
        let se = match self.standard_error() {
            Some(se) => se,
            None => return Ok(1.0),
        };

        let (control_rate, variant_rate) = self.proportions();
        let z = (variant_rate - control_rate).abs() / se;

        let normal = Normal::new(0.0, 1.0)
            .map_err(|e| ExperimentError::StatisticalError(e.to_string()))?;

        Ok((2.0 * (1.0 - normal.cdf(z))).clamp(0.0, 1.0))
    }
}

/// Pre-launch sample size planning for a conversion experiment
///
/// Answers "how many clicks per variant do we need to detect a given
/// relative lift over the baseline conversion rate at the configured
/// power and significance level".
pub struct SampleSizePlan {
    /// Baseline (control) conversion rate as a fraction
    pub baseline_rate: f64,
    /// Minimum detectable relative lift (e.g. 0.2 for +20%)
    pub min_relative_lift: f64,
    /// Statistical power (1 - beta)
    pub power: f64,
    /// Significance level (alpha)
    pub alpha: f64,
}

impl SampleSizePlan {
    /// Create a new plan, validating the inputs
    pub fn new(baseline_rate: f64, min_relative_lift: f64, power: f64, alpha: f64) -> Result<Self> {
        if baseline_rate <= 0.0 || baseline_rate >= 1.0 {
            return Err(ExperimentError::InvalidConfig(
                "Baseline rate must be between 0 and 1".to_string(),
            ));
        }

        if power <= 0.0 || power >= 1.0 {
            return Err(ExperimentError::InvalidConfig(
                "Power must be between 0 and 1".to_string(),
            ));
        }

        if alpha <= 0.0 || alpha >= 1.0 {
            return Err(ExperimentError::InvalidConfig(
                "Alpha must be between 0 and 1".to_string(),
            ));
        }

        Ok(Self {
            baseline_rate,
            min_relative_lift,
            power,
            alpha,
        })
    }

    /// Required clicks per variant
    pub fn required_per_variant(&self) -> Result<usize> {
        let p1 = self.baseline_rate;
        let p2 = self.baseline_rate * (1.0 + self.min_relative_lift);

        if p2 >= 1.0 {
            return Err(ExperimentError::InvalidConfig(
                "Lift too large, treatment rate exceeds 1.0".to_string(),
            ));
        }

        let normal = Normal::new(0.0, 1.0)
            .map_err(|e| ExperimentError::StatisticalError(e.to_string()))?;

        let z_alpha = normal.inverse_cdf(1.0 - self.alpha / 2.0);
        let z_beta = normal.inverse_cdf(self.power);

        let p_avg = (p1 + p2) / 2.0;
        let delta = (p2 - p1).abs();

        let n = ((z_alpha + z_beta).powi(2) * 2.0 * p_avg * (1.0 - p_avg)) / delta.powi(2);

        Ok(n.ceil() as usize)
    }
}
