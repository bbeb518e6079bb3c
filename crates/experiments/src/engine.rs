//! Experiment engine
//!
//! Facade combining the in-memory registry, the persistence store and the
//! configured thresholds. Assignment and tracking are synchronous
//! in-memory operations on the caller's path; persistence happens on a
//! batching cadence as fire-and-forget tasks, so a store outage degrades
//! durability without ever breaking the product surface invoking the
//! engine.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use campaign_optimizer_config::ExperimentsConfig;
use campaign_optimizer_store::ExperimentStore;
use campaign_optimizer_types::{
    EventKind, Experiment, ExperimentConfig, ExperimentOutcome, ExperimentStatus,
    SignificanceReport, VariantMetrics,
};

use crate::{
    assignment,
    errors::{ExperimentError, Result},
    registry::ExperimentRegistry,
    statistics::{ConversionZTest, StatisticalTest},
};

/// Statistical A/B experimentation engine
///
/// Holds the sole writable copy of active-experiment state for the
/// process; the injected store owns the durable copy.
pub struct ExperimentEngine {
    registry: Arc<ExperimentRegistry>,
    store: Arc<dyn ExperimentStore>,
    default_confidence_level: f64,
    min_conversions_for_winner: u64,
    flush_batch_size: u64,
}

impl ExperimentEngine {
    /// Create a new engine backed by the given store
    pub fn new(store: Arc<dyn ExperimentStore>, config: &ExperimentsConfig) -> Self {
        let engine = &config.engine;

        Self {
            registry: Arc::new(ExperimentRegistry::new()),
            store,
            default_confidence_level: engine.default_confidence_level,
            min_conversions_for_winner: engine.min_conversions_for_winner,
            flush_batch_size: engine.flush_batch_size,
        }
    }

    /// Register an experiment as active and seed its metrics cache
    ///
    /// Structural misconfiguration (no variants, duplicate variant IDs, an
    /// allocation above 100) is rejected with a typed error. The soft
    /// invariants (allocations summing to 100, exactly one control) are
    /// logged as warnings and left to the documented runtime fallbacks.
    /// Re-registration overwrites prior state for the ID.
    pub fn initialize_test(
        &self,
        experiment_id: impl Into<String>,
        config: ExperimentConfig,
    ) -> Result<()> {
        let experiment_id = experiment_id.into();
        validate_config(&experiment_id, &config)?;

        let experiment = Experiment {
            id: experiment_id.clone(),
            campaign_id: config.campaign_id,
            status: ExperimentStatus::Running,
            variants: config.variants,
            start_date: config.start_date,
            end_date: config.end_date,
            primary_metric: config.primary_metric.unwrap_or_default(),
            confidence_level: config
                .confidence_level
                .unwrap_or(self.default_confidence_level),
            auto_select_winner: config.auto_select_winner,
        };

        info!(
            "Initializing experiment {} for campaign {} with {} variant(s)",
            experiment_id,
            experiment.campaign_id,
            experiment.variants.len()
        );
        self.registry.insert(experiment);

        Ok(())
    }

    /// Deterministically assign a user to a variant
    ///
    /// Pure in-memory bucketing: the same (experiment, user) pair maps to
    /// the same variant for the lifetime of the configuration. Returns
    /// `None` with a logged warning when the experiment is not active.
    pub fn assign_variant(&self, experiment_id: &str, user_id: &str) -> Option<String> {
        let experiment = match self.registry.snapshot_experiment(experiment_id) {
            Some(experiment) => experiment,
            None => {
                warn!(
                    "Assignment requested for inactive experiment {}",
                    experiment_id
                );
                return None;
            }
        };

        let bucket = assignment::bucket_for(experiment_id, user_id);
        let variant = assignment::variant_for_bucket(&experiment.variants, bucket)?;

        debug!(
            "Assigned user {} to variant {} in experiment {} (bucket {})",
            user_id, variant.id, experiment_id, bucket
        );
        Some(variant.id.clone())
    }

    /// Record an impression, click or conversion for a variant
    ///
    /// Best-effort: an unknown experiment or variant is a logged no-op,
    /// never an error, so tracking cannot break the caller's request
    /// path. `value` is added to revenue on conversions. Every
    /// `flush_batch_size`-th event for the experiment spawns a
    /// fire-and-forget metrics flush to the store; with auto-selection
    /// enabled, a variant reaching the conversion threshold triggers an
    /// immediate significance check.
    pub fn track_event(
        &self,
        experiment_id: &str,
        variant_id: &str,
        kind: EventKind,
        value: Option<f64>,
    ) {
        let recorded = match self.registry.record_event(experiment_id, variant_id, kind, value) {
            Some(recorded) => recorded,
            None => {
                warn!(
                    "Dropping {:?} event for unknown experiment/variant {}/{}",
                    kind, experiment_id, variant_id
                );
                return;
            }
        };

        if recorded.event_total % self.flush_batch_size == 0 {
            self.spawn_metrics_flush(experiment_id);
        }

        if recorded.variant_conversions >= self.min_conversions_for_winner {
            self.maybe_select_winner(experiment_id);
        }
    }

    /// Evaluate statistical significance against the control variant
    ///
    /// The one engine API permitted to fail loudly: a missing control is a
    /// configuration error the caller must fix. Every non-control variant
    /// is compared to control with a two-proportion z-test; among variants
    /// with positive lift, the lowest p-value is the candidate winner,
    /// reported only when it clears the experiment's confidence level.
    pub fn calculate_statistical_significance(
        &self,
        experiment_id: &str,
    ) -> Result<SignificanceReport> {
        let experiment = self
            .registry
            .snapshot_experiment(experiment_id)
            .ok_or_else(|| ExperimentError::ExperimentNotFound(experiment_id.to_string()))?;
        let metrics = self
            .registry
            .snapshot_metrics(experiment_id)
            .ok_or_else(|| ExperimentError::ExperimentNotFound(experiment_id.to_string()))?;

        let control = experiment
            .control()
            .ok_or_else(|| ExperimentError::MissingControl(experiment_id.to_string()))?;
        let control_metrics = metrics.get(&control.id).cloned().unwrap_or_default();
        let control_rate = control_metrics.conversion_fraction();

        struct Candidate {
            variant_id: String,
            p_value: f64,
            lift_percent: f64,
        }

        let mut best: Option<Candidate> = None;
        for variant in experiment.variants.iter().filter(|v| !v.is_control) {
            let variant_metrics = metrics.get(&variant.id).cloned().unwrap_or_default();
            let variant_rate = variant_metrics.conversion_fraction();

            let lift_percent = if control_rate > 0.0 {
                (variant_rate - control_rate) / control_rate * 100.0
            } else {
                0.0
            };

            let test = ConversionZTest::new(
                control_metrics.conversions,
                control_metrics.clicks,
                variant_metrics.conversions,
                variant_metrics.clicks,
            );
            let p_value = test.p_value()?;

            debug!(
                "Variant {} vs control in {}: rate {:.4} vs {:.4}, lift {:+.1}%, p {:.4}",
                variant.id, experiment_id, variant_rate, control_rate, lift_percent, p_value
            );

            if lift_percent > 0.0 && best.as_ref().map_or(true, |b| p_value < b.p_value) {
                best = Some(Candidate {
                    variant_id: variant.id.clone(),
                    p_value,
                    lift_percent,
                });
            }
        }

        let alpha = 1.0 - experiment.confidence_level / 100.0;
        let report = match best {
            Some(candidate) => {
                let is_significant = candidate.p_value < alpha;
                SignificanceReport {
                    p_value: candidate.p_value,
                    confidence: (1.0 - candidate.p_value) * 100.0,
                    is_significant,
                    winning_variant: is_significant.then(|| candidate.variant_id),
                    lift_percent: candidate.lift_percent,
                }
            }
            None => SignificanceReport {
                p_value: 1.0,
                confidence: 0.0,
                is_significant: false,
                winning_variant: None,
                lift_percent: 0.0,
            },
        };

        Ok(report)
    }

    /// Finalize an experiment with the given significance report
    ///
    /// Removes the experiment from the active set synchronously, so no
    /// further assignment or tracking is accepted, then persists the
    /// final outcome in the background, logging any store failure.
    pub fn complete_test(&self, experiment_id: &str, report: &SignificanceReport) {
        let experiment = match self.registry.remove(experiment_id) {
            Some(experiment) => experiment,
            None => {
                warn!(
                    "Completion requested for inactive experiment {}",
                    experiment_id
                );
                return;
            }
        };

        let summary = match &report.winning_variant {
            Some(winner_id) => {
                let winner_name = experiment
                    .variant(winner_id)
                    .map(|v| v.name.as_str())
                    .unwrap_or(winner_id.as_str());
                format!(
                    "Variant {} beat control with {:.1}% confidence ({:+.1}% lift)",
                    winner_name, report.confidence, report.lift_percent
                )
            }
            None => format!(
                "No variant beat control at {:.0}% confidence; control retained",
                experiment.confidence_level
            ),
        };
        info!("Completing experiment {}: {}", experiment_id, summary);

        let outcome = ExperimentOutcome {
            winning_variant: report.winning_variant.clone(),
            confidence: report.confidence,
            lift_percent: report.lift_percent,
            p_value: report.p_value,
            summary,
        };

        let store = Arc::clone(&self.store);
        let experiment_id = experiment_id.to_string();
        tokio::spawn(async move {
            if let Err(err) = store.mark_completed(&experiment_id, &outcome).await {
                error!(
                    "Failed to persist final results for experiment {}: {}",
                    experiment_id, err
                );
            }
        });
    }

    /// Remove an experiment from the active set without finalizing it
    ///
    /// Unflushed metrics tracked since the last batch boundary are not
    /// written; the durable record keeps its running status, so a
    /// subsequent [`load_active_tests`](Self::load_active_tests) resumes
    /// the experiment.
    pub fn pause_test(&self, experiment_id: &str) {
        if self.registry.remove(experiment_id).is_some() {
            info!("Paused experiment {}", experiment_id);
        } else {
            warn!("Pause requested for inactive experiment {}", experiment_id);
        }
    }

    /// Read-only snapshot of an active experiment's metrics, by variant ID
    pub fn current_metrics(&self, experiment_id: &str) -> Option<HashMap<String, VariantMetrics>> {
        self.registry.snapshot_metrics(experiment_id)
    }

    /// Cloned snapshot of an active experiment's configuration
    pub fn experiment(&self, experiment_id: &str) -> Option<Experiment> {
        self.registry.snapshot_experiment(experiment_id)
    }

    /// Cloned snapshots of all active experiments
    pub fn active_experiments(&self) -> Vec<Experiment> {
        self.registry.snapshot_all()
    }

    /// Whether an experiment is currently accepting assignments and events
    pub fn is_active(&self, experiment_id: &str) -> bool {
        self.registry.contains(experiment_id)
    }

    /// Restore all running experiments from the store
    ///
    /// Run once at process startup. Each record is re-initialized with its
    /// full persisted configuration (primary metric, confidence level,
    /// auto-select flag), not engine defaults. A record whose variant
    /// payload fails to decode is skipped with an error log; a corrupt row
    /// must not abort startup. Returns the number of experiments restored.
    pub async fn load_active_tests(&self) -> Result<usize> {
        let records = self.store.load_running().await?;

        let mut restored = 0;
        for record in records {
            let variants = match record.decode_variants() {
                Ok(variants) => variants,
                Err(err) => {
                    error!(
                        "Skipping experiment {} with unreadable variant payload: {}",
                        record.id, err
                    );
                    continue;
                }
            };

            self.registry.insert(Experiment {
                id: record.id,
                campaign_id: record.campaign_id,
                status: ExperimentStatus::Running,
                variants,
                start_date: record.start_date,
                end_date: record.end_date,
                primary_metric: record.primary_metric,
                confidence_level: record.confidence_level,
                auto_select_winner: record.auto_select_winner,
            });
            restored += 1;
        }

        info!("Restored {} running experiment(s) from the store", restored);
        Ok(restored)
    }

    /// Check an auto-select experiment for a significant winner and
    /// complete it if one exists
    ///
    /// Called from the tracking path, so failures (including a missing
    /// control) are logged rather than raised.
    fn maybe_select_winner(&self, experiment_id: &str) {
        let auto_select = self
            .registry
            .snapshot_experiment(experiment_id)
            .map(|e| e.auto_select_winner)
            .unwrap_or(false);
        if !auto_select {
            return;
        }

        match self.calculate_statistical_significance(experiment_id) {
            Ok(report) if report.is_significant => {
                info!(
                    "Auto-selecting winner {:?} for experiment {}",
                    report.winning_variant, experiment_id
                );
                self.complete_test(experiment_id, &report);
            }
            Ok(_) => {}
            Err(err) => {
                warn!(
                    "Winner evaluation failed for experiment {}: {}",
                    experiment_id, err
                );
            }
        }
    }

    /// Persist the experiment's current variant metrics in the background
    fn spawn_metrics_flush(&self, experiment_id: &str) {
        let variants = match self.registry.variants_snapshot(experiment_id) {
            Some(variants) => variants,
            None => return,
        };

        let payload = match serde_json::to_string(&variants) {
            Ok(payload) => payload,
            Err(err) => {
                error!(
                    "Failed to serialize metrics for experiment {}: {}",
                    experiment_id, err
                );
                return;
            }
        };

        let store = Arc::clone(&self.store);
        let experiment_id = experiment_id.to_string();
        tokio::spawn(async move {
            // A failed flush is retried implicitly at the next batch
            // boundary; in-memory metrics remain authoritative meanwhile.
            if let Err(err) = store.save_metrics(&experiment_id, &payload).await {
                warn!(
                    "Metrics flush failed for experiment {}: {}",
                    experiment_id, err
                );
            }
        });
    }
}

/// Reject structurally broken configurations; warn on soft invariants
fn validate_config(experiment_id: &str, config: &ExperimentConfig) -> Result<()> {
    if config.variants.is_empty() {
        return Err(ExperimentError::InvalidConfig(format!(
            "Experiment {} has no variants",
            experiment_id
        )));
    }

    let mut seen = std::collections::HashSet::new();
    for variant in &config.variants {
        if !seen.insert(variant.id.as_str()) {
            return Err(ExperimentError::InvalidConfig(format!(
                "Experiment {} has duplicate variant ID {}",
                experiment_id, variant.id
            )));
        }
        if variant.traffic_allocation > 100 {
            return Err(ExperimentError::InvalidConfig(format!(
                "Variant {} allocation {} exceeds 100",
                variant.id, variant.traffic_allocation
            )));
        }
    }

    if let Some(level) = config.confidence_level {
        if level <= 0.0 || level >= 100.0 {
            return Err(ExperimentError::InvalidConfig(format!(
                "Confidence level {} must be between 0 and 100 percent",
                level
            )));
        }
    }

    let total_allocation: u32 = config
        .variants
        .iter()
        .map(|v| u32::from(v.traffic_allocation))
        .sum();
    if total_allocation != 100 {
        warn!(
            "Variant allocations for experiment {} sum to {}, not 100; uncovered buckets fall back to control",
            experiment_id, total_allocation
        );
    }

    let control_count = config.variants.iter().filter(|v| v.is_control).count();
    if control_count != 1 {
        warn!(
            "Experiment {} has {} control variants; significance checks require exactly one",
            experiment_id, control_count
        );
    }

    Ok(())
}
