//! In-memory experiment registry
//!
//! The process-wide mutable state of the engine (the active-experiment
//! map and the per-experiment metrics caches) held by an explicit object
//! rather than module-level globals, so the composition root owns it and
//! tests can construct isolated instances.

use dashmap::DashMap;
use std::collections::HashMap;

use campaign_optimizer_types::{EventKind, Experiment, Variant, VariantMetrics};

/// Result of applying one event to the metrics cache
#[derive(Debug, Clone, Copy)]
pub struct RecordedEvent {
    /// Total events tracked for the experiment so far, across variants
    pub event_total: u64,
    /// The tracked variant's conversion count after the event
    pub variant_conversions: u64,
}

/// Registry of active experiments and their metrics caches
#[derive(Debug, Default)]
pub struct ExperimentRegistry {
    /// Active experiment configurations
    active: DashMap<String, Experiment>,
    /// Per-experiment metrics cache, keyed by variant ID
    metrics: DashMap<String, HashMap<String, VariantMetrics>>,
    /// Per-experiment tracked-event counters, for flush batching
    event_counts: DashMap<String, u64>,
}

impl ExperimentRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an experiment, seeding the metrics cache from each
    /// variant's current metrics
    ///
    /// Re-registration overwrites any prior state for the same ID,
    /// including the event counter.
    pub fn insert(&self, experiment: Experiment) {
        let seeded: HashMap<String, VariantMetrics> = experiment
            .variants
            .iter()
            .map(|v| (v.id.clone(), v.metrics.clone()))
            .collect();

        self.metrics.insert(experiment.id.clone(), seeded);
        self.event_counts.insert(experiment.id.clone(), 0);
        self.active.insert(experiment.id.clone(), experiment);
    }

    /// Remove an experiment and its caches, returning the configuration
    pub fn remove(&self, experiment_id: &str) -> Option<Experiment> {
        self.metrics.remove(experiment_id);
        self.event_counts.remove(experiment_id);
        self.active.remove(experiment_id).map(|(_, e)| e)
    }

    /// Whether an experiment is currently active
    pub fn contains(&self, experiment_id: &str) -> bool {
        self.active.contains_key(experiment_id)
    }

    /// Number of active experiments
    pub fn len(&self) -> usize {
        self.active.len()
    }

    /// Whether no experiments are active
    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    /// Cloned snapshot of an active experiment's configuration
    pub fn snapshot_experiment(&self, experiment_id: &str) -> Option<Experiment> {
        self.active.get(experiment_id).map(|e| e.value().clone())
    }

    /// Cloned snapshots of all active experiments
    pub fn snapshot_all(&self) -> Vec<Experiment> {
        self.active.iter().map(|e| e.value().clone()).collect()
    }

    /// Cloned snapshot of an experiment's metrics cache
    pub fn snapshot_metrics(&self, experiment_id: &str) -> Option<HashMap<String, VariantMetrics>> {
        self.metrics.get(experiment_id).map(|m| m.value().clone())
    }

    /// Apply one event to a variant's cached metrics
    ///
    /// The counter increment and the rate recomputation happen inside a
    /// single map access with no await point in between, so concurrent
    /// trackers cannot interleave between the read and the write of the
    /// same variant's metrics. Returns `None` when the experiment or
    /// variant is unknown.
    pub fn record_event(
        &self,
        experiment_id: &str,
        variant_id: &str,
        kind: EventKind,
        value: Option<f64>,
    ) -> Option<RecordedEvent> {
        let variant_conversions = {
            let mut cache = self.metrics.get_mut(experiment_id)?;
            let metrics = cache.get_mut(variant_id)?;
            metrics.record(kind, value);
            metrics.conversions
        };

        let mut count = self.event_counts.get_mut(experiment_id)?;
        *count += 1;

        Some(RecordedEvent {
            event_total: *count,
            variant_conversions,
        })
    }

    /// Current variant list with cached metrics folded in, for persistence
    pub fn variants_snapshot(&self, experiment_id: &str) -> Option<Vec<Variant>> {
        let experiment = self.active.get(experiment_id)?;
        let cache = self.metrics.get(experiment_id)?;

        Some(
            experiment
                .variants
                .iter()
                .map(|variant| {
                    let mut variant = variant.clone();
                    if let Some(metrics) = cache.get(&variant.id) {
                        variant.metrics = metrics.clone();
                    }
                    variant
                })
                .collect(),
        )
    }
}
