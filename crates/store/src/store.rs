//! Experiment store trait definition
//!
//! This module defines the `ExperimentStore` trait that all persistence
//! implementations must implement. All operations are async so both
//! in-memory and remote backends fit behind the same interface.

use async_trait::async_trait;

use campaign_optimizer_types::{ExperimentOutcome, PersistedExperiment};

use crate::error::StoreResult;

/// Durable store for experiment records and final results
///
/// Implementations must be safe to call from concurrent tasks. The engine
/// only ever writes on a batching cadence or at completion; it tolerates
/// store failures by logging and retrying on the next batch boundary, so
/// implementations should surface errors rather than block.
#[async_trait]
pub trait ExperimentStore: Send + Sync {
    /// Fetch all experiments currently in the running state
    ///
    /// Called once at process startup to rebuild the in-memory active set.
    async fn load_running(&self) -> StoreResult<Vec<PersistedExperiment>>;

    /// Insert or overwrite an experiment record
    async fn put(&self, record: PersistedExperiment) -> StoreResult<()>;

    /// Overwrite the serialized variant list for an experiment
    ///
    /// Called on the flush cadence; the payload is a JSON array of variants
    /// carrying their current metrics. Returns `NotFound` for an unknown
    /// experiment ID.
    async fn save_metrics(&self, experiment_id: &str, variants_json: &str) -> StoreResult<()>;

    /// Mark an experiment completed and record its final outcome
    async fn mark_completed(
        &self,
        experiment_id: &str,
        outcome: &ExperimentOutcome,
    ) -> StoreResult<()>;
}
