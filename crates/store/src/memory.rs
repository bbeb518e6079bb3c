//! In-memory experiment store
//!
//! DashMap-backed implementation used by tests and single-node deployments
//! where durability is delegated elsewhere. Completed outcomes are kept as
//! serialized JSON, mirroring how a relational backend would store the
//! results column.

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;

use campaign_optimizer_types::{ExperimentOutcome, ExperimentStatus, PersistedExperiment};

use crate::{
    error::{StoreError, StoreResult},
    store::ExperimentStore,
};

/// In-memory implementation of [`ExperimentStore`]
#[derive(Debug, Clone, Default)]
pub struct MemoryExperimentStore {
    records: Arc<DashMap<String, PersistedExperiment>>,
    outcomes: Arc<DashMap<String, String>>,
}

impl MemoryExperimentStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of a stored record, if present
    pub fn record(&self, experiment_id: &str) -> Option<PersistedExperiment> {
        self.records.get(experiment_id).map(|r| r.value().clone())
    }

    /// Serialized outcome for a completed experiment, if present
    pub fn outcome_json(&self, experiment_id: &str) -> Option<String> {
        self.outcomes.get(experiment_id).map(|o| o.value().clone())
    }

    /// Number of stored records
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the store holds no records
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl ExperimentStore for MemoryExperimentStore {
    async fn load_running(&self) -> StoreResult<Vec<PersistedExperiment>> {
        Ok(self
            .records
            .iter()
            .filter(|r| r.status == ExperimentStatus::Running)
            .map(|r| r.value().clone())
            .collect())
    }

    async fn put(&self, record: PersistedExperiment) -> StoreResult<()> {
        self.records.insert(record.id.clone(), record);
        Ok(())
    }

    async fn save_metrics(&self, experiment_id: &str, variants_json: &str) -> StoreResult<()> {
        let mut record = self
            .records
            .get_mut(experiment_id)
            .ok_or_else(|| StoreError::NotFound(experiment_id.to_string()))?;

        record.variants = variants_json.to_string();
        Ok(())
    }

    async fn mark_completed(
        &self,
        experiment_id: &str,
        outcome: &ExperimentOutcome,
    ) -> StoreResult<()> {
        let outcome_json = serde_json::to_string(outcome)?;

        let mut record = self
            .records
            .get_mut(experiment_id)
            .ok_or_else(|| StoreError::NotFound(experiment_id.to_string()))?;

        record.status = ExperimentStatus::Completed;
        drop(record);

        self.outcomes.insert(experiment_id.to_string(), outcome_json);
        Ok(())
    }
}
