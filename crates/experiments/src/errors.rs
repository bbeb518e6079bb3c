//! Error types for the experimentation engine

use thiserror::Error;

use campaign_optimizer_store::StoreError;

pub type Result<T> = std::result::Result<T, ExperimentError>;

#[derive(Error, Debug)]
pub enum ExperimentError {
    #[error("Invalid experiment configuration: {0}")]
    InvalidConfig(String),

    #[error("Experiment not found: {0}")]
    ExperimentNotFound(String),

    #[error("Variant not found: {0}")]
    VariantNotFound(String),

    #[error("No control variant in experiment: {0}")]
    MissingControl(String),

    #[error("Statistical error: {0}")]
    StatisticalError(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
