//! Configuration management for the campaign experimentation engine

use figment::{
    providers::{Env, Format, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(String),

    #[error("Invalid configuration: {0}")]
    Validation(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Top-level configuration for the experimentation engine
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentsConfig {
    /// Engine thresholds and cadences
    pub engine: EngineSettings,

    /// Observability settings
    pub observability: ObservabilityConfig,
}

impl ExperimentsConfig {
    /// Load configuration from an optional YAML file and the environment
    ///
    /// Environment variables prefixed with `EXPERIMENTS_` override file
    /// values, with `__` separating nesting levels
    /// (e.g. `EXPERIMENTS_ENGINE__FLUSH_BATCH_SIZE=25`).
    pub fn load(config_path: Option<PathBuf>) -> Result<Self> {
        let mut figment = Figment::new();

        if let Some(path) = config_path {
            figment = figment.merge(Yaml::file(path));
        }

        figment = figment.merge(Env::prefixed("EXPERIMENTS_").split("__"));

        figment
            .extract()
            .map_err(|e| ConfigError::Load(e.to_string()))
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        let engine = &self.engine;

        if engine.default_confidence_level <= 50.0 || engine.default_confidence_level >= 100.0 {
            return Err(ConfigError::Validation(
                "Default confidence level must be between 50 and 100 percent".to_string(),
            ));
        }

        if engine.flush_batch_size == 0 {
            return Err(ConfigError::Validation(
                "Flush batch size must be at least 1".to_string(),
            ));
        }

        if engine.min_conversions_for_winner == 0 {
            return Err(ConfigError::Validation(
                "Minimum conversions for winner selection must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}

/// Engine thresholds and cadences
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Confidence level in percent applied when an experiment does not
    /// specify one
    pub default_confidence_level: f64,

    /// Conversions a variant must accumulate before automatic winner
    /// selection may trigger
    pub min_conversions_for_winner: u64,

    /// Tracked events between metric flushes to the persistence store
    pub flush_batch_size: u64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            default_confidence_level: 95.0,
            min_conversions_for_winner: 100,
            flush_batch_size: 10,
        }
    }
}

/// Observability configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level
    pub log_level: String,

    /// Enable structured JSON logging
    pub json_logging: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logging: false,
        }
    }
}
