//! Core types and data models for the campaign experimentation engine
//!
//! This crate provides the fundamental data structures shared by the
//! engine, the persistence layer, and callers embedding experimentation
//! into their product surfaces.

pub mod experiments;
pub mod metrics;
pub mod results;

pub use experiments::{Experiment, ExperimentConfig, ExperimentStatus, PrimaryMetric, Variant};
pub use metrics::{EventKind, VariantMetrics};
pub use results::{ExperimentOutcome, PersistedExperiment, SignificanceReport};
