//! End-to-end tests for the experimentation engine
//!
//! Exercises the full lifecycle against the in-memory store: assignment,
//! tracking, batched persistence, significance evaluation, automatic
//! winner selection, pause, and startup restore.

use std::sync::Arc;
use std::time::Duration;

use approx::assert_relative_eq;
use chrono::Utc;

use campaign_optimizer_config::ExperimentsConfig;
use campaign_optimizer_store::{ExperimentStore, MemoryExperimentStore};
use campaign_optimizer_types::{
    EventKind, ExperimentConfig, ExperimentStatus, PersistedExperiment, PrimaryMetric, Variant,
};
use experiments::ExperimentEngine;

fn engine_with_store() -> (ExperimentEngine, MemoryExperimentStore) {
    let store = MemoryExperimentStore::new();
    let engine = ExperimentEngine::new(Arc::new(store.clone()), &ExperimentsConfig::default());
    (engine, store)
}

fn config(variants: Vec<Variant>, auto_select_winner: bool) -> ExperimentConfig {
    ExperimentConfig {
        campaign_id: "camp-1".to_string(),
        variants,
        start_date: Utc::now(),
        end_date: None,
        primary_metric: None,
        confidence_level: None,
        auto_select_winner,
    }
}

fn even_split() -> Vec<Variant> {
    vec![
        Variant::new("control", "Control", 50, true),
        Variant::new("treatment", "Treatment", 50, false),
    ]
}

/// Seed the store with the engine's view of an experiment so flushes
/// have a record to update, as the hosting application would on create.
async fn seed_store(engine: &ExperimentEngine, store: &MemoryExperimentStore, id: &str) {
    let experiment = engine.experiment(id).unwrap();
    let record = PersistedExperiment::from_experiment(&experiment).unwrap();
    store.put(record).await.unwrap();
}

#[test]
fn test_assignment_distribution_tracks_allocations() {
    let (engine, _store) = engine_with_store();
    engine
        .initialize_test("exp-split", config(even_split(), false))
        .unwrap();

    let mut control = 0u32;
    let total = 10_000;
    for i in 0..total {
        let variant = engine
            .assign_variant("exp-split", &format!("user-{}", i))
            .unwrap();
        if variant == "control" {
            control += 1;
        }
    }

    // 50/50 split over 10k distinct users; allow a generous tolerance.
    assert!(
        (4_500..=5_500).contains(&control),
        "control got {} of {} assignments",
        control,
        total
    );
}

#[test]
fn test_skewed_allocation_distribution() {
    let (engine, _store) = engine_with_store();
    let variants = vec![
        Variant::new("control", "Control", 80, true),
        Variant::new("treatment", "Treatment", 20, false),
    ];
    engine
        .initialize_test("exp-skew", config(variants, false))
        .unwrap();

    let mut control = 0u32;
    for i in 0..10_000 {
        if engine
            .assign_variant("exp-skew", &format!("user-{}", i))
            .unwrap()
            == "control"
        {
            control += 1;
        }
    }

    assert!(
        (7_500..=8_500).contains(&control),
        "control got {} of 10000 assignments at 80% allocation",
        control
    );
}

#[test]
fn test_under_allocated_experiment_always_assigns() {
    let (engine, _store) = engine_with_store();
    let variants = vec![
        Variant::new("control", "Control", 30, true),
        Variant::new("treatment", "Treatment", 30, false),
    ];
    engine
        .initialize_test("exp-under", config(variants, false))
        .unwrap();

    for i in 0..1_000 {
        let assigned = engine.assign_variant("exp-under", &format!("user-{}", i));
        assert!(assigned.is_some(), "user-{} received no variant", i);
    }
}

#[tokio::test]
async fn test_event_accounting_is_exact() {
    let (engine, _store) = engine_with_store();
    engine
        .initialize_test("exp-1", config(even_split(), false))
        .unwrap();

    for _ in 0..40 {
        engine.track_event("exp-1", "treatment", EventKind::Impression, None);
    }
    for _ in 0..12 {
        engine.track_event("exp-1", "treatment", EventKind::Click, None);
    }
    for _ in 0..3 {
        engine.track_event("exp-1", "treatment", EventKind::Conversion, Some(10.0));
    }
    // The same logical event tracked twice counts twice.
    engine.track_event("exp-1", "treatment", EventKind::Conversion, Some(10.0));

    let metrics = engine.current_metrics("exp-1").unwrap();
    let treatment = &metrics["treatment"];

    assert_eq!(treatment.impressions, 40);
    assert_eq!(treatment.clicks, 12);
    assert_eq!(treatment.conversions, 4);
    assert_relative_eq!(treatment.revenue, 40.0, epsilon = 1e-9);
    assert_relative_eq!(treatment.ctr, 30.0, epsilon = 1e-9);
    assert_relative_eq!(treatment.conversion_rate, 4.0 / 12.0 * 100.0, epsilon = 1e-9);
    assert_relative_eq!(treatment.cost_per_click, 40.0 / 12.0, epsilon = 1e-9);

    let control = &metrics["control"];
    assert_eq!(control.total_events(), 0);
}

#[tokio::test]
async fn test_metrics_flush_on_batch_boundary() {
    let (engine, store) = engine_with_store();
    engine
        .initialize_test("exp-1", config(even_split(), false))
        .unwrap();
    seed_store(&engine, &store, "exp-1").await;

    // Nine events: below the batch boundary, nothing flushed yet.
    for _ in 0..9 {
        engine.track_event("exp-1", "control", EventKind::Impression, None);
    }
    tokio::time::sleep(Duration::from_millis(50)).await;

    let record = store.record("exp-1").unwrap();
    let variants = record.decode_variants().unwrap();
    let control = variants.iter().find(|v| v.id == "control").unwrap();
    assert_eq!(control.metrics.impressions, 0, "flushed before the boundary");

    // The tenth event crosses the boundary and flushes all ten.
    engine.track_event("exp-1", "control", EventKind::Impression, None);
    tokio::time::sleep(Duration::from_millis(50)).await;

    let record = store.record("exp-1").unwrap();
    let variants = record.decode_variants().unwrap();
    let control = variants.iter().find(|v| v.id == "control").unwrap();
    assert_eq!(control.metrics.impressions, 10);
}

#[tokio::test]
async fn test_significance_for_clear_winner() {
    let (engine, _store) = engine_with_store();
    engine
        .initialize_test("exp-1", config(even_split(), false))
        .unwrap();

    // Control: 5% conversion over 1000 clicks. Treatment: 15% over 1000.
    for _ in 0..1_000 {
        engine.track_event("exp-1", "control", EventKind::Click, None);
    }
    for _ in 0..50 {
        engine.track_event("exp-1", "control", EventKind::Conversion, None);
    }
    for _ in 0..1_000 {
        engine.track_event("exp-1", "treatment", EventKind::Click, None);
    }
    for _ in 0..150 {
        engine.track_event("exp-1", "treatment", EventKind::Conversion, None);
    }

    let report = engine.calculate_statistical_significance("exp-1").unwrap();

    assert!(report.is_significant);
    assert_eq!(report.winning_variant.as_deref(), Some("treatment"));
    assert!(report.p_value < 0.05);
    assert!(report.confidence > 95.0);
    assert_relative_eq!(report.lift_percent, 200.0, epsilon = 1e-6);
}

#[tokio::test]
async fn test_auto_select_completes_experiment() {
    let (engine, store) = engine_with_store();
    engine
        .initialize_test("exp-1", config(even_split(), true))
        .unwrap();
    seed_store(&engine, &store, "exp-1").await;

    for _ in 0..1_000 {
        engine.track_event("exp-1", "control", EventKind::Click, None);
    }
    for _ in 0..50 {
        engine.track_event("exp-1", "control", EventKind::Conversion, None);
    }
    for _ in 0..1_000 {
        engine.track_event("exp-1", "treatment", EventKind::Click, None);
    }
    // The winner threshold is 100 conversions; the experiment completes
    // as soon as the treatment arm is both past it and significant.
    for _ in 0..150 {
        engine.track_event("exp-1", "treatment", EventKind::Conversion, None);
    }
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(!engine.is_active("exp-1"));
    assert!(engine.assign_variant("exp-1", "user-1").is_none());

    let record = store.record("exp-1").unwrap();
    assert_eq!(record.status, ExperimentStatus::Completed);

    let outcome = store.outcome_json("exp-1").unwrap();
    assert!(outcome.contains("treatment"));
}

#[tokio::test]
async fn test_pause_stops_assignment_and_tracking() {
    let (engine, store) = engine_with_store();
    engine
        .initialize_test("exp-1", config(even_split(), false))
        .unwrap();
    seed_store(&engine, &store, "exp-1").await;

    engine.track_event("exp-1", "control", EventKind::Impression, None);
    engine.track_event("exp-1", "control", EventKind::Click, None);

    engine.pause_test("exp-1");

    assert!(engine.assign_variant("exp-1", "user-1").is_none());
    assert!(engine.current_metrics("exp-1").is_none());
    engine.track_event("exp-1", "control", EventKind::Conversion, None);

    // Pause does not flush: events tracked since the last batch boundary
    // never reached the store.
    let record = store.record("exp-1").unwrap();
    let variants = record.decode_variants().unwrap();
    let control = variants.iter().find(|v| v.id == "control").unwrap();
    assert_eq!(control.metrics.total_events(), 0);

    // The durable record still says running, so a restore resumes it.
    assert_eq!(record.status, ExperimentStatus::Running);
}

#[tokio::test]
async fn test_startup_restore_recovers_full_config() {
    let store = MemoryExperimentStore::new();

    let mut variants = vec![
        Variant::new("control", "Control", 50, true),
        Variant::new("treatment", "Treatment", 50, false),
    ];
    variants[0].metrics.impressions = 5;
    variants[0].metrics.recompute_rates();

    store
        .put(PersistedExperiment {
            id: "exp-running".to_string(),
            campaign_id: "camp-1".to_string(),
            variants: serde_json::to_string(&variants).unwrap(),
            start_date: Utc::now(),
            end_date: None,
            primary_metric: PrimaryMetric::Revenue,
            confidence_level: 90.0,
            auto_select_winner: true,
            status: ExperimentStatus::Running,
        })
        .await
        .unwrap();

    store
        .put(PersistedExperiment {
            id: "exp-done".to_string(),
            campaign_id: "camp-1".to_string(),
            variants: serde_json::to_string(&variants).unwrap(),
            start_date: Utc::now(),
            end_date: None,
            primary_metric: PrimaryMetric::default(),
            confidence_level: 95.0,
            auto_select_winner: false,
            status: ExperimentStatus::Completed,
        })
        .await
        .unwrap();

    store
        .put(PersistedExperiment {
            id: "exp-corrupt".to_string(),
            campaign_id: "camp-1".to_string(),
            variants: "{not json".to_string(),
            start_date: Utc::now(),
            end_date: None,
            primary_metric: PrimaryMetric::default(),
            confidence_level: 95.0,
            auto_select_winner: false,
            status: ExperimentStatus::Running,
        })
        .await
        .unwrap();

    let engine = ExperimentEngine::new(Arc::new(store.clone()), &ExperimentsConfig::default());
    let restored = engine.load_active_tests().await.unwrap();

    // Completed experiments are not restored; the corrupt row is skipped.
    assert_eq!(restored, 1);
    assert!(engine.is_active("exp-running"));
    assert!(!engine.is_active("exp-done"));
    assert!(!engine.is_active("exp-corrupt"));

    let experiment = engine.experiment("exp-running").unwrap();
    assert_eq!(experiment.primary_metric, PrimaryMetric::Revenue);
    assert_eq!(experiment.confidence_level, 90.0);
    assert!(experiment.auto_select_winner);

    // Cached metrics pick up where the persisted record left off.
    let metrics = engine.current_metrics("exp-running").unwrap();
    assert_eq!(metrics["control"].impressions, 5);

    assert!(engine.assign_variant("exp-running", "user-1").is_some());
}
