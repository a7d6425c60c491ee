//! Integration test: artifact store and prediction

use airquality_automl::data::date_column;
use airquality_automl::export::{ArtifactStore, FORMAT_VERSION};
use airquality_automl::inference::{Prediction, PredictionRequest, Predictor, ReconcilePolicy};
use airquality_automl::training::{
    AirQualityCategory, ModelSelector, TaskSpec, TaskType, TrainedModel, TrainingConfig, TrainingHarness,
};
use airquality_automl::PipelineError;
use chrono::{Duration, NaiveDate};
use polars::prelude::*;
use std::sync::Arc;
use std::thread;
use tempfile::TempDir;

fn table() -> DataFrame {
    let start = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
    let (mut fechas, mut horas, mut flujos) = (Vec::new(), Vec::new(), Vec::new());
    for day in 0..5i64 {
        for hour in 0..24i64 {
            let flujo = if (8..=18).contains(&hour) { 300.0 + (hour * day) as f64 } else { 30.0 + hour as f64 };
            fechas.push(Some(start + Duration::days(day)));
            horas.push(hour);
            flujos.push(flujo);
        }
    }
    let pm2_5: Vec<f64> = flujos.iter().map(|f| f / 5.0).collect();
    DataFrame::new(vec![
        date_column("fecha", &fechas).unwrap(),
        Column::new("hora".into(), horas),
        Column::new("flujo".into(), flujos),
        Column::new("pm2_5".into(), pm2_5),
    ])
    .unwrap()
}

fn train(task: TaskSpec) -> TrainedModel {
    let run = TrainingHarness::new(TrainingConfig::default().with_n_folds(3))
        .benchmark(&table(), &task)
        .unwrap();
    ModelSelector::select(&run).unwrap()
}

fn request(pairs: &[(&str, f64)]) -> PredictionRequest {
    pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
}

#[test]
fn test_round_trip_is_bit_identical() {
    let dir = TempDir::new().unwrap();
    let store = ArtifactStore::new(dir.path()).unwrap();
    let model = train(TaskSpec::regression("modelo_regresion", "pm2_5"));

    store.save(&model, "modelo_regresion").unwrap();
    let loaded = store.load("modelo_regresion").unwrap();

    assert_eq!(loaded.schema, model.schema);
    assert_eq!(loaded.candidate, model.candidate);
    assert_eq!(loaded.hyperparams, model.hyperparams);
    assert_eq!(loaded.selection, model.selection);
    assert_eq!(loaded.cv_secondary, model.cv_secondary);
    assert_eq!(loaded.holdout, model.holdout);

    let rows = [
        vec![8.0, 310.0, 6.0, 5.0],
        vec![2.0, 32.0, 6.0, 0.0],
        vec![23.0, 0.0, 0.0, 6.0],
    ];
    for row in rows {
        let a = model.predict_row(&row).unwrap();
        let b = loaded.predict_row(&row).unwrap();
        assert_eq!(a.to_bits(), b.to_bits());
    }
}

#[test]
fn test_metadata_sidecar() {
    let dir = TempDir::new().unwrap();
    let store = ArtifactStore::new(dir.path()).unwrap();
    let model = train(TaskSpec::classification("modelo_clasificacion", "pm2_5"));
    let handle = store.save(&model, "modelo_clasificacion").unwrap();

    let meta = store.metadata("modelo_clasificacion").unwrap();
    assert_eq!(meta.name, "modelo_clasificacion");
    assert_eq!(meta.task_type, TaskType::Classification);
    assert_eq!(meta.schema, model.schema);
    assert_eq!(meta.candidate, model.candidate);
    assert_eq!(meta.checksum, handle.checksum);
    assert_eq!(meta.format_version, FORMAT_VERSION);
    assert_eq!(meta.created_at, handle.created_at);

    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&handle.metadata_path).unwrap()).unwrap();
    assert_eq!(json["task_type"], "classification");
    assert!(json["schema"].as_array().unwrap().iter().any(|f| f == "flujo"));
}

#[test]
fn test_store_listing_and_overwrite() {
    let dir = TempDir::new().unwrap();
    let store = ArtifactStore::new(dir.path()).unwrap();
    let model = train(TaskSpec::regression("r", "pm2_5"));

    assert!(store.list().unwrap().is_empty());
    store.save(&model, "zeta").unwrap();
    store.save(&model, "alfa").unwrap();
    let first = store.save(&model, "alfa").unwrap();
    assert_eq!(store.list().unwrap(), vec!["alfa", "zeta"]);
    assert!(store.exists("alfa"));
    assert_eq!(store.metadata("alfa").unwrap().created_at, first.created_at);

    assert!(matches!(store.load("beta"), Err(PipelineError::ArtifactNotFound(_))));
    assert!(matches!(store.load("../alfa"), Err(PipelineError::InvalidInput(_))));
}

#[test]
fn test_concurrent_saves_and_loads() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(ArtifactStore::new(dir.path()).unwrap());
    let model = Arc::new(train(TaskSpec::regression("r", "pm2_5")));
    store.save(&model, "compartido").unwrap();

    thread::scope(|s| {
        for i in 0..4 {
            let store = Arc::clone(&store);
            let model = Arc::clone(&model);
            s.spawn(move || {
                for _ in 0..5 {
                    if i % 2 == 0 {
                        store.save(&model, "compartido").unwrap();
                    } else {
                        let loaded = store.load("compartido").unwrap();
                        assert_eq!(loaded.schema, model.schema);
                    }
                }
            });
        }
    });

    assert_eq!(store.list().unwrap(), vec!["compartido"]);
}

#[test]
fn test_predictor_reconciles_requests() {
    let dir = TempDir::new().unwrap();
    let store = ArtifactStore::new(dir.path()).unwrap();
    let model = train(TaskSpec::regression("modelo_regresion", "pm2_5"));
    store.save(&model, "modelo_regresion").unwrap();

    let predictor = Predictor::from_store(&store, "modelo_regresion").unwrap();
    assert_eq!(predictor.schema(), model.schema.as_slice());

    // unknown keys are ignored, absent ones zero-filled
    let partial = request(&[("flujo", 300.0), ("viento", 4.0)]);
    let full: PredictionRequest = model
        .schema
        .iter()
        .map(|f| (f.clone(), if f == "flujo" { 300.0 } else { 0.0 }))
        .collect();
    assert_eq!(predictor.predict(&partial).unwrap(), predictor.predict(&full).unwrap());
    assert!(predictor.predict(&partial).unwrap().as_value().is_some());

    let strict = predictor.clone().with_policy(ReconcilePolicy::Strict);
    assert!(matches!(strict.predict(&partial), Err(PipelineError::InvalidInput(_))));
    assert!(strict.predict(&full).is_ok());

    let batch = predictor.predict_batch(&[partial.clone(), full]).unwrap();
    assert_eq!(batch.len(), 2);
    assert_eq!(batch[0], predictor.predict(&partial).unwrap());
}

#[test]
fn test_classifier_predicts_categories() {
    let model = train(TaskSpec::classification("modelo_clasificacion", "pm2_5"));
    let predictor = Predictor::new(model);

    // flujo / 5 with busy-hour traffic lands in Mala or worse, night traffic in Buena
    let busy = predictor.predict(&request(&[("hora", 12.0), ("flujo", 330.0)])).unwrap();
    let quiet = predictor.predict(&request(&[("hora", 3.0), ("flujo", 33.0)])).unwrap();
    assert!(matches!(busy, Prediction::Category(_)));
    assert_eq!(quiet.as_category(), Some(AirQualityCategory::Buena));
    assert!(busy.as_category().unwrap() > AirQualityCategory::Moderada);
}
