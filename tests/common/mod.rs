#![allow(dead_code)]

use chrono::Utc;
use fourth_and_short::data::{generate_history, HistoryOptions};
use fourth_and_short::features::{FEATURE_COUNT, FEATURE_SCHEMA_VERSION};
use fourth_and_short::models::{
    ArtifactMetadata, ClassificationMetrics, EvaluationMetrics, LinearRegressor, ModelArtifact,
    ModelKind, Predictor, QualityVerdict, RegressionMetrics, SoftmaxClassifier, Standardizer,
};
use fourth_and_short::training::{HistorySource, QualityFloor, TrainingConfig};
use fourth_and_short::PlayCall;

pub fn identity() -> Standardizer {
    Standardizer::from_parts([0.0; FEATURE_COUNT], [1.0; FEATURE_COUNT]).unwrap()
}

pub fn metadata(name: &str, version: &str, kind: ModelKind) -> ArtifactMetadata {
    let (metrics, verdict) = match kind {
        ModelKind::DecisionClassifier => (
            EvaluationMetrics::Classification(ClassificationMetrics {
                accuracy: 0.8,
                macro_f1: 0.7,
                brier: 0.3,
                log_loss: 0.5,
                calibration_error: 0.05,
                examples: 100,
            }),
            QualityVerdict::new(true, "accuracy >= 0.55".to_string(), 0.55),
        ),
        ModelKind::OutcomeRegressor => (
            EvaluationMetrics::Regression(RegressionMetrics {
                rmse: 1.0,
                mae: 0.8,
                interval_coverage: 0.95,
                examples: 100,
            }),
            QualityVerdict::new(true, "rmse <= 3".to_string(), 3.0),
        ),
    };
    ArtifactMetadata {
        name: name.to_string(),
        version: version.to_string(),
        kind,
        schema_version: FEATURE_SCHEMA_VERSION,
        snapshot_id: "0".repeat(64),
        training_examples: 100,
        metrics,
        verdict,
        created_at: Utc::now(),
    }
}

/// Classifier that ignores its input and favours one call by `margin` logits.
pub fn fixed_classifier(name: &str, version: &str, favourite: PlayCall, margin: f64) -> ModelArtifact {
    let labels = PlayCall::ALL.to_vec();
    let bias = labels
        .iter()
        .map(|l| if *l == favourite { margin } else { 0.0 })
        .collect();
    let model = SoftmaxClassifier::from_parts(labels, vec![[0.0; FEATURE_COUNT]; 3], bias, identity()).unwrap();
    ModelArtifact::new(
        metadata(name, version, ModelKind::DecisionClassifier),
        Predictor::Classifier(model),
    )
    .unwrap()
}

pub fn fixed_regressor(name: &str, version: &str, value: f64) -> ModelArtifact {
    let model = LinearRegressor::from_parts([0.0; FEATURE_COUNT], value, 0.5, identity()).unwrap();
    ModelArtifact::new(
        metadata(name, version, ModelKind::OutcomeRegressor),
        Predictor::Regressor(model),
    )
    .unwrap()
}

pub fn synthetic(rows: usize, seed: u64) -> HistorySource {
    HistorySource::Synthetic(HistoryOptions {
        rows,
        seed,
        ..HistoryOptions::default()
    })
}

pub fn synthetic_records(rows: usize, seed: u64) -> Vec<fourth_and_short::data::HistoricalRecord> {
    generate_history(&HistoryOptions {
        rows,
        seed,
        ..HistoryOptions::default()
    })
    .unwrap()
}

/// Classifier config with a floor the synthetic history comfortably clears.
pub fn classifier_config(min_examples: usize) -> TrainingConfig {
    TrainingConfig::builder(ModelKind::DecisionClassifier)
        .min_examples(min_examples)
        .epochs(200)
        .quality_floor(QualityFloor {
            min_accuracy: 0.45,
            ..QualityFloor::default()
        })
        .build()
        .unwrap()
}
