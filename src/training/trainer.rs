//! Offline training pipeline
//!
//! 1. guard against undersized datasets
//! 2. deterministic train/validation split
//! 3. fit, calibrate the classifier temperature and evaluate on the
//!    validation partition
//! 4. package an artifact with provenance
//! 5. judge it against the quality floor and activate it when it passes

use chrono::Utc;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

use crate::data::dataset::{Outcome, TrainingDataset, TrainingExample};
use crate::features::{FEATURE_COUNT, FEATURE_SCHEMA_VERSION};
use crate::game::PlayCall;
use crate::models::metrics::{classification_metrics, regression_metrics};
use crate::models::{
    version_id, ArtifactMetadata, EvaluationMetrics, LinearRegressor, ModelArtifact, ModelKind,
    Predictor, SoftmaxClassifier,
};
use crate::registry::ModelRegistry;
use crate::training::cancel::CancellationToken;
use crate::training::config::TrainingConfig;
use crate::{DecisionServiceError, Result};

/// What happened to the artifact a training run produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActivationStatus {
    Accepted,
    RejectedForQuality,
    RejectedForInsufficientData,
}

impl ActivationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivationStatus::Accepted => "accepted",
            ActivationStatus::RejectedForQuality => "rejected-for-quality",
            ActivationStatus::RejectedForInsufficientData => "rejected-for-insufficient-data",
        }
    }
}

impl fmt::Display for ActivationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct TrainingResult {
    pub artifact: Arc<ModelArtifact>,
    pub status: ActivationStatus,
    pub train_examples: usize,
    pub validation_examples: usize,
}

impl TrainingResult {
    pub fn metrics(&self) -> &EvaluationMetrics {
        self.artifact.metrics()
    }
}

// ============================================================================
// SPLIT
// ============================================================================

fn mix(id: u64, seed: u64) -> u64 {
    // splitmix64 finaliser
    let mut z = id ^ seed.wrapping_mul(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Partition examples into (train, validation).
///
/// Examples are ordered by a seeded hash of their id (ties by id) and the
/// first `round(n * validation_split)` go to validation, keeping at least
/// one example on each side. The result does not depend on arrival order.
pub fn split_examples(
    examples: &[TrainingExample],
    validation_split: f64,
    seed: u64,
) -> (Vec<&TrainingExample>, Vec<&TrainingExample>) {
    let mut ordered: Vec<&TrainingExample> = examples.iter().collect();
    ordered.sort_by_key(|e| (mix(e.id, seed), e.id));

    let n = ordered.len();
    if n < 2 {
        return (ordered, Vec::new());
    }
    let validation = ((n as f64 * validation_split).round() as usize).clamp(1, n - 1);
    let train = ordered.split_off(validation);
    (train, ordered)
}

// ============================================================================
// TRAINER
// ============================================================================

pub struct Trainer {
    config: TrainingConfig,
}

impl Trainer {
    pub fn new(config: TrainingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    /// Fit, evaluate and package an artifact without touching any registry.
    ///
    /// The returned artifact carries its quality verdict; a failed floor is
    /// not an error here.
    pub fn fit(
        &self,
        dataset: &TrainingDataset,
        cancel: &CancellationToken,
    ) -> Result<(ModelArtifact, usize, usize)> {
        let config = &self.config;
        if dataset.kind() != config.model_kind() {
            return Err(DecisionServiceError::InvalidConfig(format!(
                "dataset holds {} examples but the run trains a {}",
                dataset.kind(),
                config.model_kind()
            )));
        }
        if dataset.len() < config.min_examples() {
            return Err(DecisionServiceError::InsufficientData {
                available: dataset.len(),
                required: config.min_examples(),
            });
        }
        cancel.check()?;

        let (train, validation) =
            split_examples(dataset.examples(), config.validation_split(), config.split_seed());
        log::info!(
            "🧠 Training {} '{}' on {} examples ({} held out, snapshot {})",
            config.model_kind(),
            config.model_name(),
            train.len(),
            validation.len(),
            dataset.snapshot_id()
        );
        cancel.check()?;

        let train_rows: Vec<[f64; FEATURE_COUNT]> = train.iter().map(|e| *e.features.values()).collect();
        let validation_rows: Vec<[f64; FEATURE_COUNT]> =
            validation.iter().map(|e| *e.features.values()).collect();

        let (predictor, metrics) = match config.model_kind() {
            ModelKind::DecisionClassifier => {
                let labels = PlayCall::ALL.to_vec();
                let train_targets = label_indices(&train, &labels)?;
                let validation_targets = label_indices(&validation, &labels)?;
                let model = SoftmaxClassifier::fit(
                    &train_rows,
                    &train_targets,
                    labels.clone(),
                    &config.fit_params(),
                    cancel,
                )?
                .calibrate(&validation_rows, &validation_targets);
                log::info!(
                    "🌡️ Calibrated temperature {:.3} on {} held-out examples",
                    model.temperature(),
                    validation_rows.len()
                );
                cancel.check()?;
                let probabilities: Vec<Vec<f64>> =
                    validation_rows.iter().map(|r| model.predict_proba(r)).collect();
                let metrics = classification_metrics(&probabilities, &validation_targets, &labels);
                (
                    Predictor::Classifier(model),
                    EvaluationMetrics::Classification(metrics),
                )
            }
            ModelKind::OutcomeRegressor => {
                let train_targets = values(&train)?;
                let validation_targets = values(&validation)?;
                let model = LinearRegressor::fit(&train_rows, &train_targets, config.fit_params().l2)?;
                cancel.check()?;
                let predictions: Vec<f64> = validation_rows.iter().map(|r| model.predict(r)).collect();
                let metrics =
                    regression_metrics(&predictions, &validation_targets, model.residual_std());
                (
                    Predictor::Regressor(model),
                    EvaluationMetrics::Regression(metrics),
                )
            }
        };

        let verdict = config.quality_floor().judge(&metrics);
        let created_at = Utc::now();
        let metadata = ArtifactMetadata {
            name: config.model_name().to_string(),
            version: version_id(created_at, dataset.snapshot_id()),
            kind: config.model_kind(),
            schema_version: FEATURE_SCHEMA_VERSION,
            snapshot_id: dataset.snapshot_id().to_string(),
            training_examples: train.len(),
            metrics,
            verdict,
            created_at,
        };
        let artifact = ModelArtifact::new(metadata, predictor)?;
        let (metric, value) = artifact.metrics().headline();
        log::info!(
            "📊 {}@{}: {} = {:.4} ({})",
            artifact.name(),
            artifact.version(),
            metric,
            value,
            artifact.verdict().floor
        );
        Ok((artifact, train.len(), validation.len()))
    }

    /// Full run: fit, judge and activate in `registry` when the floor is met.
    pub fn train(
        &self,
        dataset: &TrainingDataset,
        registry: &ModelRegistry,
        cancel: &CancellationToken,
    ) -> Result<TrainingResult> {
        let (artifact, train_examples, validation_examples) = self.fit(dataset, cancel)?;
        let artifact = Arc::new(artifact);

        let status = if artifact.passed_quality() {
            cancel.check()?;
            registry.activate(self.config.model_name(), Arc::clone(&artifact))?;
            ActivationStatus::Accepted
        } else {
            log::warn!(
                "⚠️ {}@{} rejected: does not meet {}",
                artifact.name(),
                artifact.version(),
                artifact.verdict().floor
            );
            ActivationStatus::RejectedForQuality
        };

        Ok(TrainingResult {
            artifact,
            status,
            train_examples,
            validation_examples,
        })
    }
}

fn label_indices(examples: &[&TrainingExample], labels: &[PlayCall]) -> Result<Vec<usize>> {
    examples
        .iter()
        .map(|e| match e.outcome {
            Outcome::Decision(call) => labels.iter().position(|l| *l == call).ok_or_else(|| {
                DecisionServiceError::InvalidConfig(format!("unknown label {}", call))
            }),
            Outcome::Value(_) => Err(DecisionServiceError::InvalidConfig(format!(
                "example {} has no play call",
                e.id
            ))),
        })
        .collect()
}

fn values(examples: &[&TrainingExample]) -> Result<Vec<f64>> {
    examples
        .iter()
        .map(|e| match e.outcome {
            Outcome::Value(v) => Ok(v),
            Outcome::Decision(_) => Err(DecisionServiceError::InvalidConfig(format!(
                "example {} has no outcome value",
                e.id
            ))),
        })
        .collect()
}
