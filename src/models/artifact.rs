//! Immutable model artifacts.
//!
//! An artifact bundles a fitted predictor with everything needed to decide
//! whether it may be served: feature schema version, training snapshot,
//! evaluation metrics and the quality verdict. Artifacts are never mutated
//! after creation and are shared as `Arc<ModelArtifact>`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::features::{FeatureVector, FEATURE_SCHEMA_VERSION};
use crate::game::PlayCall;
use crate::models::kind::ModelKind;
use crate::models::linear::{LinearRegressor, SoftmaxClassifier};
use crate::models::metrics::{EvaluationMetrics, QualityVerdict, INTERVAL_Z};
use crate::{DecisionServiceError, Result};

/// Provenance and evaluation of an artifact, persisted as JSON alongside the weights.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactMetadata {
    pub name: String,
    pub version: String,
    pub kind: ModelKind,
    pub schema_version: u32,
    pub snapshot_id: String,
    pub training_examples: usize,
    pub metrics: EvaluationMetrics,
    pub verdict: QualityVerdict,
    pub created_at: DateTime<Utc>,
}

/// Version id: UTC timestamp to the microsecond, the dataset snapshot
/// prefix and a random run tag, e.g. `20240908T130500123456Z-deadbeef-1a2b3c4d`.
///
/// Two runs over the same snapshot never share an id, even within one clock tick.
pub fn version_id(created_at: DateTime<Utc>, snapshot_id: &str) -> String {
    let prefix: String = snapshot_id.chars().take(8).collect();
    let run = uuid::Uuid::new_v4().simple().to_string();
    format!(
        "{}-{}-{}",
        created_at.format("%Y%m%dT%H%M%S%6fZ"),
        prefix,
        &run[..8]
    )
}

#[derive(Debug, Clone, PartialEq)]
pub enum Predictor {
    Classifier(SoftmaxClassifier),
    Regressor(LinearRegressor),
}

impl Predictor {
    pub fn kind(&self) -> ModelKind {
        match self {
            Predictor::Classifier(_) => ModelKind::DecisionClassifier,
            Predictor::Regressor(_) => ModelKind::OutcomeRegressor,
        }
    }
}

/// Probability assigned to one option.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct OptionProbability {
    pub label: PlayCall,
    pub probability: f64,
}

/// Point estimate with a 95% interval.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ValueEstimate {
    pub value: f64,
    pub lower: f64,
    pub upper: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Prediction {
    /// Sorted by label
    Probabilities(Vec<OptionProbability>),
    Value(ValueEstimate),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelArtifact {
    metadata: ArtifactMetadata,
    predictor: Predictor,
}

impl ModelArtifact {
    pub fn new(metadata: ArtifactMetadata, predictor: Predictor) -> Result<Self> {
        if metadata.kind != predictor.kind() {
            return Err(DecisionServiceError::Artifact(format!(
                "metadata of {} declares a {} but carries a {}",
                metadata.version,
                metadata.kind,
                predictor.kind()
            )));
        }
        Ok(Self {
            metadata,
            predictor,
        })
    }

    pub fn metadata(&self) -> &ArtifactMetadata {
        &self.metadata
    }

    pub fn predictor(&self) -> &Predictor {
        &self.predictor
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn version(&self) -> &str {
        &self.metadata.version
    }

    pub fn kind(&self) -> ModelKind {
        self.metadata.kind
    }

    pub fn schema_version(&self) -> u32 {
        self.metadata.schema_version
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.metadata.created_at
    }

    pub fn metrics(&self) -> &EvaluationMetrics {
        &self.metadata.metrics
    }

    pub fn verdict(&self) -> &QualityVerdict {
        &self.metadata.verdict
    }

    pub fn passed_quality(&self) -> bool {
        self.metadata.verdict.passed
    }

    /// Copy of this artifact under another registry name.
    pub fn renamed(&self, name: impl Into<String>) -> Self {
        let mut copy = self.clone();
        copy.metadata.name = name.into();
        copy
    }

    /// Copy recording that an operator accepted it below the quality floor.
    pub fn into_forced(mut self) -> Self {
        self.metadata.verdict.forced = true;
        self
    }

    /// Fails with `SchemaMismatch` unless the features were produced by this artifact's schema.
    pub fn check_schema(&self, schema_version: u32) -> Result<()> {
        if schema_version != self.metadata.schema_version {
            return Err(DecisionServiceError::SchemaMismatch {
                expected: schema_version,
                found: self.metadata.schema_version,
                artifact: format!("{}@{}", self.metadata.name, self.metadata.version),
            });
        }
        Ok(())
    }

    /// Checks against the schema this build extracts.
    pub fn is_current_schema(&self) -> bool {
        self.metadata.schema_version == FEATURE_SCHEMA_VERSION
    }

    pub fn predict(&self, features: &FeatureVector) -> Result<Prediction> {
        self.check_schema(features.schema_version())?;
        Ok(match &self.predictor {
            Predictor::Classifier(model) => {
                let probs = model.predict_proba(features.values());
                let mut options: Vec<OptionProbability> = model
                    .labels()
                    .iter()
                    .zip(probs)
                    .map(|(label, probability)| OptionProbability {
                        label: *label,
                        probability,
                    })
                    .collect();
                options.sort_by_key(|o| o.label);
                Prediction::Probabilities(options)
            }
            Predictor::Regressor(model) => {
                let value = model.predict(features.values());
                let half = INTERVAL_Z * model.residual_std();
                Prediction::Value(ValueEstimate {
                    value,
                    lower: value - half,
                    upper: value + half,
                })
            }
        })
    }
}
