//! Training configuration
//!
//! `TrainingConfig` can only be obtained through [`TrainingConfigBuilder::build`]
//! or from a JSON options file, both of which validate every field.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::models::{EvaluationMetrics, FitParams, ModelKind, QualityVerdict};
use crate::{DecisionServiceError, Result};

/// Minimum quality an artifact must reach to be activated.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityFloor {
    /// Lowest acceptable validation accuracy for classifiers
    /// Default: 0.55
    pub min_accuracy: f64,

    /// Highest acceptable validation RMSE (points) for regressors
    /// Default: 3.0
    pub max_rmse: f64,
}

impl Default for QualityFloor {
    fn default() -> Self {
        Self {
            min_accuracy: 0.55,
            max_rmse: 3.0,
        }
    }
}

impl QualityFloor {
    pub fn judge(&self, metrics: &EvaluationMetrics) -> QualityVerdict {
        match metrics {
            EvaluationMetrics::Classification(m) => QualityVerdict::new(
                m.accuracy >= self.min_accuracy,
                format!("accuracy >= {}", self.min_accuracy),
                self.min_accuracy,
            ),
            EvaluationMetrics::Regression(m) => QualityVerdict::new(
                m.rmse <= self.max_rmse,
                format!("rmse <= {}", self.max_rmse),
                self.max_rmse,
            ),
        }
    }
}

/// Validated training configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingConfig {
    model_kind: ModelKind,
    model_name: String,
    validation_split: f64,
    min_examples: usize,
    epochs: usize,
    learning_rate: f64,
    l2: f64,
    quality_floor: QualityFloor,
    split_seed: u64,
}

impl TrainingConfig {
    pub fn builder(model_kind: ModelKind) -> TrainingConfigBuilder {
        TrainingConfigBuilder::new(model_kind)
    }

    /// Load a JSON options file; absent fields take their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let options: TrainingOptions = serde_json::from_str(&raw).map_err(|e| {
            DecisionServiceError::InvalidConfig(format!("{}: {}", path.as_ref().display(), e))
        })?;
        Self::try_from(options)
    }

    pub fn model_kind(&self) -> ModelKind {
        self.model_kind
    }

    /// Registry name the trained artifact is published under
    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    pub fn validation_split(&self) -> f64 {
        self.validation_split
    }

    pub fn min_examples(&self) -> usize {
        self.min_examples
    }

    pub fn fit_params(&self) -> FitParams {
        FitParams {
            epochs: self.epochs,
            learning_rate: self.learning_rate,
            l2: self.l2,
        }
    }

    pub fn quality_floor(&self) -> &QualityFloor {
        &self.quality_floor
    }

    pub fn split_seed(&self) -> u64 {
        self.split_seed
    }
}

// ============================================================================
// BUILDER
// ============================================================================

#[derive(Debug, Clone)]
pub struct TrainingConfigBuilder {
    options: TrainingOptions,
}

impl TrainingConfigBuilder {
    pub fn new(model_kind: ModelKind) -> Self {
        Self {
            options: TrainingOptions {
                model_kind,
                ..TrainingOptions::default()
            },
        }
    }

    pub fn model_name(mut self, name: impl Into<String>) -> Self {
        self.options.model_name = Some(name.into());
        self
    }

    pub fn validation_split(mut self, split: f64) -> Self {
        self.options.validation_split = split;
        self
    }

    pub fn min_examples(mut self, min: usize) -> Self {
        self.options.min_examples = min;
        self
    }

    pub fn epochs(mut self, epochs: usize) -> Self {
        self.options.epochs = epochs;
        self
    }

    pub fn learning_rate(mut self, lr: f64) -> Self {
        self.options.learning_rate = lr;
        self
    }

    pub fn l2(mut self, l2: f64) -> Self {
        self.options.l2 = l2;
        self
    }

    pub fn quality_floor(mut self, floor: QualityFloor) -> Self {
        self.options.quality_floor = floor;
        self
    }

    pub fn split_seed(mut self, seed: u64) -> Self {
        self.options.split_seed = seed;
        self
    }

    pub fn build(self) -> Result<TrainingConfig> {
        TrainingConfig::try_from(self.options)
    }
}

// ============================================================================
// JSON OPTIONS
// ============================================================================

/// Serialized form of a training configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingOptions {
    /// Default: decision-classifier
    pub model_kind: ModelKind,
    /// Default: the kind's default registry name
    pub model_name: Option<String>,
    /// Share of examples held out for validation, in (0, 1)
    /// Default: 0.2
    pub validation_split: f64,
    /// Default: 200
    pub min_examples: usize,
    /// Gradient descent epochs (classifier only)
    /// Default: 400
    pub epochs: usize,
    /// Default: 0.5
    pub learning_rate: f64,
    /// Default: 1e-4
    pub l2: f64,
    pub quality_floor: QualityFloor,
    /// Default: 42
    pub split_seed: u64,
}

impl Default for TrainingOptions {
    fn default() -> Self {
        Self {
            model_kind: ModelKind::DecisionClassifier,
            model_name: None,
            validation_split: 0.2,
            min_examples: 200,
            epochs: 400,
            learning_rate: 0.5,
            l2: 1e-4,
            quality_floor: QualityFloor::default(),
            split_seed: 42,
        }
    }
}

fn invalid(msg: String) -> DecisionServiceError {
    DecisionServiceError::InvalidConfig(msg)
}

impl TryFrom<TrainingOptions> for TrainingConfig {
    type Error = DecisionServiceError;

    fn try_from(o: TrainingOptions) -> Result<Self> {
        if !(o.validation_split > 0.0 && o.validation_split < 1.0) {
            return Err(invalid(format!(
                "validation_split must be in (0, 1), got {}",
                o.validation_split
            )));
        }
        if o.min_examples < 2 {
            return Err(invalid(format!(
                "min_examples must be at least 2, got {}",
                o.min_examples
            )));
        }
        if o.epochs == 0 {
            return Err(invalid("epochs must be positive".to_string()));
        }
        if !(o.learning_rate.is_finite() && o.learning_rate > 0.0) {
            return Err(invalid(format!(
                "learning_rate must be positive, got {}",
                o.learning_rate
            )));
        }
        if !(o.l2.is_finite() && o.l2 >= 0.0) {
            return Err(invalid(format!("l2 must be non-negative, got {}", o.l2)));
        }
        let floor = o.quality_floor;
        if !(0.0..=1.0).contains(&floor.min_accuracy) {
            return Err(invalid(format!(
                "quality_floor.min_accuracy must be in [0, 1], got {}",
                floor.min_accuracy
            )));
        }
        if !(floor.max_rmse.is_finite() && floor.max_rmse > 0.0) {
            return Err(invalid(format!(
                "quality_floor.max_rmse must be positive, got {}",
                floor.max_rmse
            )));
        }
        let model_name = match o.model_name {
            Some(name) if name.trim().is_empty() => {
                return Err(invalid("model_name must not be empty".to_string()))
            }
            Some(name) => name,
            None => o.model_kind.default_model_name().to_string(),
        };

        Ok(TrainingConfig {
            model_kind: o.model_kind,
            model_name,
            validation_split: o.validation_split,
            min_examples: o.min_examples,
            epochs: o.epochs,
            learning_rate: o.learning_rate,
            l2: o.l2,
            quality_floor: floor,
            split_seed: o.split_seed,
        })
    }
}
