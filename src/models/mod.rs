//! Fitted predictors and the artifacts that carry them.

pub mod artifact;
pub mod kind;
pub mod linear;
pub mod metrics;
pub mod model_io;

pub use artifact::{
    version_id, ArtifactMetadata, ModelArtifact, OptionProbability, Prediction, Predictor,
    ValueEstimate,
};
pub use kind::ModelKind;
pub use linear::{FitParams, LinearRegressor, SoftmaxClassifier, Standardizer};
pub use metrics::{ClassificationMetrics, EvaluationMetrics, QualityVerdict, RegressionMetrics};
pub use model_io::ArtifactStore;
