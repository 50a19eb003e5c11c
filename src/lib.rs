//! # Fourth and Short
//!
//! Decision service for football analytics: turns historical game-situation
//! records into decision models and serves recommendations under load.
//!
//! ## Features
//!
//! - **Feature Extraction**: one versioned schema shared by training and serving
//! - **Training**: deterministic split, softmax classifier / ridge regressor, quality floor
//! - **Model Registry**: atomic activation, bounded history, rollback
//! - **Decision Engine**: tie-breaking, confidence floor, freshness
//! - **Server Components**: axum recommendation API with latency budget
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use fourth_and_short::{
//!     decision::{DecisionEngine, DecisionPolicy},
//!     game::GameState,
//!     registry::ModelRegistry,
//! };
//!
//! let registry = Arc::new(ModelRegistry::default());
//! let engine = DecisionEngine::new(registry, DecisionPolicy::default());
//! let state = GameState::builder(4, 1, 35).score_diff(-3).time_remaining(120).build()?;
//! let _ = engine.decide(&state);
//! # Ok::<(), fourth_and_short::DecisionServiceError>(())
//! ```

// ============================================================================
// PUBLIC API MODULES
// ============================================================================

/// Game situations and their validation
pub mod game;

/// Versioned feature schema and extractor
pub mod features;

/// Historical records, datasets, synthetic history and CSV ingestion
pub mod data;

/// Fitted predictors, artifacts, metrics and artifact persistence
pub mod models;

/// Process-wide registry of active model artifacts
pub mod registry;

/// Offline training pipeline
pub mod training;

/// Decision engine and policy
pub mod decision;

/// Server components (decision API)
pub mod servers;

/// SQLite ledger of trained models and served requests
pub mod storage;

/// Logger initialisation for the binaries
pub mod logging;

// ============================================================================
// PUBLIC API RE-EXPORTS
// ============================================================================

pub use decision::{DecisionEngine, DecisionPolicy, DecisionResult};
pub use features::{extract, FeatureVector, FEATURE_SCHEMA_VERSION};
pub use game::{GameState, PlayCall, ValidationError};
pub use models::{ModelArtifact, ModelKind};
pub use registry::ModelRegistry;
pub use servers::{DecisionApiConfig, DecisionApiServer};
pub use training::{ActivationStatus, CancellationToken, Trainer, TrainingConfig, TrainingResult};

// ============================================================================
// ERROR TYPES
// ============================================================================

/// Main error type for the decision service
#[derive(Debug, thiserror::Error)]
pub enum DecisionServiceError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("invalid record at row {row}: {source}")]
    InvalidRecord {
        row: usize,
        #[source]
        source: ValidationError,
    },

    #[error("example id {id} appears more than once in the dataset")]
    DuplicateExample { id: u64 },

    #[error("insufficient data: {available} examples, at least {required} required")]
    InsufficientData { available: usize, required: usize },

    #[error("{metric} = {value:.4} does not meet the quality floor {floor:.4}")]
    QualityBelowFloor {
        metric: &'static str,
        value: f64,
        floor: f64,
    },

    #[error("feature schema mismatch: expected v{expected}, artifact {artifact} uses v{found}")]
    SchemaMismatch {
        expected: u32,
        found: u32,
        artifact: String,
    },

    #[error("model {model} ({version}) is a {found}, expected a {expected}")]
    ModelKindMismatch {
        model: String,
        version: String,
        expected: ModelKind,
        found: ModelKind,
    },

    #[error("model {model} has no active version")]
    ModelUnavailable { model: String },

    #[error("model {model} has no prior version to roll back to")]
    NoPriorVersion { model: String },

    #[error("model {model} already holds a different artifact as version {version}")]
    VersionConflict { model: String, version: String },

    #[error("training run cancelled")]
    Cancelled,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("artifact error: {0}")]
    Artifact(String),

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DecisionServiceError {
    /// Stable label for logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::InvalidRecord { .. } => "invalid_record",
            Self::DuplicateExample { .. } => "duplicate_example",
            Self::InsufficientData { .. } => "insufficient_data",
            Self::QualityBelowFloor { .. } => "quality_below_floor",
            Self::SchemaMismatch { .. } => "schema_mismatch",
            Self::ModelKindMismatch { .. } => "model_kind_mismatch",
            Self::ModelUnavailable { .. } => "model_unavailable",
            Self::NoPriorVersion { .. } => "no_prior_version",
            Self::VersionConflict { .. } => "version_conflict",
            Self::Cancelled => "cancelled",
            Self::InvalidConfig(_) => "invalid_config",
            Self::Artifact(_) => "artifact_error",
            Self::Storage(_) => "storage_error",
            Self::Csv(_) => "csv_error",
            Self::Io(_) => "io_error",
        }
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, DecisionServiceError>;

// ============================================================================
// LIBRARY VERSION INFO
// ============================================================================

/// Library version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Library description
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");
