//! One command-level training run: history in, persisted artifact out.

use std::path::PathBuf;
use std::sync::Arc;

use crate::data::dataset::{HistoricalRecord, TrainingDataset};
use crate::data::history::{generate_history, HistoryOptions};
use crate::data::load_data::load_history_csv;
use crate::models::{ArtifactStore, ModelArtifact};
use crate::registry::ModelRegistry;
use crate::storage::Ledger;
use crate::training::cancel::CancellationToken;
use crate::training::config::TrainingConfig;
use crate::training::trainer::{ActivationStatus, Trainer};
use crate::{DecisionServiceError, Result};

/// Where the historical records of a run come from.
#[derive(Debug, Clone)]
pub enum HistorySource {
    Csv(PathBuf),
    Synthetic(HistoryOptions),
}

impl HistorySource {
    pub fn load(&self) -> Result<Vec<HistoricalRecord>> {
        match self {
            HistorySource::Csv(path) => load_history_csv(path),
            HistorySource::Synthetic(options) => generate_history(options),
        }
    }
}

/// What a training session produced.
#[derive(Debug, Clone)]
pub struct SessionReport {
    pub status: ActivationStatus,
    /// Absent when the dataset was too small to train on
    pub artifact: Option<Arc<ModelArtifact>>,
    pub artifact_path: Option<PathBuf>,
    pub examples: usize,
}

/// Load history, train, persist the artifact and record it in the ledger.
///
/// The artifact is saved whatever its verdict so rejected runs stay
/// auditable; only passing artifacts are picked up by the serving process.
/// `registry` is warm-started from the store so that activation keeps the
/// served history.
pub fn run_training(
    source: &HistorySource,
    config: TrainingConfig,
    store: &ArtifactStore,
    ledger: Option<&Ledger>,
    cancel: &CancellationToken,
) -> Result<SessionReport> {
    let records = source.load()?;
    cancel.check()?;
    let dataset = TrainingDataset::from_records(config.model_kind(), &records)?;

    let registry = ModelRegistry::default();
    if let Some(previous) = store.latest(config.model_name())? {
        registry.activate(config.model_name(), previous)?;
    }

    let trainer = Trainer::new(config);
    let result = match trainer.train(&dataset, &registry, cancel) {
        Ok(result) => result,
        Err(DecisionServiceError::InsufficientData {
            available,
            required,
        }) => {
            log::warn!(
                "⚠️ Not training '{}': {} examples, {} required",
                trainer.config().model_name(),
                available,
                required
            );
            return Ok(SessionReport {
                status: ActivationStatus::RejectedForInsufficientData,
                artifact: None,
                artifact_path: None,
                examples: available,
            });
        }
        Err(e) => return Err(e),
    };

    let path = store.save(&result.artifact)?;
    if let Some(ledger) = ledger {
        ledger.record_model(&result.artifact, result.status)?;
    }

    Ok(SessionReport {
        status: result.status,
        artifact: Some(result.artifact),
        artifact_path: Some(path),
        examples: dataset.len(),
    })
}
