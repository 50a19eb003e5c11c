//! Artifact persistence using the safetensors format
//!
//! Weights are stored as little-endian F64 tensors; provenance and metrics
//! travel in the safetensors header metadata as JSON. One file per artifact:
//! `{dir}/{name}__{version}.safetensors`, written to a temp file and renamed
//! so a concurrent reader never sees a partial artifact.

use safetensors::tensor::{Dtype, SafeTensors, TensorView};
use safetensors::serialize_to_file;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::features::FEATURE_COUNT;
use crate::game::PlayCall;
use crate::models::artifact::{ArtifactMetadata, ModelArtifact, Predictor};
use crate::models::linear::{LinearRegressor, SoftmaxClassifier, Standardizer};
use crate::{DecisionServiceError, Result};

const FORMAT: &str = "fourth-and-short/1";
const EXTENSION: &str = "safetensors";
const SEPARATOR: &str = "__";

fn artifact_err(e: impl std::fmt::Display) -> DecisionServiceError {
    DecisionServiceError::Artifact(e.to_string())
}

/// Directory of persisted artifacts.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, name: &str, version: &str) -> PathBuf {
        self.dir
            .join(format!("{}{}{}.{}", name, SEPARATOR, version, EXTENSION))
    }

    /// Persist an artifact, returning the file it was written to.
    ///
    /// An existing file for the same version is only replaced when it holds
    /// the same weights; otherwise the save fails with `VersionConflict`.
    pub fn save(&self, artifact: &ModelArtifact) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path_for(artifact.name(), artifact.version());
        if path.exists() {
            if let Ok(existing) = self.load(&path) {
                if existing.predictor() != artifact.predictor() {
                    return Err(DecisionServiceError::VersionConflict {
                        model: artifact.name().to_string(),
                        version: artifact.version().to_string(),
                    });
                }
            }
        }
        let tmp = path.with_extension("tmp");

        let mut tensors: HashMap<String, (Vec<usize>, Vec<u8>)> = HashMap::new();
        let labels = match artifact.predictor() {
            Predictor::Classifier(model) => {
                let flat: Vec<f64> = model.weights().iter().flatten().copied().collect();
                tensors.insert(
                    "classifier.weights".into(),
                    (vec![model.labels().len(), FEATURE_COUNT], to_bytes(&flat)),
                );
                tensors.insert(
                    "classifier.bias".into(),
                    (vec![model.bias().len()], to_bytes(model.bias())),
                );
                tensors.insert(
                    "classifier.temperature".into(),
                    (vec![1], to_bytes(&[model.temperature()])),
                );
                insert_standardizer(&mut tensors, model.standardizer());
                model
                    .labels()
                    .iter()
                    .map(|l| l.label())
                    .collect::<Vec<_>>()
                    .join(",")
            }
            Predictor::Regressor(model) => {
                tensors.insert(
                    "regressor.weights".into(),
                    (vec![FEATURE_COUNT], to_bytes(model.weights())),
                );
                tensors.insert("regressor.bias".into(), (vec![1], to_bytes(&[model.bias()])));
                tensors.insert(
                    "regressor.residual_std".into(),
                    (vec![1], to_bytes(&[model.residual_std()])),
                );
                insert_standardizer(&mut tensors, model.standardizer());
                String::new()
            }
        };

        let views: HashMap<String, TensorView<'_>> = tensors
            .iter()
            .map(|(name, (shape, data))| {
                TensorView::new(Dtype::F64, shape.clone(), data)
                    .map(|view| (name.clone(), view))
                    .map_err(artifact_err)
            })
            .collect::<Result<_>>()?;

        let mut header = HashMap::new();
        header.insert("format".to_string(), FORMAT.to_string());
        header.insert(
            "artifact".to_string(),
            serde_json::to_string(artifact.metadata()).map_err(artifact_err)?,
        );
        header.insert("labels".to_string(), labels);

        serialize_to_file(views, &Some(header), &tmp).map_err(artifact_err)?;
        fs::rename(&tmp, &path)?;
        log::info!("💾 Saved {}@{} to {}", artifact.name(), artifact.version(), path.display());
        Ok(path)
    }

    pub fn load(&self, path: impl AsRef<Path>) -> Result<ModelArtifact> {
        let path = path.as_ref();
        let buffer = fs::read(path)?;

        let (_, header) = SafeTensors::read_metadata(&buffer).map_err(artifact_err)?;
        let header = header.metadata().clone().unwrap_or_default();
        if header.get("format").map(String::as_str) != Some(FORMAT) {
            return Err(DecisionServiceError::Artifact(format!(
                "{} is not a decision model artifact",
                path.display()
            )));
        }
        let metadata: ArtifactMetadata = header
            .get("artifact")
            .ok_or_else(|| artifact_err("missing artifact metadata"))
            .and_then(|json| serde_json::from_str(json).map_err(artifact_err))?;

        let tensors = SafeTensors::deserialize(&buffer).map_err(artifact_err)?;
        let standardizer = Standardizer::from_parts(
            fixed(&read_f64(&tensors, "standardizer.mean")?)?,
            fixed(&read_f64(&tensors, "standardizer.scale")?)?,
        )?;

        let predictor = match metadata.kind {
            crate::models::ModelKind::DecisionClassifier => {
                let labels = header
                    .get("labels")
                    .map(String::as_str)
                    .unwrap_or_default()
                    .split(',')
                    .map(|l| l.parse::<PlayCall>().map_err(artifact_err))
                    .collect::<Result<Vec<_>>>()?;
                let weights = read_f64(&tensors, "classifier.weights")?
                    .chunks(FEATURE_COUNT)
                    .map(fixed)
                    .collect::<Result<Vec<_>>>()?;
                let bias = read_f64(&tensors, "classifier.bias")?;
                // Uncalibrated artifacts carry no temperature tensor
                let temperature = match tensors.tensor("classifier.temperature") {
                    Ok(_) => scalar(&tensors, "classifier.temperature")?,
                    Err(_) => 1.0,
                };
                Predictor::Classifier(
                    SoftmaxClassifier::from_parts(labels, weights, bias, standardizer)?
                        .with_temperature(temperature)?,
                )
            }
            crate::models::ModelKind::OutcomeRegressor => {
                let weights = fixed(&read_f64(&tensors, "regressor.weights")?)?;
                let bias = scalar(&tensors, "regressor.bias")?;
                let residual_std = scalar(&tensors, "regressor.residual_std")?;
                Predictor::Regressor(LinearRegressor::from_parts(weights, bias, residual_std, standardizer)?)
            }
        };

        ModelArtifact::new(metadata, predictor)
    }

    /// Every artifact in the store, oldest first per model; unreadable files are skipped.
    pub fn list(&self) -> Result<Vec<ModelArtifact>> {
        let pattern = self.dir.join(format!("*{}*.{}", SEPARATOR, EXTENSION));
        let pattern = pattern.to_string_lossy();
        let mut artifacts = Vec::new();
        for entry in glob::glob(&pattern).map_err(artifact_err)? {
            let path = match entry {
                Ok(p) => p,
                Err(e) => {
                    log::warn!("⚠️ Unreadable artifact entry: {}", e);
                    continue;
                }
            };
            match self.load(&path) {
                Ok(artifact) => artifacts.push(artifact),
                Err(e) => log::warn!("⚠️ Skipping {}: {}", path.display(), e),
            }
        }
        artifacts.sort_by(|a, b| {
            a.name()
                .cmp(b.name())
                .then(a.created_at().cmp(&b.created_at()))
                .then(a.version().cmp(b.version()))
        });
        Ok(artifacts)
    }

    /// Newest servable artifact of one model: passed the quality floor and
    /// built for the current feature schema.
    pub fn latest(&self, name: &str) -> Result<Option<ModelArtifact>> {
        Ok(self
            .list()?
            .into_iter()
            .filter(|a| a.name() == name && a.passed_quality() && a.is_current_schema())
            .last())
    }

    /// Newest servable artifact of every model in the store.
    pub fn latest_per_model(&self) -> Result<Vec<ModelArtifact>> {
        let mut latest: Vec<ModelArtifact> = Vec::new();
        for artifact in self.list()? {
            if !artifact.passed_quality() || !artifact.is_current_schema() {
                continue;
            }
            match latest.last_mut() {
                Some(prev) if prev.name() == artifact.name() => *prev = artifact,
                _ => latest.push(artifact),
            }
        }
        Ok(latest)
    }
}

fn insert_standardizer(tensors: &mut HashMap<String, (Vec<usize>, Vec<u8>)>, s: &Standardizer) {
    tensors.insert(
        "standardizer.mean".into(),
        (vec![FEATURE_COUNT], to_bytes(s.mean())),
    );
    tensors.insert(
        "standardizer.scale".into(),
        (vec![FEATURE_COUNT], to_bytes(s.scale())),
    );
}

fn to_bytes(values: &[f64]) -> Vec<u8> {
    values.iter().flat_map(|x| x.to_le_bytes()).collect()
}

fn read_f64(tensors: &SafeTensors<'_>, name: &str) -> Result<Vec<f64>> {
    let view = tensors
        .tensor(name)
        .map_err(|e| artifact_err(format!("tensor '{}': {}", name, e)))?;
    if view.dtype() != Dtype::F64 {
        return Err(artifact_err(format!(
            "tensor '{}' has dtype {:?}, expected F64",
            name,
            view.dtype()
        )));
    }
    Ok(view
        .data()
        .chunks_exact(8)
        .map(|chunk| {
            f64::from_le_bytes([
                chunk[0], chunk[1], chunk[2], chunk[3],
                chunk[4], chunk[5], chunk[6], chunk[7],
            ])
        })
        .collect())
}

fn fixed(values: &[f64]) -> Result<[f64; FEATURE_COUNT]> {
    values.try_into().map_err(|_| {
        artifact_err(format!(
            "expected {} values per feature row, found {}",
            FEATURE_COUNT,
            values.len()
        ))
    })
}

fn scalar(tensors: &SafeTensors<'_>, name: &str) -> Result<f64> {
    read_f64(tensors, name)?
        .first()
        .copied()
        .ok_or_else(|| artifact_err(format!("tensor '{}' is empty", name)))
}
