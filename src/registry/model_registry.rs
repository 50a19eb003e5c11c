//! Process-wide registry of served model artifacts.
//!
//! Each model name maps to an immutable [`RegistryEntry`] snapshot holding
//! the active artifact and a bounded history. Activation and rollback build
//! a new snapshot and replace the old one under a short write lock; readers
//! clone the `Arc` and score without holding any lock, so they see either
//! the old or the new artifact, never a mix.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::features::FEATURE_SCHEMA_VERSION;
use crate::models::{ArtifactStore, EvaluationMetrics, ModelArtifact, ModelKind};
use crate::{DecisionServiceError, Result};

// ============================================================================
// CONFIGURATION
// ============================================================================

#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Previous artifacts kept per model for rollback (at least 1)
    pub history_depth: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self { history_depth: 3 }
    }
}

// ============================================================================
// SNAPSHOTS
// ============================================================================

/// Active artifact plus previous ones, newest first.
#[derive(Debug, Clone)]
pub struct RegistryEntry {
    active: Arc<ModelArtifact>,
    history: VecDeque<Arc<ModelArtifact>>,
}

impl RegistryEntry {
    pub fn active(&self) -> &Arc<ModelArtifact> {
        &self.active
    }

    pub fn history(&self) -> impl Iterator<Item = &Arc<ModelArtifact>> {
        self.history.iter()
    }
}

/// Health view of one registry entry.
#[derive(Debug, Clone, Serialize)]
pub struct ModelStatus {
    pub name: String,
    pub active_version: String,
    pub kind: ModelKind,
    pub schema_version: u32,
    pub created_at: DateTime<Utc>,
    pub passed_quality: bool,
    pub forced: bool,
    pub metrics: EvaluationMetrics,
    /// Versions available for rollback, newest first
    pub history: Vec<String>,
}

// ============================================================================
// REGISTRY
// ============================================================================

#[derive(Debug, Default)]
pub struct ModelRegistry {
    config: RegistryConfig,
    entries: RwLock<HashMap<String, Arc<RegistryEntry>>>,
}

impl ModelRegistry {
    pub fn new(config: RegistryConfig) -> Self {
        Self {
            config: RegistryConfig {
                history_depth: config.history_depth.max(1),
            },
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Arc<RegistryEntry>>> {
        self.entries.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Arc<RegistryEntry>>> {
        self.entries.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn entry(&self, name: &str) -> Option<Arc<RegistryEntry>> {
        self.read().get(name).cloned()
    }

    /// Active artifact of `name`, or `None` if nothing was ever activated.
    pub fn get_active(&self, name: &str) -> Option<Arc<ModelArtifact>> {
        self.entry(name).map(|e| Arc::clone(&e.active))
    }

    /// Active or historical artifact with the given version.
    pub fn get_version(&self, name: &str, version: &str) -> Option<Arc<ModelArtifact>> {
        let entry = self.entry(name)?;
        std::iter::once(&entry.active)
            .chain(entry.history.iter())
            .find(|a| a.version() == version)
            .cloned()
    }

    /// Publish `artifact` as the active version of `name`.
    ///
    /// Fails with `SchemaMismatch` when the artifact was built for another
    /// feature schema and with `QualityBelowFloor` when it failed its quality
    /// floor. Reusing a served version id for different weights fails with
    /// `VersionConflict`. A failed activation leaves the entry untouched.
    pub fn activate(&self, name: &str, artifact: impl Into<Arc<ModelArtifact>>) -> Result<()> {
        let artifact = artifact.into();
        self.check_admissible(name, &artifact)?;
        if !artifact.passed_quality() && !artifact.verdict().forced {
            let (metric, value) = artifact.metrics().headline();
            return Err(DecisionServiceError::QualityBelowFloor {
                metric,
                value,
                floor: artifact.verdict().threshold,
            });
        }
        self.swap_in(name, artifact)
    }

    /// Activate regardless of the quality floor; the schema gate still applies.
    pub fn force_activate(&self, name: &str, artifact: ModelArtifact) -> Result<()> {
        self.check_admissible(name, &artifact)?;
        if !artifact.passed_quality() {
            log::warn!(
                "⚠️ Force-activating {}@{} below its quality floor ({})",
                name,
                artifact.version(),
                artifact.verdict().floor
            );
        }
        self.swap_in(name, Arc::new(artifact.into_forced()))
    }

    fn check_admissible(&self, name: &str, artifact: &ModelArtifact) -> Result<()> {
        if artifact.name() != name {
            return Err(DecisionServiceError::InvalidConfig(format!(
                "artifact {}@{} cannot be activated as '{}'",
                artifact.name(),
                artifact.version(),
                name
            )));
        }
        artifact.check_schema(FEATURE_SCHEMA_VERSION)
    }

    fn swap_in(&self, name: &str, artifact: Arc<ModelArtifact>) -> Result<()> {
        let depth = self.config.history_depth;
        let mut entries = self.write();
        if let Some(current) = entries.get(name) {
            let clash = std::iter::once(&current.active)
                .chain(current.history.iter())
                .any(|a| a.version() == artifact.version() && a.predictor() != artifact.predictor());
            if clash {
                return Err(DecisionServiceError::VersionConflict {
                    model: name.to_string(),
                    version: artifact.version().to_string(),
                });
            }
        }
        let next = match entries.get(name) {
            // Same weights under the same id: refresh metadata only
            Some(current) if current.active.version() == artifact.version() => RegistryEntry {
                active: Arc::clone(&artifact),
                history: current.history.clone(),
            },
            Some(current) => {
                let mut history = current.history.clone();
                history.push_front(Arc::clone(&current.active));
                history.truncate(depth);
                RegistryEntry {
                    active: Arc::clone(&artifact),
                    history,
                }
            }
            None => RegistryEntry {
                active: Arc::clone(&artifact),
                history: VecDeque::new(),
            },
        };
        entries.insert(name.to_string(), Arc::new(next));
        drop(entries);
        log::info!("✅ Activated {}@{}", name, artifact.version());
        Ok(())
    }

    /// Reinstate the most recent previous version; the displaced one is dropped.
    pub fn rollback(&self, name: &str) -> Result<Arc<ModelArtifact>> {
        let mut entries = self.write();
        let current = entries
            .get(name)
            .cloned()
            .ok_or_else(|| DecisionServiceError::NoPriorVersion {
                model: name.to_string(),
            })?;
        let mut history = current.history.clone();
        let previous = history
            .pop_front()
            .ok_or_else(|| DecisionServiceError::NoPriorVersion {
                model: name.to_string(),
            })?;
        entries.insert(
            name.to_string(),
            Arc::new(RegistryEntry {
                active: Arc::clone(&previous),
                history,
            }),
        );
        drop(entries);
        log::info!(
            "⏪ Rolled back {} from {} to {}",
            name,
            current.active.version(),
            previous.version()
        );
        Ok(previous)
    }

    /// Activate every artifact in `store` that is newer than what is served.
    ///
    /// Used for warm start and for on-demand reloads. Returns the newly
    /// activated artifacts; artifacts that fail activation are logged and
    /// skipped.
    pub fn sync_from_store(&self, store: &ArtifactStore) -> Result<Vec<Arc<ModelArtifact>>> {
        let mut activated = Vec::new();
        for artifact in store.latest_per_model()? {
            let name = artifact.name().to_string();
            let newer = match self.get_active(&name) {
                Some(active) => {
                    active.version() != artifact.version() && artifact.created_at() > active.created_at()
                }
                None => true,
            };
            if !newer {
                continue;
            }
            let artifact = Arc::new(artifact);
            match self.activate(&name, Arc::clone(&artifact)) {
                Ok(()) => activated.push(artifact),
                Err(e) => log::warn!("⚠️ Not activating {}@{}: {}", name, artifact.version(), e),
            }
        }
        Ok(activated)
    }

    pub fn is_ready(&self, name: &str) -> bool {
        self.read().contains_key(name)
    }

    pub fn status(&self, name: &str) -> Option<ModelStatus> {
        let entry = self.entry(name)?;
        let active = &entry.active;
        Some(ModelStatus {
            name: name.to_string(),
            active_version: active.version().to_string(),
            kind: active.kind(),
            schema_version: active.schema_version(),
            created_at: active.created_at(),
            passed_quality: active.passed_quality(),
            forced: active.verdict().forced,
            metrics: active.metrics().clone(),
            history: entry.history.iter().map(|a| a.version().to_string()).collect(),
        })
    }

    /// Registered model names, sorted.
    pub fn model_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.read().keys().cloned().collect();
        names.sort();
        names
    }
}
