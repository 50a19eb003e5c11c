//! Decision engine: feature extraction + registry lookup + policy.

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::Serialize;
use std::sync::Arc;

use crate::decision::outcomes::{option_outcomes, OptionOutcome};
use crate::decision::policy::DecisionPolicy;
use crate::features::{extract, FeatureVector};
use crate::game::{GameState, PlayCall};
use crate::models::{ModelArtifact, ModelKind, OptionProbability, Prediction, ValueEstimate};
use crate::registry::ModelRegistry;
use crate::{DecisionServiceError, Result};

/// How old the model behind a decision is.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Freshness {
    pub trained_at: DateTime<Utc>,
    pub age_seconds: i64,
    pub stale: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecisionResult {
    pub recommendation: PlayCall,
    /// One entry per option, sorted by label; sums to 1
    pub probabilities: Vec<OptionProbability>,
    /// Top probability minus the runner-up
    pub margin: f64,
    pub model: String,
    pub model_version: String,
    pub low_confidence: bool,
    pub freshness: Freshness,
    /// Expected points of the situation when a regressor is active
    pub expected_points: Option<ValueEstimate>,
    /// Expected points per play call, sorted by label; empty without a regressor
    pub alternatives: Vec<OptionOutcome>,
    pub rationale: Vec<String>,
}

impl DecisionResult {
    pub fn probability_of(&self, call: PlayCall) -> Option<f64> {
        self.probabilities
            .iter()
            .find(|o| o.label == call)
            .map(|o| o.probability)
    }
}

/// Artifacts one or more decisions are scored against, resolved together.
#[derive(Debug, Clone)]
pub struct ModelSnapshot {
    classifier: Arc<ModelArtifact>,
    regressor: Option<Arc<ModelArtifact>>,
}

impl ModelSnapshot {
    pub fn classifier(&self) -> &Arc<ModelArtifact> {
        &self.classifier
    }

    pub fn regressor(&self) -> Option<&Arc<ModelArtifact>> {
        self.regressor.as_ref()
    }
}

#[derive(Debug, Clone)]
pub struct DecisionEngine {
    registry: Arc<ModelRegistry>,
    policy: DecisionPolicy,
}

impl DecisionEngine {
    pub fn new(registry: Arc<ModelRegistry>, policy: DecisionPolicy) -> Self {
        Self { registry, policy }
    }

    /// Like [`new`](Self::new) but refuses a policy that fails validation.
    pub fn try_new(registry: Arc<ModelRegistry>, policy: DecisionPolicy) -> Result<Self> {
        policy.validate()?;
        Ok(Self::new(registry, policy))
    }

    pub fn registry(&self) -> &Arc<ModelRegistry> {
        &self.registry
    }

    pub fn policy(&self) -> &DecisionPolicy {
        &self.policy
    }

    fn unavailable(&self, model: String) -> DecisionServiceError {
        DecisionServiceError::ModelUnavailable { model }
    }

    /// Resolve the classifier (active, or `version` when pinned) and the
    /// active regressor, if any.
    ///
    /// An unknown pinned version is reported as `ModelUnavailable` for `name@version`.
    pub fn snapshot(&self, version: Option<&str>) -> Result<ModelSnapshot> {
        let name = &self.policy.decision_model;
        let classifier = match version {
            None => self
                .registry
                .get_active(name)
                .ok_or_else(|| self.unavailable(name.clone()))?,
            Some(version) => self
                .registry
                .get_version(name, version)
                .ok_or_else(|| self.unavailable(format!("{}@{}", name, version)))?,
        };
        Ok(ModelSnapshot {
            classifier,
            regressor: self.registry.get_active(&self.policy.expected_points_model),
        })
    }

    /// Recommend a play call using the active classifier.
    pub fn decide(&self, state: &GameState) -> Result<DecisionResult> {
        self.decide_with(state, &self.snapshot(None)?)
    }

    /// Like [`decide`](Self::decide) but against a specific version when one is given.
    pub fn decide_pinned(&self, state: &GameState, version: Option<&str>) -> Result<DecisionResult> {
        self.decide_with(state, &self.snapshot(version)?)
    }

    /// Decide a batch against one snapshot of the active classifier.
    ///
    /// Each state is answered independently, in input order.
    pub fn decide_many(&self, states: &[GameState]) -> Vec<Result<DecisionResult>> {
        match self.snapshot(None) {
            Ok(snapshot) => self.decide_many_with(states, &snapshot),
            Err(_) => states
                .iter()
                .map(|_| Err(self.unavailable(self.policy.decision_model.clone())))
                .collect(),
        }
    }

    pub fn decide_many_with(
        &self,
        states: &[GameState],
        snapshot: &ModelSnapshot,
    ) -> Vec<Result<DecisionResult>> {
        states
            .par_iter()
            .map(|state| self.decide_with(state, snapshot))
            .collect()
    }

    /// Age of `artifact` against the policy's freshness window.
    pub fn freshness(&self, artifact: &ModelArtifact) -> Freshness {
        let trained_at = artifact.created_at();
        let age = Utc::now() - trained_at;
        Freshness {
            trained_at,
            age_seconds: age.num_seconds(),
            stale: age > self.policy.max_model_age,
        }
    }

    /// Expected points of `state` from the active regressor.
    pub fn expected_points(&self, state: &GameState) -> Result<ValueEstimate> {
        let name = &self.policy.expected_points_model;
        let artifact = self
            .registry
            .get_active(name)
            .ok_or_else(|| self.unavailable(name.clone()))?;
        estimate(&artifact, &extract(state))
    }

    fn optional_expected_points(
        &self,
        regressor: Option<&Arc<ModelArtifact>>,
        state: &GameState,
        features: &FeatureVector,
    ) -> (Option<ValueEstimate>, Vec<OptionOutcome>) {
        let Some(artifact) = regressor else {
            return (None, Vec::new());
        };
        let situation = match estimate(artifact, features) {
            Ok(value) => value,
            Err(e) => {
                log::warn!("⚠️ Expected points unavailable: {}", e);
                return (None, Vec::new());
            }
        };
        match option_outcomes(state, artifact) {
            Ok(outcomes) => (Some(situation), outcomes),
            Err(e) => {
                log::warn!("⚠️ Option outcomes unavailable: {}", e);
                (Some(situation), Vec::new())
            }
        }
    }

    /// Score `state` against an already resolved snapshot.
    pub fn decide_with(&self, state: &GameState, snapshot: &ModelSnapshot) -> Result<DecisionResult> {
        let artifact = snapshot.classifier.as_ref();
        ensure_kind(artifact, ModelKind::DecisionClassifier)?;
        let features = extract(state);
        let probabilities = match artifact.predict(&features)? {
            Prediction::Probabilities(options) => options,
            Prediction::Value(_) => {
                return Err(DecisionServiceError::ModelKindMismatch {
                    model: artifact.name().to_string(),
                    version: artifact.version().to_string(),
                    expected: ModelKind::DecisionClassifier,
                    found: ModelKind::OutcomeRegressor,
                })
            }
        };

        let (top, margin) = pick(&probabilities).ok_or_else(|| {
            DecisionServiceError::Artifact(format!("{} produced no options", artifact.version()))
        })?;
        let low_confidence = top.probability < self.policy.confidence_floor;

        let freshness = self.freshness(artifact);

        let (expected_points, alternatives) =
            self.optional_expected_points(snapshot.regressor(), state, &features);
        let rationale = rationale(state, top.label, &alternatives, low_confidence, freshness.stale);

        Ok(DecisionResult {
            recommendation: top.label,
            probabilities,
            margin,
            model: artifact.name().to_string(),
            model_version: artifact.version().to_string(),
            low_confidence,
            freshness,
            expected_points,
            alternatives,
            rationale,
        })
    }
}

fn ensure_kind(artifact: &ModelArtifact, expected: ModelKind) -> Result<()> {
    if artifact.kind() != expected {
        return Err(DecisionServiceError::ModelKindMismatch {
            model: artifact.name().to_string(),
            version: artifact.version().to_string(),
            expected,
            found: artifact.kind(),
        });
    }
    Ok(())
}

fn estimate(artifact: &ModelArtifact, features: &FeatureVector) -> Result<ValueEstimate> {
    ensure_kind(artifact, ModelKind::OutcomeRegressor)?;
    match artifact.predict(features)? {
        Prediction::Value(v) => Ok(v),
        Prediction::Probabilities(_) => Err(DecisionServiceError::ModelKindMismatch {
            model: artifact.name().to_string(),
            version: artifact.version().to_string(),
            expected: ModelKind::OutcomeRegressor,
            found: ModelKind::DecisionClassifier,
        }),
    }
}

/// Highest-probability option and its lead over the runner-up.
///
/// `options` are sorted by label, so keeping the first maximum resolves
/// ties by lexical label order.
fn pick(options: &[OptionProbability]) -> Option<(OptionProbability, f64)> {
    let mut best: Option<OptionProbability> = None;
    for option in options {
        match best {
            Some(b) if option.probability <= b.probability => {}
            _ => best = Some(*option),
        }
    }
    let best = best?;
    let runner_up = options
        .iter()
        .filter(|o| o.label != best.label)
        .map(|o| o.probability)
        .fold(0.0, f64::max);
    Some((best, best.probability - runner_up))
}

fn rationale(
    state: &GameState,
    call: PlayCall,
    alternatives: &[OptionOutcome],
    low_confidence: bool,
    stale: bool,
) -> Vec<String> {
    let mut reasons = Vec::new();
    if state.distance() <= 3 {
        reasons.push(format!("Short yardage: {} to go", state.distance()));
    }
    if state.field_position() <= 20 {
        reasons.push("Inside the red zone".to_string());
    } else if state.field_position() >= 60 {
        reasons.push("Backed up in own territory".to_string());
    }
    if state.score_diff() < 0 && state.time_remaining() < 300 {
        reasons.push("Trailing late".to_string());
    }
    reasons.push(
        match call {
            PlayCall::Go => "Conversion odds favour going for it".to_string(),
            PlayCall::FieldGoal => format!(
                "{}-yard attempt is within kicking range",
                state.field_goal_distance()
            ),
            PlayCall::Punt => "Field position swing favours a punt".to_string(),
        },
    );
    if let Some(best) = alternatives.iter().find(|o| o.delta_ep > 0.0) {
        reasons.push(format!(
            "Expected points favour {} by {:.2}",
            best.label, best.delta_ep
        ));
    }
    if low_confidence {
        reasons.push("Options are close; low confidence".to_string());
    }
    if stale {
        reasons.push("Model is past its freshness window".to_string());
    }
    reasons
}
