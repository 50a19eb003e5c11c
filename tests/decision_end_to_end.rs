//! Train on synthetic history, then decide through the public API.

mod common;

use std::sync::Arc;

use assert_matches::assert_matches;
use fourth_and_short::data::TrainingDataset;
use fourth_and_short::decision::{DecisionEngine, DecisionPolicy, DECISION_MODEL};
use fourth_and_short::models::ModelKind;
use fourth_and_short::training::{ActivationStatus, CancellationToken, Trainer, TrainingConfig};
use fourth_and_short::{DecisionServiceError, GameState, ModelRegistry, PlayCall};

fn fourth_and_one() -> GameState {
    GameState::builder(4, 1, 35)
        .score_diff(-3)
        .time_remaining(120)
        .build()
        .unwrap()
}

fn trained_engine() -> (DecisionEngine, String) {
    let records = common::synthetic_records(3000, 11);
    let dataset = TrainingDataset::from_records(ModelKind::DecisionClassifier, &records).unwrap();
    let registry = Arc::new(ModelRegistry::default());
    let result = Trainer::new(common::classifier_config(200))
        .train(&dataset, &registry, &CancellationToken::new())
        .unwrap();
    assert_eq!(result.status, ActivationStatus::Accepted);
    let version = result.artifact.version().to_string();
    (DecisionEngine::new(registry, DecisionPolicy::default()), version)
}

#[test]
fn test_trained_classifier_answers_fourth_and_one() {
    let (engine, version) = trained_engine();
    let result = engine.decide(&fourth_and_one()).unwrap();

    assert!(PlayCall::ALL.contains(&result.recommendation));
    assert_eq!(result.probabilities.len(), 3);
    let total: f64 = result.probabilities.iter().map(|p| p.probability).sum();
    assert!((total - 1.0).abs() < 1e-9, "probabilities sum to {}", total);

    let top = result
        .probabilities
        .iter()
        .map(|p| p.probability)
        .fold(f64::NEG_INFINITY, f64::max);
    assert_eq!(result.probability_of(result.recommendation), Some(top));
    assert_eq!(result.low_confidence, top < engine.policy().confidence_floor);

    assert_eq!(result.model, DECISION_MODEL);
    assert_eq!(result.model_version, version);
    assert!(!result.freshness.stale);
    assert!(result.expected_points.is_none());
}

#[test]
fn test_short_yardage_late_and_trailing_goes_for_it() {
    let (engine, _) = trained_engine();
    let result = engine.decide(&fourth_and_one()).unwrap();
    assert_eq!(result.recommendation, PlayCall::Go);
    assert!(!result.low_confidence);
}

#[test]
fn test_expected_points_attached_once_regressor_is_trained() {
    let (engine, _) = trained_engine();
    let records = common::synthetic_records(3000, 12);
    let dataset = TrainingDataset::from_records(ModelKind::OutcomeRegressor, &records).unwrap();
    let config = TrainingConfig::builder(ModelKind::OutcomeRegressor).build().unwrap();
    let result = Trainer::new(config)
        .train(&dataset, engine.registry(), &CancellationToken::new())
        .unwrap();
    assert_eq!(result.status, ActivationStatus::Accepted);

    let decision = engine.decide(&fourth_and_one()).unwrap();
    let estimate = decision.expected_points.expect("regressor is active");
    assert!(estimate.lower <= estimate.value && estimate.value <= estimate.upper);
}

#[test]
fn test_decide_before_any_training_is_unavailable() {
    let engine = DecisionEngine::new(Arc::new(ModelRegistry::default()), DecisionPolicy::default());
    assert_matches!(
        engine.decide(&fourth_and_one()),
        Err(DecisionServiceError::ModelUnavailable { model }) if model == DECISION_MODEL
    );
    assert_matches!(
        engine.expected_points(&fourth_and_one()),
        Err(DecisionServiceError::ModelUnavailable { .. })
    );
}

#[test]
fn test_bulk_decisions_keep_input_order() {
    let (engine, _) = trained_engine();
    let states: Vec<GameState> = (1..=10)
        .map(|d| GameState::builder(4, d, 40 + d).build().unwrap())
        .collect();
    let results = engine.decide_many(&states);
    assert_eq!(results.len(), states.len());
    for (state, result) in states.iter().zip(&results) {
        let single = engine.decide(state).unwrap();
        let batch = result.as_ref().unwrap();
        assert_eq!(batch.recommendation, single.recommendation);
        assert_eq!(batch.probabilities, single.probabilities);
    }
}
