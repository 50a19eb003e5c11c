//! Training examples and datasets.

use sha2::{Digest, Sha256};
use std::collections::HashSet;

use crate::features::{extract_batch, FeatureVector};
use crate::game::{GameState, PlayCall};
use crate::models::ModelKind;
use crate::{DecisionServiceError, Result};

/// One historical situation with whatever outcomes were observed for it.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoricalRecord {
    /// Stable identifier (play id); drives the deterministic split
    pub id: u64,
    pub state: GameState,
    /// Play call actually made
    pub decision: Option<PlayCall>,
    /// Points of the next score, from the offense's point of view
    pub points: Option<f64>,
}

/// Observed label of a training example.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Outcome {
    Decision(PlayCall),
    Value(f64),
}

impl Outcome {
    pub fn kind(&self) -> ModelKind {
        match self {
            Outcome::Decision(_) => ModelKind::DecisionClassifier,
            Outcome::Value(_) => ModelKind::OutcomeRegressor,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrainingExample {
    pub id: u64,
    pub features: FeatureVector,
    pub outcome: Outcome,
}

/// Examples for one model kind plus a content-derived snapshot id.
#[derive(Debug, Clone)]
pub struct TrainingDataset {
    kind: ModelKind,
    examples: Vec<TrainingExample>,
    snapshot_id: String,
}

impl TrainingDataset {
    /// Fails with `DuplicateExample` when two examples share an id: the
    /// split and the snapshot id both order examples by id alone.
    pub fn new(kind: ModelKind, examples: Vec<TrainingExample>) -> Result<Self> {
        let mut seen = HashSet::with_capacity(examples.len());
        if let Some(dup) = examples.iter().find(|e| !seen.insert(e.id)) {
            return Err(DecisionServiceError::DuplicateExample { id: dup.id });
        }
        if let Some(bad) = examples.iter().find(|e| e.outcome.kind() != kind) {
            return Err(DecisionServiceError::InvalidConfig(format!(
                "example {} carries a {} label in a {} dataset",
                bad.id,
                bad.outcome.kind(),
                kind
            )));
        }
        let snapshot_id = snapshot_id(&examples);
        Ok(Self {
            kind,
            examples,
            snapshot_id,
        })
    }

    /// Build a dataset from history, keeping the records labelled for `kind`.
    pub fn from_records(kind: ModelKind, records: &[HistoricalRecord]) -> Result<Self> {
        let labelled: Vec<(&HistoricalRecord, Outcome)> = records
            .iter()
            .filter_map(|r| {
                let outcome = match kind {
                    ModelKind::DecisionClassifier => r.decision.map(Outcome::Decision),
                    ModelKind::OutcomeRegressor => r.points.map(Outcome::Value),
                };
                outcome.map(|o| (r, o))
            })
            .collect();

        let skipped = records.len() - labelled.len();
        if skipped > 0 {
            log::debug!("{} records carry no {} label, skipped", skipped, kind);
        }

        let states: Vec<GameState> = labelled.iter().map(|(r, _)| r.state.clone()).collect();
        let features = extract_batch(&states);
        let examples = labelled
            .into_iter()
            .zip(features)
            .map(|((record, outcome), features)| TrainingExample {
                id: record.id,
                features,
                outcome,
            })
            .collect();

        Self::new(kind, examples)
    }

    pub fn kind(&self) -> ModelKind {
        self.kind
    }

    pub fn examples(&self) -> &[TrainingExample] {
        &self.examples
    }

    pub fn len(&self) -> usize {
        self.examples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.examples.is_empty()
    }

    pub fn snapshot_id(&self) -> &str {
        &self.snapshot_id
    }
}

/// SHA-256 over the examples in id order, so arrival order does not matter.
fn snapshot_id(examples: &[TrainingExample]) -> String {
    let mut ordered: Vec<&TrainingExample> = examples.iter().collect();
    ordered.sort_by_key(|e| e.id);

    let mut hasher = Sha256::new();
    for example in ordered {
        hasher.update(example.id.to_le_bytes());
        hasher.update(example.features.schema_version().to_le_bytes());
        for value in example.features.as_slice() {
            hasher.update(value.to_le_bytes());
        }
        match example.outcome {
            Outcome::Decision(call) => hasher.update(call.label().as_bytes()),
            Outcome::Value(v) => hasher.update(v.to_le_bytes()),
        }
    }
    hasher
        .finalize()
        .iter()
        .take(8)
        .map(|b| format!("{:02x}", b))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: u64, yards: i64, decision: Option<PlayCall>, points: Option<f64>) -> HistoricalRecord {
        HistoricalRecord {
            id,
            state: GameState::builder(4, 1, yards).build().unwrap(),
            decision,
            points,
        }
    }

    #[test]
    fn test_from_records_keeps_labelled_rows() {
        let records = vec![
            record(1, 30, Some(PlayCall::FieldGoal), Some(2.5)),
            record(2, 70, Some(PlayCall::Punt), None),
            record(3, 50, None, Some(1.0)),
        ];
        let decisions = TrainingDataset::from_records(ModelKind::DecisionClassifier, &records).unwrap();
        assert_eq!(decisions.len(), 2);
        let points = TrainingDataset::from_records(ModelKind::OutcomeRegressor, &records).unwrap();
        assert_eq!(points.len(), 2);
        assert_eq!(points.examples()[1].id, 3);
    }

    #[test]
    fn test_snapshot_id_ignores_arrival_order() {
        let records = vec![
            record(1, 30, Some(PlayCall::FieldGoal), None),
            record(2, 70, Some(PlayCall::Punt), None),
        ];
        let mut reversed = records.clone();
        reversed.reverse();
        let a = TrainingDataset::from_records(ModelKind::DecisionClassifier, &records).unwrap();
        let b = TrainingDataset::from_records(ModelKind::DecisionClassifier, &reversed).unwrap();
        assert_eq!(a.snapshot_id(), b.snapshot_id());
        assert_eq!(a.snapshot_id().len(), 16);
    }

    #[test]
    fn test_snapshot_id_changes_with_labels() {
        let a = TrainingDataset::from_records(
            ModelKind::DecisionClassifier,
            &[record(1, 30, Some(PlayCall::FieldGoal), None)],
        )
        .unwrap();
        let b = TrainingDataset::from_records(
            ModelKind::DecisionClassifier,
            &[record(1, 30, Some(PlayCall::Go), None)],
        )
        .unwrap();
        assert_ne!(a.snapshot_id(), b.snapshot_id());
    }

    #[test]
    fn test_repeated_ids_rejected() {
        let records: Vec<HistoricalRecord> = (0..40)
            .map(|i| record(i % 10, 20 + i as i64, Some(PlayCall::ALL[(i % 3) as usize]), None))
            .collect();
        let err = TrainingDataset::from_records(ModelKind::DecisionClassifier, &records).unwrap_err();
        assert!(matches!(err, DecisionServiceError::DuplicateExample { id: 0 }));
        assert_eq!(err.kind(), "duplicate_example");
    }

    #[test]
    fn test_mixed_labels_rejected() {
        let state = GameState::builder(4, 1, 30).build().unwrap();
        let features = crate::features::extract(&state);
        let examples = vec![TrainingExample {
            id: 1,
            features,
            outcome: Outcome::Value(3.0),
        }];
        let err = TrainingDataset::new(ModelKind::DecisionClassifier, examples).unwrap_err();
        assert!(matches!(err, DecisionServiceError::InvalidConfig(_)));
    }
}
