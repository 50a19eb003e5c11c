use serde::{Deserialize, Serialize};
use std::fmt;

/// Family of model a training run produces.
#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ModelKind {
    /// GO / PUNT / FG classifier
    DecisionClassifier,
    /// Expected-points regressor
    OutcomeRegressor,
}

impl ModelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelKind::DecisionClassifier => "decision-classifier",
            ModelKind::OutcomeRegressor => "outcome-regressor",
        }
    }

    /// Registry name a model of this kind is published under by default
    pub fn default_model_name(&self) -> &'static str {
        match self {
            ModelKind::DecisionClassifier => crate::decision::DECISION_MODEL,
            ModelKind::OutcomeRegressor => crate::decision::EXPECTED_POINTS_MODEL,
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ModelKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "decision-classifier" => Ok(ModelKind::DecisionClassifier),
            "outcome-regressor" => Ok(ModelKind::OutcomeRegressor),
            other => Err(format!("unknown model kind '{}'", other)),
        }
    }
}
