use chrono::Duration;

use crate::{DecisionServiceError, Result};

/// Operational policy of the decision engine.
///
/// Build it with [`DecisionPolicy::new`] or check a hand-assembled one with
/// [`DecisionPolicy::validate`] before handing it to an engine.
#[derive(Debug, Clone)]
pub struct DecisionPolicy {
    /// Registry name of the play-call classifier
    /// Default: "fourth_down"
    pub decision_model: String,

    /// Registry name of the expected-points regressor
    /// Default: "expected_points"
    pub expected_points_model: String,

    /// Top probability strictly below this is flagged `low_confidence`
    /// Default: 0.5
    pub confidence_floor: f64,

    /// Models older than this are flagged stale (still served)
    /// Default: 30 days
    pub max_model_age: Duration,
}

impl Default for DecisionPolicy {
    fn default() -> Self {
        Self {
            decision_model: super::DECISION_MODEL.to_string(),
            expected_points_model: super::EXPECTED_POINTS_MODEL.to_string(),
            confidence_floor: 0.5,
            max_model_age: Duration::days(30),
        }
    }
}

impl DecisionPolicy {
    /// Default model names with the given floor and age limit, validated.
    pub fn new(confidence_floor: f64, max_model_age: Duration) -> Result<Self> {
        let policy = Self {
            confidence_floor,
            max_model_age,
            ..Self::default()
        };
        policy.validate()?;
        Ok(policy)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.confidence_floor.is_finite() && (0.0..=1.0).contains(&self.confidence_floor)) {
            return Err(DecisionServiceError::InvalidConfig(format!(
                "confidence_floor must be in [0, 1], got {}",
                self.confidence_floor
            )));
        }
        if self.max_model_age < Duration::zero() {
            return Err(DecisionServiceError::InvalidConfig(format!(
                "max_model_age must not be negative, got {}s",
                self.max_model_age.num_seconds()
            )));
        }
        for (field, name) in [
            ("decision_model", &self.decision_model),
            ("expected_points_model", &self.expected_points_model),
        ] {
            if name.trim().is_empty() {
                return Err(DecisionServiceError::InvalidConfig(format!(
                    "{} must not be empty",
                    field
                )));
            }
        }
        Ok(())
    }
}
