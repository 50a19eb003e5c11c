//! Decision engine: turns a game situation into a recommendation.

pub mod engine;
pub mod outcomes;
pub mod policy;

pub use engine::{DecisionEngine, DecisionResult, Freshness, ModelSnapshot};
pub use outcomes::OptionOutcome;
pub use policy::DecisionPolicy;

/// Registry name of the play-call classifier
pub const DECISION_MODEL: &str = "fourth_down";
/// Registry name of the expected-points regressor
pub const EXPECTED_POINTS_MODEL: &str = "expected_points";
