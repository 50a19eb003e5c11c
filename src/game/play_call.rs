//! Fourth-down play calls.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The options a decision classifier chooses between.
///
/// Variants are declared in lexical order of their labels, which is also the
/// tie-breaking order used by the decision engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PlayCall {
    #[serde(rename = "FG")]
    FieldGoal,
    #[serde(rename = "GO")]
    Go,
    #[serde(rename = "PUNT")]
    Punt,
}

impl PlayCall {
    pub const ALL: [PlayCall; 3] = [PlayCall::FieldGoal, PlayCall::Go, PlayCall::Punt];

    pub fn label(&self) -> &'static str {
        match self {
            PlayCall::FieldGoal => "FG",
            PlayCall::Go => "GO",
            PlayCall::Punt => "PUNT",
        }
    }
}

impl fmt::Display for PlayCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for PlayCall {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "FG" | "FIELD_GOAL" | "FIELD GOAL" => Ok(PlayCall::FieldGoal),
            "GO" | "GO_FOR_IT" | "RUN" | "PASS" => Ok(PlayCall::Go),
            "PUNT" => Ok(PlayCall::Punt),
            other => Err(format!("unknown play call '{}'", other)),
        }
    }
}
