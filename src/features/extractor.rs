//! Feature extraction for FeatureSchema v1.

use rayon::prelude::*;

use crate::features::schema::{
    feature_index, FEATURE_COUNT, FEATURE_SCHEMA_VERSION, FG_RANGE_YARDS, SCORE_NORM, WIND_NORM,
};
use crate::game::GameState;

/// Numeric encoding of a [`GameState`] tagged with the schema that produced it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureVector {
    schema_version: u32,
    values: [f64; FEATURE_COUNT],
}

impl FeatureVector {
    /// Wrap raw values produced under `schema_version`.
    ///
    /// Used when reading stored vectors back; [`extract`] is the only
    /// producer for live game states.
    pub fn from_raw(schema_version: u32, values: [f64; FEATURE_COUNT]) -> Self {
        Self {
            schema_version,
            values,
        }
    }

    pub fn schema_version(&self) -> u32 {
        self.schema_version
    }

    pub fn values(&self) -> &[f64; FEATURE_COUNT] {
        &self.values
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.values
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        feature_index(name).map(|idx| self.values[idx])
    }
}

fn flag(condition: bool) -> f64 {
    if condition {
        1.0
    } else {
        0.0
    }
}

/// Encode a validated game state. Total and deterministic.
pub fn extract(state: &GameState) -> FeatureVector {
    let time_fraction = state.time_remaining() as f64 / 3600.0;
    let score = state.score_diff() as f64 / SCORE_NORM;

    let values = [
        (state.down() as f64 - 1.0) / 3.0,
        state.distance() as f64 / 10.0,
        state.field_position() as f64 / 100.0,
        score,
        time_fraction,
        (state.quarter() as f64 - 1.0) / 4.0,
        state.offense_timeouts() as f64 / 3.0,
        state.defense_timeouts() as f64 / 3.0,
        flag(state.home()),
        state.team_strength_off().unwrap_or(0.0),
        state.team_strength_def().unwrap_or(0.0),
        state.wind_mph().unwrap_or(0.0) / WIND_NORM,
        flag(state.field_goal_distance() <= FG_RANGE_YARDS),
        flag(state.distance() <= 2),
        score * (1.0 - time_fraction),
        flag(state.distance() == state.field_position()),
    ];

    FeatureVector {
        schema_version: FEATURE_SCHEMA_VERSION,
        values,
    }
}

/// Bulk extraction for training; output order matches input order.
pub fn extract_batch(states: &[GameState]) -> Vec<FeatureVector> {
    states.par_iter().map(extract).collect()
}
