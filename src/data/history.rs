//! Synthetic play history.
//!
//! Seeded generator for demo and test datasets. Expected points follow a
//! monotone heuristic (closer to the goal, more time, better score → higher)
//! plus Gaussian noise; play calls follow a coach-like rule with a fraction
//! of random calls mixed in.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};

use crate::data::dataset::HistoricalRecord;
use crate::game::{GameState, GameStatePayload, PlayCall};
use crate::Result;

/// Knobs for [`generate_history`].
#[derive(Debug, Clone)]
pub struct HistoryOptions {
    pub rows: usize,
    pub seed: u64,
    /// Share of play calls replaced by a uniformly random call
    pub label_noise: f64,
    /// Standard deviation of the expected-points noise
    pub points_noise: f64,
}

impl Default for HistoryOptions {
    fn default() -> Self {
        Self {
            rows: 50_000,
            seed: 42,
            label_noise: 0.08,
            points_noise: 0.7,
        }
    }
}

/// Expected points of the next score before noise.
pub fn baseline_points(state: &GameState) -> f64 {
    0.08 * (100.0 - state.field_position() as f64)
        + 0.02 * (3600.0 - state.time_remaining() as f64) / 60.0
        + 0.05 * state.score_diff() as f64
        - 0.1 * (state.distance() as f64 - 3.0).max(0.0)
        - 0.15 * (state.down() as f64 - 1.0)
        + if state.home() { 0.05 } else { 0.0 }
}

/// The call a sensible coach makes; the generator's noiseless label.
pub fn coach_call(state: &GameState) -> PlayCall {
    let late_and_trailing = state.score_diff() < 0 && state.time_remaining() < 300;
    if (state.distance() <= 2 && state.field_position() <= 60)
        || (late_and_trailing && state.distance() <= 5)
    {
        PlayCall::Go
    } else if state.field_goal_distance() <= 52 {
        PlayCall::FieldGoal
    } else if state.distance() <= 1 {
        PlayCall::Go
    } else {
        PlayCall::Punt
    }
}

pub fn generate_history(options: &HistoryOptions) -> Result<Vec<HistoricalRecord>> {
    let mut rng = StdRng::seed_from_u64(options.seed);
    let strength = Normal::new(0.0, 1.0).map_err(|e| {
        crate::DecisionServiceError::InvalidConfig(format!("strength distribution: {}", e))
    })?;
    let wind = Normal::new(7.0, 5.0).map_err(|e| {
        crate::DecisionServiceError::InvalidConfig(format!("wind distribution: {}", e))
    })?;
    let points_noise = Normal::new(0.0, options.points_noise).map_err(|e| {
        crate::DecisionServiceError::InvalidConfig(format!("points noise: {}", e))
    })?;

    let mut records = Vec::with_capacity(options.rows);
    for id in 0..options.rows as u64 {
        let field_position: i64 = rng.gen_range(1..=99);
        let distance: i64 = rng.gen_range(1..=field_position.min(20));
        let payload = GameStatePayload {
            down: rng.gen_range(1..=4),
            distance,
            field_position,
            score_diff: rng.gen_range(-28..=28),
            time_remaining: rng.gen_range(0..=3600),
            quarter: rng.gen_range(1..=4),
            offense_timeouts: rng.gen_range(0..=3),
            defense_timeouts: rng.gen_range(0..=3),
            home: rng.gen_bool(0.5),
            team_strength_off: Some(strength.sample(&mut rng)),
            team_strength_def: Some(strength.sample(&mut rng)),
            wind_mph: Some(f64::abs(wind.sample(&mut rng))),
        };
        let state = GameState::try_from(payload)?;

        let decision = if rng.gen_bool(options.label_noise.clamp(0.0, 1.0)) {
            PlayCall::ALL[rng.gen_range(0..PlayCall::ALL.len())]
        } else {
            coach_call(&state)
        };
        let points = baseline_points(&state) + points_noise.sample(&mut rng);

        records.push(HistoricalRecord {
            id: id + 1,
            state,
            decision: Some(decision),
            points: Some(points),
        });
    }

    log::info!(
        "🏈 Generated {} synthetic plays (seed={})",
        records.len(),
        options.seed
    );
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small(seed: u64) -> HistoryOptions {
        HistoryOptions {
            rows: 200,
            seed,
            ..Default::default()
        }
    }

    #[test]
    fn test_same_seed_same_history() {
        let a = generate_history(&small(7)).unwrap();
        let b = generate_history(&small(7)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_different_seed_different_history() {
        let a = generate_history(&small(7)).unwrap();
        let b = generate_history(&small(8)).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_records_are_labelled_with_unique_ids() {
        let records = generate_history(&small(1)).unwrap();
        assert_eq!(records.len(), 200);
        let mut ids: Vec<u64> = records.iter().map(|r| r.id).collect();
        ids.dedup();
        assert_eq!(ids.len(), 200);
        assert!(records.iter().all(|r| r.decision.is_some() && r.points.is_some()));
    }

    #[test]
    fn test_coach_call_rules() {
        let short = GameState::builder(4, 1, 35).build().unwrap();
        assert_eq!(coach_call(&short), PlayCall::Go);
        let kick = GameState::builder(4, 6, 25).build().unwrap();
        assert_eq!(coach_call(&kick), PlayCall::FieldGoal);
        let deep = GameState::builder(4, 8, 75).build().unwrap();
        assert_eq!(coach_call(&deep), PlayCall::Punt);
    }

    #[test]
    fn test_baseline_points_monotone_in_field_position() {
        let near = GameState::builder(1, 10, 20).build().unwrap();
        let far = GameState::builder(1, 10, 80).build().unwrap();
        assert!(baseline_points(&near) > baseline_points(&far));
    }
}
