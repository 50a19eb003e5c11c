//! Expected points of each play call.
//!
//! Every option is reduced to a few post-play situations with fixed
//! probabilities. Each situation goes through the shared extractor and the
//! expected-points regressor. Situations where the opponent has the ball
//! are scored from their side and negated.

use serde::Serialize;

use crate::features::extract;
use crate::game::game_state::MAX_SCORE_DIFF;
use crate::game::{GameState, GameStatePayload, PlayCall};
use crate::models::metrics::INTERVAL_Z;
use crate::models::{ModelArtifact, Prediction};
use crate::{DecisionServiceError, Result};

/// Net yards of an average punt
pub const PUNT_NET_YARDS: i64 = 38;
/// Opponent spot (yards to their goal) after a kickoff or a touchback
pub const KICKOFF_SPOT: i64 = 75;
pub const TOUCHBACK_SPOT: i64 = 80;
/// Yards from the line of scrimmage back to the holder
pub const HOLD_DEPTH: i64 = 7;

const TOUCHDOWN_POINTS: f64 = 7.0;
const FIELD_GOAL_POINTS: f64 = 3.0;

/// Expected points of one play call, from the offense's side.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct OptionOutcome {
    pub label: PlayCall,
    pub expected_points: f64,
    /// Lead over the best other option (negative when another option is better)
    pub delta_ep: f64,
    /// Standard deviation carried over from the regressor's residuals
    pub uncertainty: f64,
    /// Conversion odds for GO, make odds for FG, 1 for PUNT
    pub success_probability: f64,
}

/// Probability of converting a fourth down with `distance` to go.
pub fn conversion_probability(distance: u8) -> f64 {
    match distance {
        0..=2 => 0.65,
        3..=4 => 0.5,
        _ => 0.3,
    }
}

/// Probability of making a field goal of `kick_yards`.
pub fn field_goal_probability(kick_yards: u8) -> f64 {
    let excess = (kick_yards as f64 - 25.0).max(0.0);
    (0.95 - 0.01 * excess).clamp(0.05, 0.98)
}

/// One weighted post-play situation.
struct Branch {
    weight: f64,
    /// Points already scored on the play
    points: f64,
    /// Who has the ball next and where
    next: Possession,
}

enum Possession {
    Offense { field_position: i64 },
    Defense { field_position: i64, score_swing: i64 },
}

fn first_down(base: &GameState, field_position: i64) -> Result<GameState> {
    let mut p: GameStatePayload = base.to_payload();
    p.down = 1;
    p.field_position = field_position.clamp(1, 99);
    p.distance = p.field_position.min(10);
    Ok(GameState::try_from(p)?)
}

/// First down for the other team, with sides swapped.
fn turnover(base: &GameState, field_position: i64, score_swing: i64) -> Result<GameState> {
    let mut p = base.to_payload();
    p.down = 1;
    p.field_position = field_position.clamp(1, 99);
    p.distance = p.field_position.min(10);
    p.score_diff = (-(p.score_diff + score_swing)).clamp(-MAX_SCORE_DIFF, MAX_SCORE_DIFF);
    std::mem::swap(&mut p.offense_timeouts, &mut p.defense_timeouts);
    std::mem::swap(&mut p.team_strength_off, &mut p.team_strength_def);
    p.home = !p.home;
    Ok(GameState::try_from(p)?)
}

fn branches(state: &GameState, call: PlayCall) -> (f64, Vec<Branch>) {
    let spot = state.field_position() as i64;
    match call {
        PlayCall::Go => {
            let p = conversion_probability(state.distance());
            let gained = spot - (state.distance() as i64 + 1);
            let success = if gained <= 0 {
                Branch {
                    weight: p,
                    points: TOUCHDOWN_POINTS,
                    next: Possession::Defense {
                        field_position: KICKOFF_SPOT,
                        score_swing: TOUCHDOWN_POINTS as i64,
                    },
                }
            } else {
                Branch {
                    weight: p,
                    points: 0.0,
                    next: Possession::Offense {
                        field_position: gained,
                    },
                }
            };
            let failure = Branch {
                weight: 1.0 - p,
                points: 0.0,
                next: Possession::Defense {
                    field_position: 100 - spot,
                    score_swing: 0,
                },
            };
            (p, vec![success, failure])
        }
        PlayCall::Punt => {
            let landing = spot - PUNT_NET_YARDS;
            let field_position = if landing < 1 { TOUCHBACK_SPOT } else { 100 - landing };
            (
                1.0,
                vec![Branch {
                    weight: 1.0,
                    points: 0.0,
                    next: Possession::Defense {
                        field_position,
                        score_swing: 0,
                    },
                }],
            )
        }
        PlayCall::FieldGoal => {
            let p = field_goal_probability(state.field_goal_distance());
            let make = Branch {
                weight: p,
                points: FIELD_GOAL_POINTS,
                next: Possession::Defense {
                    field_position: KICKOFF_SPOT,
                    score_swing: FIELD_GOAL_POINTS as i64,
                },
            };
            // Missed kicks give the ball back at the spot of the hold, never inside the 20
            let miss = Branch {
                weight: 1.0 - p,
                points: 0.0,
                next: Possession::Defense {
                    field_position: (100 - (spot + HOLD_DEPTH)).min(TOUCHBACK_SPOT),
                    score_swing: 0,
                },
            };
            (p, vec![make, miss])
        }
    }
}

/// Expected-points value and its standard deviation for one situation.
fn value_of(regressor: &ModelArtifact, state: &GameState) -> Result<(f64, f64)> {
    match regressor.predict(&extract(state))? {
        Prediction::Value(v) => Ok((v.value, (v.upper - v.lower) / (2.0 * INTERVAL_Z))),
        Prediction::Probabilities(_) => Err(DecisionServiceError::ModelKindMismatch {
            model: regressor.name().to_string(),
            version: regressor.version().to_string(),
            expected: crate::models::ModelKind::OutcomeRegressor,
            found: crate::models::ModelKind::DecisionClassifier,
        }),
    }
}

fn score_option(state: &GameState, call: PlayCall, regressor: &ModelArtifact) -> Result<(f64, f64, f64)> {
    let (success_probability, branches) = branches(state, call);
    let mut expected = 0.0;
    let mut variance = 0.0;
    for branch in branches {
        let (value, std) = match branch.next {
            Possession::Offense { field_position } => {
                value_of(regressor, &first_down(state, field_position)?)?
            }
            Possession::Defense {
                field_position,
                score_swing,
            } => {
                let (value, std) = value_of(regressor, &turnover(state, field_position, score_swing)?)?;
                (-value, std)
            }
        };
        expected += branch.weight * (branch.points + value);
        variance += (branch.weight * std).powi(2);
    }
    Ok((expected, variance.sqrt(), success_probability))
}

/// Expected points of every play call, sorted by label.
pub fn option_outcomes(state: &GameState, regressor: &ModelArtifact) -> Result<Vec<OptionOutcome>> {
    let scored = PlayCall::ALL
        .iter()
        .map(|call| score_option(state, *call, regressor).map(|s| (*call, s)))
        .collect::<Result<Vec<_>>>()?;

    Ok(scored
        .iter()
        .map(|(label, (expected_points, uncertainty, success_probability))| {
            let best_other = scored
                .iter()
                .filter(|(other, _)| other != label)
                .map(|(_, (ep, _, _))| *ep)
                .fold(f64::NEG_INFINITY, f64::max);
            OptionOutcome {
                label: *label,
                expected_points: *expected_points,
                delta_ep: expected_points - best_other,
                uncertainty: *uncertainty,
                success_probability: *success_probability,
            }
        })
        .collect())
}
