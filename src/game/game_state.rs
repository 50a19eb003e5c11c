//! Game situations.
//!
//! A [`GameState`] can only be obtained through validation: out-of-domain
//! values are rejected with a [`ValidationError`] naming the field, never
//! clamped. Raw inputs (HTTP payloads, CSV rows) arrive as a
//! [`GameStatePayload`] with wide integer types so that bad values survive
//! long enough to be reported.

use serde::{Deserialize, Serialize};

/// Longest game context in seconds (a full regulation game)
pub const MAX_TIME_REMAINING: i64 = 3600;
/// Overtime period length in seconds
pub const OVERTIME_SECONDS: i64 = 600;
pub const MAX_SCORE_DIFF: i64 = 99;

/// A field failed domain validation.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("invalid {field}: {reason}")]
pub struct ValidationError {
    pub field: &'static str,
    pub reason: String,
}

impl ValidationError {
    pub fn new(field: &'static str, reason: impl Into<String>) -> Self {
        Self {
            field,
            reason: reason.into(),
        }
    }
}

/// Unvalidated game situation as received from callers or history files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameStatePayload {
    pub down: i64,
    #[serde(alias = "ydstogo")]
    pub distance: i64,
    /// Yards to the opponent goal line
    #[serde(alias = "yardline_100")]
    pub field_position: i64,
    #[serde(default, alias = "score_differential")]
    pub score_diff: i64,
    #[serde(alias = "half_seconds_remaining")]
    pub time_remaining: i64,
    #[serde(default = "default_quarter", alias = "qtr")]
    pub quarter: i64,
    #[serde(default = "default_timeouts", alias = "posteam_timeouts_remaining")]
    pub offense_timeouts: i64,
    #[serde(default = "default_timeouts", alias = "defteam_timeouts_remaining")]
    pub defense_timeouts: i64,
    #[serde(default)]
    pub home: bool,
    #[serde(default)]
    pub team_strength_off: Option<f64>,
    #[serde(default)]
    pub team_strength_def: Option<f64>,
    #[serde(default, alias = "weather_wind")]
    pub wind_mph: Option<f64>,
}

fn default_quarter() -> i64 {
    4
}

fn default_timeouts() -> i64 {
    3
}

/// Immutable, validated snapshot of a football situation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GameState {
    down: u8,
    distance: u8,
    field_position: u8,
    score_diff: i16,
    time_remaining: u16,
    quarter: u8,
    offense_timeouts: u8,
    defense_timeouts: u8,
    home: bool,
    team_strength_off: Option<f64>,
    team_strength_def: Option<f64>,
    wind_mph: Option<f64>,
}

fn in_range(field: &'static str, value: i64, min: i64, max: i64) -> Result<i64, ValidationError> {
    if value < min || value > max {
        Err(ValidationError::new(
            field,
            format!("{} is outside {}..={}", value, min, max),
        ))
    } else {
        Ok(value)
    }
}

fn finite(field: &'static str, value: Option<f64>) -> Result<Option<f64>, ValidationError> {
    match value {
        Some(v) if !v.is_finite() => Err(ValidationError::new(field, "must be a finite number")),
        other => Ok(other),
    }
}

impl TryFrom<GameStatePayload> for GameState {
    type Error = ValidationError;

    fn try_from(p: GameStatePayload) -> Result<Self, Self::Error> {
        let down = in_range("down", p.down, 1, 4)?;
        let field_position = in_range("field_position", p.field_position, 1, 99)?;
        let distance = in_range("distance", p.distance, 1, 99)?;
        if distance > field_position {
            return Err(ValidationError::new(
                "distance",
                format!(
                    "{} yards to go exceeds the {} yards left to the goal line",
                    distance, field_position
                ),
            ));
        }
        let score_diff = in_range("score_diff", p.score_diff, -MAX_SCORE_DIFF, MAX_SCORE_DIFF)?;
        let time_remaining = in_range("time_remaining", p.time_remaining, 0, MAX_TIME_REMAINING)?;
        let quarter = in_range("quarter", p.quarter, 1, 5)?;
        if quarter == 5 && time_remaining > OVERTIME_SECONDS {
            return Err(ValidationError::new(
                "time_remaining",
                format!("{}s left is longer than an overtime period", time_remaining),
            ));
        }
        let offense_timeouts = in_range("offense_timeouts", p.offense_timeouts, 0, 3)?;
        let defense_timeouts = in_range("defense_timeouts", p.defense_timeouts, 0, 3)?;
        let team_strength_off = finite("team_strength_off", p.team_strength_off)?;
        let team_strength_def = finite("team_strength_def", p.team_strength_def)?;
        let wind_mph = finite("wind_mph", p.wind_mph)?;
        if matches!(wind_mph, Some(w) if w < 0.0) {
            return Err(ValidationError::new("wind_mph", "must not be negative"));
        }

        Ok(Self {
            down: down as u8,
            distance: distance as u8,
            field_position: field_position as u8,
            score_diff: score_diff as i16,
            time_remaining: time_remaining as u16,
            quarter: quarter as u8,
            offense_timeouts: offense_timeouts as u8,
            defense_timeouts: defense_timeouts as u8,
            home: p.home,
            team_strength_off,
            team_strength_def,
            wind_mph,
        })
    }
}

impl GameState {
    /// Start building a state from the three situational essentials.
    ///
    /// Defaults: tied score, 900 seconds left in the 4th quarter, three
    /// timeouts each, away team, no strength or weather covariates.
    pub fn builder(down: i64, distance: i64, field_position: i64) -> GameStateBuilder {
        GameStateBuilder {
            payload: GameStatePayload {
                down,
                distance,
                field_position,
                score_diff: 0,
                time_remaining: 900,
                quarter: default_quarter(),
                offense_timeouts: default_timeouts(),
                defense_timeouts: default_timeouts(),
                home: false,
                team_strength_off: None,
                team_strength_def: None,
                wind_mph: None,
            },
        }
    }

    pub fn down(&self) -> u8 {
        self.down
    }

    pub fn distance(&self) -> u8 {
        self.distance
    }

    pub fn field_position(&self) -> u8 {
        self.field_position
    }

    pub fn score_diff(&self) -> i16 {
        self.score_diff
    }

    pub fn time_remaining(&self) -> u16 {
        self.time_remaining
    }

    pub fn quarter(&self) -> u8 {
        self.quarter
    }

    pub fn offense_timeouts(&self) -> u8 {
        self.offense_timeouts
    }

    pub fn defense_timeouts(&self) -> u8 {
        self.defense_timeouts
    }

    pub fn home(&self) -> bool {
        self.home
    }

    pub fn team_strength_off(&self) -> Option<f64> {
        self.team_strength_off
    }

    pub fn team_strength_def(&self) -> Option<f64> {
        self.team_strength_def
    }

    pub fn wind_mph(&self) -> Option<f64> {
        self.wind_mph
    }

    /// Yards a field goal attempt from this spot would travel
    pub fn field_goal_distance(&self) -> u8 {
        self.field_position + 17
    }

    pub fn to_payload(&self) -> GameStatePayload {
        GameStatePayload {
            down: self.down as i64,
            distance: self.distance as i64,
            field_position: self.field_position as i64,
            score_diff: self.score_diff as i64,
            time_remaining: self.time_remaining as i64,
            quarter: self.quarter as i64,
            offense_timeouts: self.offense_timeouts as i64,
            defense_timeouts: self.defense_timeouts as i64,
            home: self.home,
            team_strength_off: self.team_strength_off,
            team_strength_def: self.team_strength_def,
            wind_mph: self.wind_mph,
        }
    }
}

/// Fluent construction of a [`GameState`]; validation happens in [`GameStateBuilder::build`].
#[derive(Debug, Clone)]
pub struct GameStateBuilder {
    payload: GameStatePayload,
}

impl GameStateBuilder {
    pub fn score_diff(mut self, score_diff: i64) -> Self {
        self.payload.score_diff = score_diff;
        self
    }

    pub fn time_remaining(mut self, seconds: i64) -> Self {
        self.payload.time_remaining = seconds;
        self
    }

    pub fn quarter(mut self, quarter: i64) -> Self {
        self.payload.quarter = quarter;
        self
    }

    pub fn timeouts(mut self, offense: i64, defense: i64) -> Self {
        self.payload.offense_timeouts = offense;
        self.payload.defense_timeouts = defense;
        self
    }

    pub fn home(mut self, home: bool) -> Self {
        self.payload.home = home;
        self
    }

    pub fn team_strengths(mut self, offense: f64, defense: f64) -> Self {
        self.payload.team_strength_off = Some(offense);
        self.payload.team_strength_def = Some(defense);
        self
    }

    pub fn wind_mph(mut self, wind: f64) -> Self {
        self.payload.wind_mph = Some(wind);
        self
    }

    pub fn build(self) -> Result<GameState, ValidationError> {
        GameState::try_from(self.payload)
    }
}
