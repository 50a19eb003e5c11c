//! CSV ingestion of play history.
//!
//! Accepts our own column names as well as nflfastR-style exports
//! (`ydstogo`, `yardline_100`, `half_seconds_remaining`, `play_type`, ...).
//! Missing timeout columns count as three timeouts and a missing `home`
//! column as the home side. Any present value outside its domain fails the
//! whole load with the offending row.
//!
//! nflfastR numbers plays per game, so when a `game_id` column is present the
//! record id is derived from the (`game_id`, `play_id`) pair.

use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::path::Path;

use crate::data::dataset::HistoricalRecord;
use crate::game::{GameState, GameStatePayload, PlayCall, ValidationError};
use crate::{DecisionServiceError, Result};

#[derive(Debug, Deserialize)]
struct HistoryRow {
    #[serde(default)]
    game_id: Option<String>,
    #[serde(default)]
    play_id: Option<u64>,
    down: i64,
    #[serde(alias = "ydstogo")]
    distance: i64,
    #[serde(alias = "yardline_100")]
    field_position: i64,
    #[serde(alias = "score_differential")]
    score_diff: i64,
    #[serde(alias = "half_seconds_remaining")]
    time_remaining: i64,
    #[serde(alias = "qtr")]
    quarter: i64,
    #[serde(default, alias = "posteam_timeouts_remaining")]
    offense_timeouts: Option<i64>,
    #[serde(default, alias = "defteam_timeouts_remaining")]
    defense_timeouts: Option<i64>,
    #[serde(default)]
    home: Option<String>,
    #[serde(default)]
    team_strength_off: Option<f64>,
    #[serde(default)]
    team_strength_def: Option<f64>,
    #[serde(default, alias = "weather_wind")]
    wind_mph: Option<f64>,
    #[serde(default, alias = "play_type")]
    decision: Option<String>,
    #[serde(default, alias = "ep_next_score")]
    points: Option<f64>,
}

/// Stable 64-bit id of a play within a game.
fn play_key(game_id: &str, play: u64) -> u64 {
    let digest = Sha256::new()
        .chain_update(game_id.as_bytes())
        .chain_update(b":")
        .chain_update(play.to_le_bytes())
        .finalize();
    let mut head = [0u8; 8];
    head.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(head)
}

fn parse_home(raw: Option<&str>) -> std::result::Result<bool, ValidationError> {
    match raw.map(str::trim) {
        None | Some("") => Ok(true),
        Some("1") | Some("true") | Some("TRUE") => Ok(true),
        Some("0") | Some("false") | Some("FALSE") => Ok(false),
        Some(other) => Err(ValidationError::new(
            "home",
            format!("'{}' is not a boolean flag", other),
        )),
    }
}

impl HistoryRow {
    fn into_record(self, row: usize) -> std::result::Result<HistoricalRecord, ValidationError> {
        let home = parse_home(self.home.as_deref())?;
        let state = GameState::try_from(GameStatePayload {
            down: self.down,
            distance: self.distance,
            field_position: self.field_position,
            score_diff: self.score_diff,
            time_remaining: self.time_remaining,
            quarter: self.quarter,
            offense_timeouts: self.offense_timeouts.unwrap_or(3),
            defense_timeouts: self.defense_timeouts.unwrap_or(3),
            home,
            team_strength_off: self.team_strength_off,
            team_strength_def: self.team_strength_def,
            wind_mph: self.wind_mph,
        })?;

        let decision = match self.decision.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(raw) => Some(
                raw.parse::<PlayCall>()
                    .map_err(|reason| ValidationError::new("decision", reason))?,
            ),
        };
        if matches!(self.points, Some(p) if !p.is_finite()) {
            return Err(ValidationError::new("points", "must be a finite number"));
        }

        let play = self.play_id.unwrap_or(row as u64);
        let id = match self.game_id.as_deref().map(str::trim) {
            Some(game) if !game.is_empty() => play_key(game, play),
            _ => play,
        };

        Ok(HistoricalRecord {
            id,
            state,
            decision,
            points: self.points,
        })
    }
}

/// Read every row of a history CSV; the first invalid row aborts the load.
pub fn load_history_csv(path: impl AsRef<Path>) -> Result<Vec<HistoricalRecord>> {
    let path = path.as_ref();
    let mut reader = csv::Reader::from_path(path)?;
    let mut records = Vec::new();

    for (index, row) in reader.deserialize::<HistoryRow>().enumerate() {
        let row_number = index + 1;
        let record = row?
            .into_record(row_number)
            .map_err(|source| DecisionServiceError::InvalidRecord {
                row: row_number,
                source,
            })?;
        records.push(record);
    }

    log::info!("📂 Loaded {} plays from {}", records.len(), path.display());
    Ok(records)
}
