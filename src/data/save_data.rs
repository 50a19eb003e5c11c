use serde::Serialize;
use std::path::Path;

use crate::data::dataset::HistoricalRecord;
use crate::Result;

#[derive(Serialize)]
struct HistoryRowOut {
    play_id: u64,
    down: u8,
    distance: u8,
    field_position: u8,
    score_diff: i16,
    time_remaining: u16,
    quarter: u8,
    offense_timeouts: u8,
    defense_timeouts: u8,
    home: u8,
    team_strength_off: Option<f64>,
    team_strength_def: Option<f64>,
    wind_mph: Option<f64>,
    decision: Option<&'static str>,
    points: Option<f64>,
}

/// Write history in the column layout `load_history_csv` reads back.
pub fn save_history_csv(path: impl AsRef<Path>, records: &[HistoricalRecord]) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let mut writer = csv::Writer::from_path(path)?;
    for record in records {
        let s = &record.state;
        writer.serialize(HistoryRowOut {
            play_id: record.id,
            down: s.down(),
            distance: s.distance(),
            field_position: s.field_position(),
            score_diff: s.score_diff(),
            time_remaining: s.time_remaining(),
            quarter: s.quarter(),
            offense_timeouts: s.offense_timeouts(),
            defense_timeouts: s.defense_timeouts(),
            home: u8::from(s.home()),
            team_strength_off: s.team_strength_off(),
            team_strength_def: s.team_strength_def(),
            wind_mph: s.wind_mph(),
            decision: record.decision.map(|c| c.label()),
            points: record.points,
        })?;
    }
    writer.flush()?;

    log::info!("✅ Wrote {} plays to {}", records.len(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::history::{generate_history, HistoryOptions};
    use crate::data::load_data::load_history_csv;

    #[test]
    fn test_saved_history_loads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history").join("plays.csv");
        let records = generate_history(&HistoryOptions {
            rows: 50,
            seed: 3,
            ..Default::default()
        })
        .unwrap();

        save_history_csv(&path, &records).unwrap();
        let loaded = load_history_csv(&path).unwrap();

        assert_eq!(loaded.len(), records.len());
        for (a, b) in records.iter().zip(&loaded) {
            assert_eq!(a.id, b.id);
            assert_eq!(a.state, b.state);
            assert_eq!(a.decision, b.decision);
        }
    }
}
