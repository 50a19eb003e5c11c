//! Feature schema v1.
//!
//! The layout below is the contract between trained artifacts and the
//! serving path. Every artifact records the schema version it was fitted
//! on and cannot be activated or scored against any other version.
//!
//! ### Layout (v1)
//! | idx | name                  | encoding                                   |
//! |-----|-----------------------|--------------------------------------------|
//! | 0   | down                  | (down - 1) / 3                             |
//! | 1   | distance              | yards to go / 10                           |
//! | 2   | field_position        | yards to the goal line / 100               |
//! | 3   | score_diff            | score differential / SCORE_NORM            |
//! | 4   | time_remaining        | seconds / 3600                             |
//! | 5   | quarter               | (quarter - 1) / 4                          |
//! | 6   | offense_timeouts      | timeouts / 3                               |
//! | 7   | defense_timeouts      | timeouts / 3                               |
//! | 8   | home                  | 1.0 at home, else 0.0                      |
//! | 9   | team_strength_off     | raw rating, 0.0 when unknown               |
//! | 10  | team_strength_def     | raw rating, 0.0 when unknown               |
//! | 11  | wind                  | mph / WIND_NORM, 0.0 when unknown          |
//! | 12  | in_field_goal_range   | 1.0 if kick distance <= FG_RANGE_YARDS     |
//! | 13  | short_yardage         | 1.0 if distance <= 2                       |
//! | 14  | score_time_pressure   | score_diff / SCORE_NORM * (1 - time/3600)  |
//! | 15  | goal_to_go            | 1.0 if distance == field_position          |
//!
//! Total: FEATURE_COUNT = 16.

/// Increment this whenever the feature layout or scaling changes.
pub const FEATURE_SCHEMA_VERSION: u32 = 1;

/// Feature vector length for schema v1.
pub const FEATURE_COUNT: usize = 16;

pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "down",
    "distance",
    "field_position",
    "score_diff",
    "time_remaining",
    "quarter",
    "offense_timeouts",
    "defense_timeouts",
    "home",
    "team_strength_off",
    "team_strength_def",
    "wind",
    "in_field_goal_range",
    "short_yardage",
    "score_time_pressure",
    "goal_to_go",
];

/// Four touchdowns
pub const SCORE_NORM: f64 = 28.0;

pub const WIND_NORM: f64 = 20.0;

/// Longest kick treated as makeable
pub const FG_RANGE_YARDS: u8 = 57;

/// Position of a named feature in the vector.
pub fn feature_index(name: &str) -> Option<usize> {
    FEATURE_NAMES.iter().position(|n| *n == name)
}
