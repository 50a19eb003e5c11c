pub mod game_state;
pub mod play_call;

pub use game_state::{GameState, GameStateBuilder, GameStatePayload, ValidationError};
pub use play_call::PlayCall;
