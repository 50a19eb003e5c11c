pub mod dataset;
pub mod history;
pub mod load_data;
pub mod save_data;

pub use dataset::{HistoricalRecord, Outcome, TrainingDataset, TrainingExample};
pub use history::{generate_history, HistoryOptions};
pub use load_data::load_history_csv;
pub use save_data::save_history_csv;
