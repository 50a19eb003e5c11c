//! Offline training: configuration, deterministic split, fitting and evaluation.

pub mod cancel;
pub mod config;
pub mod session;
pub mod trainer;

pub use cancel::CancellationToken;
pub use config::{QualityFloor, TrainingConfig, TrainingConfigBuilder, TrainingOptions};
pub use session::{run_training, HistorySource, SessionReport};
pub use trainer::{split_examples, ActivationStatus, Trainer, TrainingResult};
