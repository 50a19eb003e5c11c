//! Model registry: atomic activation, bounded history and rollback.

pub mod model_registry;

pub use model_registry::{ModelRegistry, ModelStatus, RegistryConfig, RegistryEntry};
