// Modules for server components
pub mod api_error;
pub mod decision_api;
pub mod latency;
pub mod response_cache;

// Re-export public APIs
pub use api_error::{ApiError, ApiFailure};
pub use decision_api::{create_router, ApiState, DecisionApiConfig, DecisionApiServer};
pub use latency::{MetricsSnapshot, ServiceMetrics};
pub use response_cache::ResponseCache;
