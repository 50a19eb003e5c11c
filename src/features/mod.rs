//! Feature schema + canonical extraction shared by training and serving.

pub mod extractor;
pub mod schema;

pub use extractor::{extract, extract_batch, FeatureVector};
pub use schema::{FEATURE_COUNT, FEATURE_NAMES, FEATURE_SCHEMA_VERSION};
