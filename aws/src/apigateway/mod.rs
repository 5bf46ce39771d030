//! API Gateway resource kinds

pub mod api_key;

pub use api_key::{ApiKey, ApiKeyOps, StageKey};
