//! Infrastructure layer wiring concrete adapters (HTTP upstreams, model artifacts).

pub mod http_client;
pub mod models;

pub use http_client::{Credential, HttpFeedSource, HttpGuideSource};
pub use models::{load_model_set, CentroidClassifier, LinearRegressor};
