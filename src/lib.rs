use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use tracing::{info, warn};

pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod interfaces;
pub mod settings;

use application::resilience::{ResilientClient, RetryPolicy, TtlCache};
use application::services::{Advisor, Feed};
use application::{FeedService, PlanningService, PredictionService};
use infrastructure::{load_model_set, HttpFeedSource, HttpGuideSource};
use settings::{Settings, UpstreamSettings, ENV_LOG};

/// Everything the HTTP surface needs, built once at start-up.
pub struct AppHandles {
    pub settings: Settings,
    pub predictions: Arc<PredictionService>,
    pub feeds: Arc<FeedService>,
    pub planner: Arc<PlanningService>,
    pub model_dir: PathBuf,
}

/// Install the global subscriber. Filter comes from `HARVEST_LOG`
/// (default `info`); repeated calls are no-ops.
pub fn init_tracing() {
    static INIT: std::sync::OnceLock<()> = std::sync::OnceLock::new();

    let _ = INIT.get_or_init(|| {
        let filter = std::env::var(ENV_LOG).unwrap_or_else(|_| "info".into());
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .compact()
            .try_init();
    });
}

/// Load models and wire every upstream. Blocking: reads model artifacts.
pub fn build_environment(settings: Settings) -> Result<AppHandles> {
    let model_dir = settings
        .model_dir()
        .context("failed to resolve model directory")?;
    let predictions = Arc::new(PredictionService::new(load_model_set(&model_dir)));

    let unavailable = predictions.unavailable_models();
    if !unavailable.is_empty() {
        warn!(models = ?unavailable, dir = %model_dir.display(), "starting with models missing");
    }

    let feeds = Arc::new(FeedService::new(
        build_feed("news", &settings.news),
        build_feed("prices", &settings.prices),
    ));
    let planner = Arc::new(PlanningService::new(build_advisor(&settings.planner)));

    Ok(AppHandles {
        settings,
        predictions,
        feeds,
        planner,
        model_dir,
    })
}

/// `None` (endpoint answers 500) when the upstream has no URL.
fn build_feed<T>(name: &str, upstream: &UpstreamSettings) -> Option<Feed<T>>
where
    T: DeserializeOwned + Send + Sync + 'static,
{
    let policy = announce(name, upstream)?;
    let source = HttpFeedSource::new(
        upstream.url.trim(),
        upstream.credential(),
        policy.timeout_per_attempt(),
    );
    Some(Feed::new(
        Arc::new(source),
        ResilientClient::new(name, policy, TtlCache::new(upstream.cache_ttl())),
    ))
}

fn build_advisor(upstream: &UpstreamSettings) -> Option<Advisor> {
    let policy = announce("planner", upstream)?;
    let source = HttpGuideSource::new(
        upstream.url.trim(),
        upstream.credential(),
        policy.timeout_per_attempt(),
    );
    Some(Advisor::new(
        Arc::new(source),
        ResilientClient::new("planner", policy, TtlCache::new(upstream.cache_ttl())),
    ))
}

/// Log how an upstream is configured; `None` when it has no URL.
fn announce(name: &str, upstream: &UpstreamSettings) -> Option<RetryPolicy> {
    if upstream.url.trim().is_empty() {
        warn!(upstream = name, "no URL configured; endpoints disabled");
        return None;
    }
    if upstream.credential().is_none() {
        warn!(upstream = name, "no credential configured; upstream may reject calls");
    }

    let policy = upstream.retry_policy();
    info!(
        upstream = name,
        url = %upstream.url,
        max_attempts = policy.max_attempts(),
        worst_case_ms = policy.worst_case_duration().as_millis() as u64,
        "upstream configured"
    );
    Some(policy)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_url_disables_only_that_feed() {
        let dir = std::env::temp_dir().join(format!("harvest-env-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();

        let mut settings = Settings::default();
        settings.model_dir = Some(dir.clone());
        settings.prices.url = String::new();
        settings.planner.url = "  ".into();

        let handles = build_environment(settings).unwrap();
        assert_eq!(handles.feeds.unconfigured_feeds(), vec!["prices"]);
        assert!(!handles.planner.is_configured());
        assert_eq!(handles.predictions.unavailable_models().len(), 3);
        assert_eq!(handles.model_dir, dir);

        std::fs::remove_dir_all(dir).ok();
    }
}
