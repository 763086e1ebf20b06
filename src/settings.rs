use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::application::resilience::RetryPolicy;
use crate::infrastructure::Credential;

/// Default filename used for configuration within the data directory.
const CONFIG_FILENAME: &str = "harvest.json";

pub const ENV_CONFIG: &str = "HARVEST_CONFIG";
pub const ENV_BIND_ADDR: &str = "HARVEST_BIND_ADDR";
pub const ENV_MODEL_DIR: &str = "HARVEST_MODEL_DIR";
pub const ENV_LOG: &str = "HARVEST_LOG";

/// Connection and resilience settings for one third-party upstream.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UpstreamSettings {
    pub url: String,
    /// API credential; sent as the `token_param` query parameter.
    #[serde(default)]
    pub token: Option<String>,
    pub token_param: String,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
}

impl UpstreamSettings {
    fn with_endpoint(url: &str, token_param: &str, cache_ttl_secs: u64) -> Self {
        Self {
            url: url.into(),
            token: None,
            token_param: token_param.into(),
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            timeout_ms: default_timeout_ms(),
            cache_ttl_secs,
        }
    }

    pub fn news() -> Self {
        Self::with_endpoint("https://newsdata.io/api/1", "apikey", default_cache_ttl_secs())
    }

    pub fn prices() -> Self {
        Self::with_endpoint(
            "https://api.data.gov.in/resource/9ef84268-d588-465a-a308-a864a43d0070",
            "api-key",
            3600,
        )
    }

    /// Generative-language endpoint used for crop planning. Replies are slow
    /// and billed, so attempts get longer and results live longer.
    pub fn planner() -> Self {
        Self {
            timeout_ms: 30_000,
            ..Self::with_endpoint(
                "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.0-flash:generateContent",
                "key",
                3600,
            )
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_attempts,
            Duration::from_millis(self.base_delay_ms),
            Duration::from_millis(self.timeout_ms),
        )
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn credential(&self) -> Option<Credential> {
        self.token
            .as_deref()
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .map(|token| Credential::new(&self.token_param, token))
    }

    /// Apply `HARVEST_<PREFIX>_*` overrides.
    fn apply_overrides(&mut self, prefix: &str, lookup: &impl Fn(&str) -> Option<String>) {
        let key = |suffix: &str| format!("HARVEST_{prefix}_{suffix}");

        if let Some(url) = lookup(&key("URL")).filter(|v| !v.trim().is_empty()) {
            self.url = url.trim().to_string();
        }
        if let Some(token) = lookup(&key("TOKEN")) {
            self.token = Some(token);
        }
        override_parsed(&key("MAX_ATTEMPTS"), lookup, &mut self.max_attempts);
        override_parsed(&key("BASE_DELAY_MS"), lookup, &mut self.base_delay_ms);
        override_parsed(&key("TIMEOUT_MS"), lookup, &mut self.timeout_ms);
        override_parsed(&key("CACHE_TTL_SECS"), lookup, &mut self.cache_ttl_secs);
    }
}

/// Process-wide configuration, read once at start-up.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Settings {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,
    /// Directory holding the model artifacts. Defaults to `<data dir>/models`.
    #[serde(default)]
    pub model_dir: Option<PathBuf>,
    #[serde(default = "UpstreamSettings::news")]
    pub news: UpstreamSettings,
    #[serde(default = "UpstreamSettings::prices")]
    pub prices: UpstreamSettings,
    #[serde(default = "UpstreamSettings::planner")]
    pub planner: UpstreamSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            model_dir: None,
            news: UpstreamSettings::news(),
            prices: UpstreamSettings::prices(),
            planner: UpstreamSettings::planner(),
        }
    }
}

impl Settings {
    /// Read the JSON file (if any) and apply environment overrides.
    pub fn load() -> Result<Self> {
        let path = match std::env::var(ENV_CONFIG) {
            Ok(path) => PathBuf::from(path),
            Err(_) => resolve_data_dir()?.join(CONFIG_FILENAME),
        };
        let mut settings = Self::from_file(&path)?;
        settings.apply_overrides(|key| std::env::var(key).ok());
        Ok(settings)
    }

    /// Defaults when `path` does not exist; an unreadable file is an error.
    pub fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        let bytes =
            fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
        let settings = serde_json::from_slice(&bytes)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        info!(path = %path.display(), "config loaded");
        Ok(settings)
    }

    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        override_parsed(ENV_BIND_ADDR, &lookup, &mut self.bind_addr);
        if let Some(dir) = lookup(ENV_MODEL_DIR).filter(|v| !v.trim().is_empty()) {
            self.model_dir = Some(PathBuf::from(dir.trim()));
        }
        self.news.apply_overrides("NEWS", &lookup);
        self.prices.apply_overrides("PRICES", &lookup);
        self.planner.apply_overrides("PLANNER", &lookup);
    }

    pub fn model_dir(&self) -> Result<PathBuf> {
        match &self.model_dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(resolve_data_dir()?.join("models")),
        }
    }
}

/// Replace `target` with the parsed override, keeping it on parse failure.
fn override_parsed<T: FromStr>(
    key: &str,
    lookup: &impl Fn(&str) -> Option<String>,
    target: &mut T,
) {
    let Some(raw) = lookup(key) else {
        return;
    };
    match raw.trim().parse::<T>() {
        Ok(value) => *target = value,
        Err(_) => warn!(key, value = %raw, "ignoring invalid override"),
    }
}

pub fn resolve_data_dir() -> Result<PathBuf> {
    let dirs = directories::ProjectDirs::from("dev", "harvest", "Harvest")
        .ok_or_else(|| anyhow!("unable to determine OS data dir"))?;
    let dir = dirs.data_dir().to_path_buf();
    fs::create_dir_all(&dir).context("failed to create data directory")?;
    Ok(dir)
}

fn default_bind_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 5000))
}

const fn default_max_attempts() -> u32 {
    3
}

const fn default_base_delay_ms() -> u64 {
    500
}

const fn default_timeout_ms() -> u64 {
    10_000
}

const fn default_cache_ttl_secs() -> u64 {
    300
}
