// src/config/pipeline.rs
use serde::{Deserialize, Serialize};
use std::{env, fs, path::Path, time::Duration};

use anyhow::Context;

use crate::clients::{CacheTtls, ExponentialRetry};
use crate::notify::NotificationRule;
use crate::sources::live::{Endpoints, QueryOptions};

pub const DEFAULT_CONFIG_PATH: &str = "config/pipeline.toml";
pub const ENV_CONFIG_PATH: &str = "IMPACT_CONFIG_PATH";
pub const ENV_DEMO_MODE: &str = "DEMO_MODE";
pub const ENV_API_KEY: &str = "YOU_API_KEY";
pub const ENV_REDIS_URL: &str = "REDIS_URL";
pub const ENV_PROGRESS_ROOM: &str = "IMPACT_PROGRESS_ROOM";

/// `1|true|yes|on` → `Some(true)`, `0|false|no|off` → `Some(false)`, anything else → `None`.
pub fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Process-wide demo switch from `DEMO_MODE`, if set to a recognizable value.
pub fn demo_mode_from_env() -> Option<bool> {
    env::var(ENV_DEMO_MODE).ok().as_deref().and_then(parse_flag)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointsConfig {
    pub news: String,
    pub search: String,
    pub analysis: String,
    pub research: String,
}

impl Default for EndpointsConfig {
    fn default() -> Self {
        let e = Endpoints::default();
        Self {
            news: e.news,
            search: e.search,
            analysis: e.analysis,
            research: e.research,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    /// `false` switches to the status-aware policy that never retries 4xx.
    pub retry_client_errors: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1_000,
            max_delay_ms: 10_000,
            retry_client_errors: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub namespace: String,
    /// No URL means in-process memory cache.
    pub redis_url: Option<String>,
    pub news_ttl_secs: u64,
    pub search_ttl_secs: u64,
    pub research_ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        let ttls = CacheTtls::default();
        Self {
            enabled: true,
            namespace: "impact".to_string(),
            redis_url: None,
            news_ttl_secs: ttls.news,
            search_ttl_secs: ttls.search,
            research_ttl_secs: ttls.research,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NewsConfig {
    pub count: u32,
}

impl Default for NewsConfig {
    fn default() -> Self {
        Self { count: 10 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub num_web_results: u32,
    pub safesearch: String,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            num_web_results: 10,
            safesearch: "moderate".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CallLogConfig {
    pub path: String,
    pub channel_capacity: usize,
}

impl Default for CallLogConfig {
    fn default() -> Self {
        Self {
            path: "logs/api_calls.jsonl".to_string(),
            channel_capacity: 256,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProgressConfig {
    pub room: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    /// Post fired rules to `slack`/`discord` webhook targets.
    pub deliver_webhooks: bool,
    pub webhook_timeout_secs: u64,
    pub webhook_retries: u8,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            deliver_webhooks: false,
            webhook_timeout_secs: 5,
            webhook_retries: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub demo_mode: bool,
    /// "ENV" means: read from YOU_API_KEY.
    pub api_key: String,
    pub request_timeout_secs: u64,
    pub endpoints: EndpointsConfig,
    pub retry: RetryConfig,
    pub cache: CacheConfig,
    pub news: NewsConfig,
    pub search: SearchConfig,
    pub call_log: CallLogConfig,
    pub progress: ProgressConfig,
    pub notify: NotifyConfig,
    /// Seed for the in-memory rule store.
    pub rules: Vec<NotificationRule>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            demo_mode: false,
            api_key: "ENV".to_string(),
            request_timeout_secs: 60,
            endpoints: EndpointsConfig::default(),
            retry: RetryConfig::default(),
            cache: CacheConfig::default(),
            news: NewsConfig::default(),
            search: SearchConfig::default(),
            call_log: CallLogConfig::default(),
            progress: ProgressConfig::default(),
            notify: NotifyConfig::default(),
            rules: Vec::new(),
        }
    }
}

impl PipelineConfig {
    /// Load from `IMPACT_CONFIG_PATH` or `config/pipeline.toml`, then apply env overrides.
    pub fn load() -> anyhow::Result<Self> {
        let path = env::var(ENV_CONFIG_PATH).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load_from_file(path)
    }

    /// A missing file yields defaults; an unreadable or invalid one is an error.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let mut cfg = if path.exists() {
            let data = fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            Self::from_toml_str(&data).with_context(|| format!("parsing {}", path.display()))?
        } else {
            tracing::debug!(path = %path.display(), "config file not found, using defaults");
            Self::default()
        };
        cfg.apply_env();
        cfg.sanitize();
        Ok(cfg)
    }

    /// Parse without env overrides.
    pub fn from_toml_str(s: &str) -> anyhow::Result<Self> {
        let mut cfg: PipelineConfig = toml::from_str(s)?;
        cfg.sanitize();
        Ok(cfg)
    }

    pub fn apply_env(&mut self) {
        if let Some(demo) = demo_mode_from_env() {
            self.demo_mode = demo;
        }
        if let Ok(url) = env::var(ENV_REDIS_URL) {
            if !url.trim().is_empty() {
                self.cache.redis_url = Some(url.trim().to_string());
            }
        }
        if let Ok(room) = env::var(ENV_PROGRESS_ROOM) {
            if !room.trim().is_empty() {
                self.progress.room = Some(room.trim().to_string());
            }
        }
    }

    pub fn sanitize(&mut self) {
        if self.retry.max_attempts == 0 {
            self.retry.max_attempts = 1;
        }
        if self.retry.max_delay_ms < self.retry.base_delay_ms {
            self.retry.max_delay_ms = self.retry.base_delay_ms;
        }
        if self.request_timeout_secs == 0 {
            self.request_timeout_secs = 60;
        }
        if self.call_log.channel_capacity == 0 {
            self.call_log.channel_capacity = CallLogConfig::default().channel_capacity;
        }
        if self.cache.namespace.trim().is_empty() {
            self.cache.namespace = CacheConfig::default().namespace;
        }
        self.search.safesearch = self.search.safesearch.trim().to_ascii_lowercase();
        if !matches!(self.search.safesearch.as_str(), "off" | "moderate" | "strict") {
            self.search.safesearch = SearchConfig::default().safesearch;
        }
    }

    /// Resolve the API key, reading `YOU_API_KEY` when the file says "ENV".
    pub fn resolved_api_key(&self) -> anyhow::Result<String> {
        if self.api_key.trim().eq_ignore_ascii_case("env") {
            let key = env::var(ENV_API_KEY)
                .map_err(|_| anyhow::anyhow!("Missing {ENV_API_KEY} env var"))?;
            if key.trim().is_empty() {
                anyhow::bail!("{ENV_API_KEY} is empty");
            }
            return Ok(key.trim().to_string());
        }
        if self.api_key.trim().is_empty() {
            anyhow::bail!("api_key is empty");
        }
        Ok(self.api_key.trim().to_string())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn retry_policy(&self) -> ExponentialRetry {
        let policy = ExponentialRetry::new(
            self.retry.max_attempts,
            Duration::from_millis(self.retry.base_delay_ms),
            Duration::from_millis(self.retry.max_delay_ms),
        );
        if self.retry.retry_client_errors {
            policy
        } else {
            policy.skip_client_errors()
        }
    }

    pub fn cache_ttls(&self) -> CacheTtls {
        CacheTtls {
            news: self.cache.news_ttl_secs,
            search: self.cache.search_ttl_secs,
            research: self.cache.research_ttl_secs,
        }
    }

    pub fn endpoints(&self) -> Endpoints {
        Endpoints {
            news: self.endpoints.news.clone(),
            search: self.endpoints.search.clone(),
            analysis: self.endpoints.analysis.clone(),
            research: self.endpoints.research.clone(),
        }
    }

    pub fn query_options(&self) -> QueryOptions {
        QueryOptions {
            news_count: self.news.count,
            num_web_results: self.search.num_web_results,
            safesearch: self.search.safesearch.clone(),
        }
    }
}
