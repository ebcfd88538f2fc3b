// src/clients/cache.rs
//! Read-through response cache.
//!
//! Keys look like `<namespace>:<api>:<query>[:<params digest>]`, where the query is
//! lowercased and spaces become colons. Each API has its own TTL; the analysis call is
//! never cached.
//!
//! Every backend error (connection refused, bad payload) is logged and treated as a miss,
//! so the pipeline behaves the same with the cache fully unavailable.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use metrics::counter;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde_json::Value;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::sync::OnceCell;

use crate::metrics::{CACHE_HITS_TOTAL, CACHE_MISSES_TOTAL};
use crate::types::ApiType;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache backend unavailable: {0}")]
    Unavailable(String),
    #[error("cache payload could not be (de)serialized: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<redis::RedisError> for CacheError {
    fn from(e: redis::RedisError) -> Self {
        CacheError::Unavailable(e.to_string())
    }
}

/// Key–value store with GET/SETEX semantics.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;
    async fn set_ex(&self, key: &str, value: String, ttl_secs: u64) -> Result<(), CacheError>;
}

/// Upper bound for connecting and for each command.
pub const REDIS_OP_TIMEOUT: Duration = Duration::from_secs(2);

/// Redis backend. The connection manager is created lazily; a failed connect is retried
/// on the next access, and a dropped connection is re-established by the manager, so a
/// Redis that comes up later or restarts is picked up without a process restart.
pub struct RedisCache {
    client: redis::Client,
    conn: OnceCell<ConnectionManager>,
    timeout: Duration,
}

impl RedisCache {
    pub fn open(url: &str) -> Result<Self, CacheError> {
        let client = redis::Client::open(url)?;
        Ok(Self {
            client,
            conn: OnceCell::new(),
            timeout: REDIS_OP_TIMEOUT,
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn connection(&self) -> Result<ConnectionManager, CacheError> {
        let conn = self
            .conn
            .get_or_try_init(|| async {
                bounded(self.timeout, ConnectionManager::new(self.client.clone())).await
            })
            .await?;
        Ok(conn.clone())
    }
}

async fn bounded<T, F>(limit: Duration, fut: F) -> Result<T, CacheError>
where
    F: std::future::Future<Output = redis::RedisResult<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(res) => Ok(res?),
        Err(_) => Err(CacheError::Unavailable(format!(
            "redis did not answer within {}ms",
            limit.as_millis()
        ))),
    }
}

#[async_trait]
impl CacheBackend for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut conn = self.connection().await?;
        bounded(self.timeout, conn.get::<_, Option<String>>(key)).await
    }

    async fn set_ex(&self, key: &str, value: String, ttl_secs: u64) -> Result<(), CacheError> {
        let mut conn = self.connection().await?;
        bounded(self.timeout, conn.set_ex::<_, _, ()>(key, value, ttl_secs)).await
    }
}

/// In-process backend with absolute TTLs (no sliding refresh).
#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, (String, Instant)>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|g| g.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CacheBackend for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| CacheError::Unavailable("memory cache mutex poisoned".into()))?;
        match entries.get(key) {
            Some((value, expires)) if *expires > Instant::now() => Ok(Some(value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set_ex(&self, key: &str, value: String, ttl_secs: u64) -> Result<(), CacheError> {
        let now = Instant::now();
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| CacheError::Unavailable("memory cache mutex poisoned".into()))?;
        entries.retain(|_, (_, expires)| *expires > now);
        entries.insert(key.to_string(), (value, now + Duration::from_secs(ttl_secs)));
        Ok(())
    }
}

/// Per-API TTLs in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheTtls {
    pub news: u64,
    pub search: u64,
    pub research: u64,
}

impl Default for CacheTtls {
    fn default() -> Self {
        Self {
            news: 1800,
            search: 3600,
            research: 7200,
        }
    }
}

impl CacheTtls {
    /// `None` means the API is never cached.
    pub fn for_api(&self, api: ApiType) -> Option<u64> {
        match api {
            ApiType::News => Some(self.news),
            ApiType::Search => Some(self.search),
            ApiType::Research => Some(self.research),
            ApiType::Analysis => None,
        }
    }
}

/// Build a cache key. `params` are reduced to a short digest so keys stay bounded.
pub fn cache_key(namespace: &str, api: ApiType, query: &str, params: &[(&str, String)]) -> String {
    let normalized = query.trim().to_lowercase().replace(' ', ":");
    let mut key = format!("{namespace}:{}:{normalized}", api.as_str());
    if !params.is_empty() {
        let mut pairs: Vec<String> = params.iter().map(|(k, v)| format!("{k}={v}")).collect();
        pairs.sort();
        let digest = Sha256::digest(pairs.join("&").as_bytes());
        let hex: String = digest.iter().take(6).map(|b| format!("{b:02x}")).collect();
        key.push(':');
        key.push_str(&hex);
    }
    key
}

/// Cache front used by the live data source. Without a backend every lookup misses and
/// every write is skipped.
#[derive(Clone)]
pub struct ResponseCache {
    backend: Option<Arc<dyn CacheBackend>>,
    namespace: String,
    ttls: CacheTtls,
}

impl ResponseCache {
    pub fn new(backend: Arc<dyn CacheBackend>, namespace: impl Into<String>, ttls: CacheTtls) -> Self {
        Self {
            backend: Some(backend),
            namespace: namespace.into(),
            ttls,
        }
    }

    pub fn disabled() -> Self {
        Self {
            backend: None,
            namespace: "impact".to_string(),
            ttls: CacheTtls::default(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.backend.is_some()
    }

    pub fn key(&self, api: ApiType, query: &str, params: &[(&str, String)]) -> String {
        cache_key(&self.namespace, api, query, params)
    }

    /// Look up a cached payload. Errors degrade to `None`.
    pub async fn get_json(&self, api: ApiType, key: &str) -> Option<Value> {
        let backend = self.backend.as_ref()?;
        self.ttls.for_api(api)?;

        let found = match backend.get(key).await {
            Ok(Some(raw)) => match serde_json::from_str::<Value>(&raw) {
                Ok(v) => Some(v),
                Err(e) => {
                    tracing::warn!(key, error = %CacheError::from(e), "ignoring unreadable cache entry");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(key, error = %e, "cache read failed, treating as miss");
                None
            }
        };

        if found.is_some() {
            tracing::debug!(api = %api, key, "cache hit");
            counter!(CACHE_HITS_TOTAL, "api" => api.as_str()).increment(1);
        } else {
            tracing::debug!(api = %api, key, "cache miss");
            counter!(CACHE_MISSES_TOTAL, "api" => api.as_str()).increment(1);
        }
        found
    }

    /// Store a payload with the API's TTL. Errors are logged and dropped.
    pub async fn put_json(&self, api: ApiType, key: &str, value: &Value) {
        let (Some(backend), Some(ttl)) = (self.backend.as_ref(), self.ttls.for_api(api)) else {
            return;
        };
        let raw = match serde_json::to_string(value) {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(key, error = %e, "cache payload not serializable");
                return;
            }
        };
        if let Err(e) = backend.set_ex(key, raw, ttl).await {
            tracing::warn!(key, error = %e, "cache write failed");
        }
    }
}
