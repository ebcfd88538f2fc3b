// src/clients/mod.rs
//! Everything that wraps an external call: HTTP clients, retry policy, response cache
//! and the call log.

pub mod cache;
pub mod call_log;
pub mod http;
pub mod retry;

pub use cache::{cache_key, CacheBackend, CacheError, CacheTtls, MemoryCache, RedisCache, ResponseCache};
pub use call_log::{CallLogStore, CallLogger, JsonlCallLogStore, MemoryCallLogStore};
pub use http::{build_http, ApiClient, ApiResponse, Auth};
pub use retry::{run_with_retry, ExponentialRetry, RetryPolicy};
