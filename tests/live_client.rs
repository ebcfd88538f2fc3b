// tests/live_client.rs
//
// Live data source against a local axum server playing the external APIs.
//
// Covered:
// - auth headers and query params reach the APIs
// - one CallRecord per attempt; usage counts successful calls once
// - cache hits skip the network, the call log and the usage counters
// - analysis is never cached
// - an unavailable cache backend behaves like no cache
// - status-aware retry stops on 4xx

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};

use impact_pipeline::clients::{
    build_http, ApiClient, CacheBackend, CacheError, CacheTtls, CallLogger, ExponentialRetry,
    MemoryCache, MemoryCallLogStore, ResponseCache, RetryPolicy,
};
use impact_pipeline::sources::live::{Endpoints, QueryOptions};
use impact_pipeline::{ApiType, ImpactPipeline, LiveDataSource, PipelineError};

const KEY: &str = "test-key";

#[derive(Clone)]
struct Mock {
    news_hits: Arc<AtomicUsize>,
    search_hits: Arc<AtomicUsize>,
    analysis_hits: Arc<AtomicUsize>,
    research_hits: Arc<AtomicUsize>,
    /// Remaining news requests to fail with `fail_status`.
    fail_news: Arc<AtomicUsize>,
    fail_status: u16,
}

impl Mock {
    fn new(fail_news: usize, fail_status: u16) -> Self {
        Self {
            news_hits: Arc::default(),
            search_hits: Arc::default(),
            analysis_hits: Arc::default(),
            research_hits: Arc::default(),
            fail_news: Arc::new(AtomicUsize::new(fail_news)),
            fail_status,
        }
    }
}

fn has_api_key(headers: &HeaderMap) -> bool {
    headers.get("x-api-key").and_then(|v| v.to_str().ok()) == Some(KEY)
}

fn has_bearer(headers: &HeaderMap) -> bool {
    headers.get("authorization").and_then(|v| v.to_str().ok()) == Some("Bearer test-key")
}

async fn news(
    State(m): State<Mock>,
    headers: HeaderMap,
    Query(q): Query<HashMap<String, String>>,
) -> (StatusCode, Json<Value>) {
    m.news_hits.fetch_add(1, Ordering::SeqCst);
    if !has_api_key(&headers) {
        return (StatusCode::UNAUTHORIZED, Json(json!({"error": "bad key"})));
    }
    if !q.contains_key("q") || q.get("count").map(String::as_str) != Some("10") {
        return (StatusCode::BAD_REQUEST, Json(json!({"error": "missing params"})));
    }
    let fail = m
        .fail_news
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok();
    if fail {
        let status = StatusCode::from_u16(m.fail_status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        return (status, Json(json!({"error": "boom"})));
    }
    (
        StatusCode::OK,
        Json(json!({"news": {"results": [
            {"title": "Acme ships v2", "url": "https://techcrunch.com/acme-v2", "description": "launch"},
            {"title": "Acme blog", "url": "https://acme.io/blog", "description": "post"}
        ]}})),
    )
}

async fn search(
    State(m): State<Mock>,
    headers: HeaderMap,
    Query(q): Query<HashMap<String, String>>,
) -> (StatusCode, Json<Value>) {
    m.search_hits.fetch_add(1, Ordering::SeqCst);
    if !has_api_key(&headers) || !q.contains_key("query") || !q.contains_key("safesearch") {
        return (StatusCode::BAD_REQUEST, Json(json!({"error": "bad request"})));
    }
    (
        StatusCode::OK,
        Json(json!({"results": {"web": [
            {"title": "Acme - Wikipedia", "url": "https://en.wikipedia.org/wiki/Acme", "description": "history"}
        ]}})),
    )
}

async fn analysis(
    State(m): State<Mock>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    m.analysis_hits.fetch_add(1, Ordering::SeqCst);
    if !has_bearer(&headers) || body["agent"] != "express" {
        return (StatusCode::UNAUTHORIZED, Json(json!({"error": "bad auth"})));
    }
    let reply = json!({
        "risk_score": 88,
        "risk_level": "critical",
        "impact_areas": [{"area": "Product", "impact_score": 90, "description": "v2"}],
        "key_insights": ["Acme shipped v2"],
        "recommended_actions": ["Accelerate product parity work"],
        "confidence_score": 70,
        "reasoning": "launch coverage"
    });
    (
        StatusCode::OK,
        Json(json!({"output": [{"type": "message.answer", "text": format!("```json\n{reply}\n```")}]})),
    )
}

async fn research(
    State(m): State<Mock>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    m.research_hits.fetch_add(1, Ordering::SeqCst);
    if !has_bearer(&headers) || body["input"].as_str().unwrap_or_default().is_empty() {
        return (StatusCode::UNAUTHORIZED, Json(json!({"error": "bad request"})));
    }
    (
        StatusCode::OK,
        Json(json!({"output": [{"text": "report", "citations": ["https://random-blog.io/acme"]}]})),
    )
}

async fn spawn_mock(mock: Mock) -> String {
    let app = Router::new()
        .route("/livenews", get(news))
        .route("/search", get(search))
        .route("/agents/analysis", post(analysis))
        .route("/agents/research", post(research))
        .with_state(mock);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

fn fast_retry() -> ExponentialRetry {
    ExponentialRetry::new(3, Duration::from_millis(1), Duration::from_millis(5))
}

fn live_source(
    base: &str,
    log: CallLogger,
    cache: ResponseCache,
    retry: Arc<dyn RetryPolicy>,
) -> LiveDataSource {
    let http = build_http(Duration::from_secs(5)).unwrap();
    let endpoints = Endpoints {
        news: format!("{base}/livenews"),
        search: format!("{base}/search"),
        analysis: format!("{base}/agents/analysis"),
        research: format!("{base}/agents/research"),
    };
    LiveDataSource::new(
        ApiClient::with_api_key(http.clone(), KEY, log.clone()),
        ApiClient::with_bearer(http, KEY, log),
        cache,
        retry,
        endpoints,
        QueryOptions::default(),
    )
}

struct DownBackend;

#[async_trait]
impl CacheBackend for DownBackend {
    async fn get(&self, _key: &str) -> Result<Option<String>, CacheError> {
        Err(CacheError::Unavailable("connection refused".into()))
    }
    async fn set_ex(&self, _key: &str, _value: String, _ttl: u64) -> Result<(), CacheError> {
        Err(CacheError::Unavailable("connection refused".into()))
    }
}

#[tokio::test]
async fn retries_are_logged_per_attempt_and_cache_hits_are_free() {
    let mock = Mock::new(1, 500);
    let base = spawn_mock(mock.clone()).await;

    let store = Arc::new(MemoryCallLogStore::new());
    let log = CallLogger::spawn(store.clone(), 64);
    let cache = ResponseCache::new(Arc::new(MemoryCache::new()), "impact", CacheTtls::default());
    let source = live_source(&base, log.clone(), cache, Arc::new(fast_retry()));
    let pipeline = ImpactPipeline::new(Arc::new(source)).with_call_log(log);

    // First run: everything misses, news fails once then succeeds.
    let card = pipeline.generate("Acme", &[]).await.unwrap();
    pipeline.flush_logs().await;

    assert_eq!(card.risk_score, 88);
    assert!(card.requires_review, "88 with credibility below 0.8 needs review");
    assert_eq!(card.api_usage.news_calls, 1);
    assert_eq!(card.api_usage.search_calls, 1);
    assert_eq!(card.api_usage.analysis_calls, 1);
    assert_eq!(card.api_usage.research_calls, 1);
    assert_eq!(card.api_usage.cache_hits, 0);

    let records = store.records();
    assert_eq!(records.len(), 5);
    let news: Vec<_> = records.iter().filter(|r| r.api_type == ApiType::News).collect();
    assert_eq!(news.len(), 2);
    assert!(!news[0].success);
    assert_eq!(news[0].status_code, Some(500));
    assert!(news[1].success);
    assert!(records.iter().all(|r| r.latency_ms >= 0.0));

    // Second run: news/search/research come from the cache, analysis does not.
    let card = pipeline.generate("Acme", &[]).await.unwrap();
    pipeline.flush_logs().await;

    assert_eq!(card.api_usage.total_calls(), 1);
    assert_eq!(card.api_usage.analysis_calls, 1);
    assert_eq!(card.api_usage.cache_hits, 3);
    assert_eq!(store.records().len(), 6);
    assert_eq!(mock.news_hits.load(Ordering::SeqCst), 2);
    assert_eq!(mock.search_hits.load(Ordering::SeqCst), 1);
    assert_eq!(mock.research_hits.load(Ordering::SeqCst), 1);
    assert_eq!(mock.analysis_hits.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn unavailable_cache_behaves_like_no_cache() {
    let mock = Mock::new(0, 500);
    let base = spawn_mock(mock.clone()).await;

    let cache = ResponseCache::new(Arc::new(DownBackend), "impact", CacheTtls::default());
    let source = live_source(&base, CallLogger::disabled(), cache, Arc::new(fast_retry()));
    let pipeline = ImpactPipeline::new(Arc::new(source));

    for _ in 0..2 {
        let card = pipeline.generate("Acme", &[]).await.unwrap();
        assert_eq!(card.api_usage.total_calls(), 4);
        assert_eq!(card.api_usage.cache_hits, 0);
    }
    assert_eq!(mock.news_hits.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn client_errors_are_retried_by_default() {
    let mock = Mock::new(usize::MAX, 404);
    let base = spawn_mock(mock.clone()).await;

    let store = Arc::new(MemoryCallLogStore::new());
    let log = CallLogger::spawn(store.clone(), 64);
    let source = live_source(&base, log.clone(), ResponseCache::disabled(), Arc::new(fast_retry()));
    let pipeline = ImpactPipeline::new(Arc::new(source)).with_call_log(log);

    let err = pipeline.generate("Acme", &[]).await.unwrap_err();
    pipeline.flush_logs().await;

    assert_eq!(err.status_code(), Some(404));
    assert_eq!(mock.news_hits.load(Ordering::SeqCst), 3);
    assert_eq!(store.records().len(), 3);
    assert!(store.records().iter().all(|r| !r.success));
}

#[tokio::test]
async fn status_aware_policy_stops_on_client_errors() {
    let mock = Mock::new(usize::MAX, 404);
    let base = spawn_mock(mock.clone()).await;

    let retry = Arc::new(fast_retry().skip_client_errors());
    let source = live_source(&base, CallLogger::disabled(), ResponseCache::disabled(), retry);
    let pipeline = ImpactPipeline::new(Arc::new(source));

    let err = pipeline.generate("Acme", &[]).await.unwrap_err();

    assert!(matches!(err, PipelineError::ApiCall { api_type: ApiType::News, .. }));
    assert_eq!(mock.news_hits.load(Ordering::SeqCst), 1);
    assert_eq!(mock.search_hits.load(Ordering::SeqCst), 0);
}
