// src/clients/http.rs
//! Typed HTTP clients for the external research APIs.
//!
//! Two auth schemes share one implementation: the index APIs (news, search) take an
//! `X-API-Key` header, the agent APIs (analysis, research) a Bearer token. Every attempt
//! is timed and produces exactly one [`CallRecord`].

use std::time::{Duration, Instant};

use metrics::counter;
use reqwest::Method;
use serde_json::Value;

use crate::clients::call_log::CallLogger;
use crate::error::CallError;
use crate::metrics::{API_CALLS_TOTAL, API_FAILURES_TOTAL};
use crate::types::{ApiType, CallRecord};

const USER_AGENT: &str = concat!("impact-pipeline/", env!("CARGO_PKG_VERSION"));

/// Build the shared connection pool used by both clients.
pub fn build_http(timeout: Duration) -> anyhow::Result<reqwest::Client> {
    let http = reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .connect_timeout(Duration::from_secs(10).min(timeout))
        .timeout(timeout)
        .build()?;
    Ok(http)
}

#[derive(Clone)]
pub enum Auth {
    /// `X-API-Key: <key>`
    ApiKey(String),
    /// `Authorization: Bearer <token>`
    Bearer(String),
}

impl std::fmt::Debug for Auth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print secrets; key length is enough for diagnostics.
        match self {
            Auth::ApiKey(k) => write!(f, "ApiKey(len={})", k.len()),
            Auth::Bearer(t) => write!(f, "Bearer(len={})", t.len()),
        }
    }
}

/// Successful response.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Value,
    pub latency_ms: f64,
}

#[derive(Clone, Debug)]
pub struct ApiClient {
    http: reqwest::Client,
    auth: Auth,
    log: CallLogger,
}

impl ApiClient {
    pub fn new(http: reqwest::Client, auth: Auth, log: CallLogger) -> Self {
        Self { http, auth, log }
    }

    /// Client for the `X-API-Key` APIs (news, search).
    pub fn with_api_key(http: reqwest::Client, key: impl Into<String>, log: CallLogger) -> Self {
        Self::new(http, Auth::ApiKey(key.into()), log)
    }

    /// Client for the Bearer-token APIs (analysis, research).
    pub fn with_bearer(http: reqwest::Client, token: impl Into<String>, log: CallLogger) -> Self {
        Self::new(http, Auth::Bearer(token.into()), log)
    }

    /// Perform one attempt. Non-2xx and transport failures come back as [`CallError`].
    pub async fn request(
        &self,
        api_type: ApiType,
        method: Method,
        url: &str,
        params: &[(&str, String)],
        json: Option<&Value>,
    ) -> Result<ApiResponse, CallError> {
        let started = Instant::now();
        let outcome = self.send(api_type, method, url, params, json).await;
        let latency_ms = started.elapsed().as_secs_f64() * 1_000.0;

        counter!(API_CALLS_TOTAL, "api" => api_type.as_str()).increment(1);
        let record = match &outcome {
            Ok((status, _)) => CallRecord::succeeded(api_type, url, *status, latency_ms),
            Err(e) => {
                counter!(API_FAILURES_TOTAL, "api" => api_type.as_str()).increment(1);
                CallRecord::failed(api_type, url, e.status_code, latency_ms, e.message.clone())
            }
        };
        self.log.record(record);

        tracing::debug!(
            api = %api_type,
            url,
            latency_ms,
            ok = outcome.is_ok(),
            "external call finished"
        );

        outcome.map(|(status, body)| ApiResponse {
            status,
            body,
            latency_ms,
        })
    }

    async fn send(
        &self,
        api_type: ApiType,
        method: Method,
        url: &str,
        params: &[(&str, String)],
        json: Option<&Value>,
    ) -> Result<(u16, Value), CallError> {
        let mut req = self.http.request(method, url);
        if !params.is_empty() {
            req = req.query(params);
        }
        if let Some(body) = json {
            req = req.json(body);
        }
        req = match &self.auth {
            Auth::ApiKey(key) => req.header("X-API-Key", key),
            Auth::Bearer(token) => req.bearer_auth(token),
        };

        let resp = req
            .send()
            .await
            .map_err(|e| CallError::network(api_type, url, e.to_string()))?;
        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| CallError::network(api_type, url, format!("reading body: {e}")))?;
        let body = serde_json::from_str::<Value>(&text).unwrap_or(Value::String(text));

        if status.is_success() {
            Ok((status.as_u16(), body))
        } else {
            Err(CallError::status(api_type, url, status.as_u16(), body))
        }
    }
}
