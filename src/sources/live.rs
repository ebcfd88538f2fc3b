// src/sources/live.rs
//! Live data source: real HTTP calls wrapped in cache → retry → call log.
//!
//! Order per logical call:
//! 1) cache lookup (hit returns immediately, no usage increment, no call record)
//! 2) network call under the retry policy (one call record per attempt)
//! 3) usage increment after success, then cache write with the API's TTL

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Method;
use serde_json::{json, Value};

use crate::clients::{run_with_retry, ApiClient, ResponseCache, RetryPolicy};
use crate::error::PipelineError;
use crate::sources::{AgentReply, DataSource, NewsPayload, ResearchPayload, SearchPayload};
use crate::types::{ApiType, ApiUsage};

/// Agent used for both the analysis and the research call.
pub const AGENT_NAME: &str = "express";

#[derive(Debug, Clone)]
pub struct Endpoints {
    pub news: String,
    pub search: String,
    pub analysis: String,
    pub research: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            news: "https://api.ydc-index.io/livenews".to_string(),
            search: "https://api.ydc-index.io/v1/search".to_string(),
            analysis: "https://api.you.com/v1/agents/runs".to_string(),
            research: "https://api.you.com/v1/agents/runs".to_string(),
        }
    }
}

/// Query knobs for the index APIs.
#[derive(Debug, Clone)]
pub struct QueryOptions {
    pub news_count: u32,
    pub num_web_results: u32,
    pub safesearch: String,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            news_count: 10,
            num_web_results: 10,
            safesearch: "moderate".to_string(),
        }
    }
}

pub struct LiveDataSource {
    /// `X-API-Key` client (news, search).
    index: ApiClient,
    /// Bearer client (analysis, research).
    agents: ApiClient,
    cache: ResponseCache,
    retry: Arc<dyn RetryPolicy>,
    endpoints: Endpoints,
    options: QueryOptions,
}

impl LiveDataSource {
    pub fn new(
        index: ApiClient,
        agents: ApiClient,
        cache: ResponseCache,
        retry: Arc<dyn RetryPolicy>,
        endpoints: Endpoints,
        options: QueryOptions,
    ) -> Self {
        Self {
            index,
            agents,
            cache,
            retry,
            endpoints,
            options,
        }
    }

    /// Cached GET against an index API. The query goes out as `query_param`; `extra`
    /// params become the key's digest suffix.
    async fn cached_get(
        &self,
        api: ApiType,
        url: &str,
        query_param: &'static str,
        query: &str,
        extra: Vec<(&'static str, String)>,
        usage: &mut ApiUsage,
    ) -> Result<Value, PipelineError> {
        let key = self.cache.key(api, query, &extra);
        if let Some(hit) = self.cache.get_json(api, &key).await {
            usage.record_cache_hit();
            return Ok(hit);
        }

        let mut params = Vec::with_capacity(extra.len() + 1);
        params.push((query_param, query.to_string()));
        params.extend(extra);

        let client = &self.index;
        let params = &params;
        let resp = run_with_retry(self.retry.as_ref(), api, move || {
            client.request(api, Method::GET, url, params, None)
        })
        .await?;
        usage.record_call(api);

        self.cache.put_json(api, &key, &resp.body).await;
        Ok(resp.body)
    }

    /// POST to the agents API. `cache_query` is `None` for uncached calls.
    async fn agent_run(
        &self,
        api: ApiType,
        url: &str,
        prompt: &str,
        cache_query: Option<&str>,
        usage: &mut ApiUsage,
    ) -> Result<Value, PipelineError> {
        let key = cache_query.map(|q| self.cache.key(api, q, &[]));
        if let Some(key) = &key {
            if let Some(hit) = self.cache.get_json(api, key).await {
                usage.record_cache_hit();
                return Ok(hit);
            }
        }

        let body = json!({ "agent": AGENT_NAME, "input": prompt });
        let client = &self.agents;
        let body = &body;
        let resp = run_with_retry(self.retry.as_ref(), api, move || {
            client.request(api, Method::POST, url, &[], Some(body))
        })
        .await?;
        usage.record_call(api);

        if let Some(key) = &key {
            self.cache.put_json(api, key, &resp.body).await;
        }
        Ok(resp.body)
    }
}

#[async_trait]
impl DataSource for LiveDataSource {
    fn name(&self) -> &'static str {
        "live"
    }

    async fn fetch_news(
        &self,
        _competitor: &str,
        query: &str,
        usage: &mut ApiUsage,
    ) -> Result<NewsPayload, PipelineError> {
        let extra = vec![("count", self.options.news_count.to_string())];
        let raw = self
            .cached_get(ApiType::News, &self.endpoints.news, "q", query, extra, usage)
            .await?;
        Ok(NewsPayload::from_raw(raw))
    }

    async fn search_context(
        &self,
        _competitor: &str,
        query: &str,
        usage: &mut ApiUsage,
    ) -> Result<SearchPayload, PipelineError> {
        let extra = vec![
            ("num_web_results", self.options.num_web_results.to_string()),
            ("safesearch", self.options.safesearch.clone()),
        ];
        let raw = self
            .cached_get(ApiType::Search, &self.endpoints.search, "query", query, extra, usage)
            .await?;
        Ok(SearchPayload::from_raw(raw))
    }

    async fn analyze(
        &self,
        _competitor: &str,
        prompt: &str,
        usage: &mut ApiUsage,
    ) -> Result<AgentReply, PipelineError> {
        let raw = self
            .agent_run(ApiType::Analysis, &self.endpoints.analysis, prompt, None, usage)
            .await?;
        Ok(AgentReply::from_raw(raw))
    }

    async fn research(
        &self,
        _competitor: &str,
        topic: &str,
        prompt: &str,
        usage: &mut ApiUsage,
    ) -> Result<ResearchPayload, PipelineError> {
        let raw = self
            .agent_run(
                ApiType::Research,
                &self.endpoints.research,
                prompt,
                Some(topic),
                usage,
            )
            .await?;
        Ok(ResearchPayload::from_raw(raw))
    }
}
