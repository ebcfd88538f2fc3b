// src/types.rs
//! Records shared by the client layer and the pipeline: API identity, call log entries
//! and the per-run usage accumulator.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The four external research APIs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiType {
    News,
    Search,
    Analysis,
    Research,
}

impl ApiType {
    pub const ALL: [ApiType; 4] = [
        ApiType::News,
        ApiType::Search,
        ApiType::Analysis,
        ApiType::Research,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ApiType::News => "news",
            ApiType::Search => "search",
            ApiType::Analysis => "analysis",
            ApiType::Research => "research",
        }
    }
}

impl fmt::Display for ApiType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One external call attempt. Retries produce one record each.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallRecord {
    pub api_type: ApiType,
    pub endpoint: String,
    pub status_code: Option<u16>,
    pub success: bool,
    pub latency_ms: f64,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl CallRecord {
    pub fn succeeded(api_type: ApiType, endpoint: &str, status_code: u16, latency_ms: f64) -> Self {
        Self {
            api_type,
            endpoint: endpoint.to_string(),
            status_code: Some(status_code),
            success: true,
            latency_ms,
            error_message: None,
            created_at: Utc::now(),
        }
    }

    pub fn failed(
        api_type: ApiType,
        endpoint: &str,
        status_code: Option<u16>,
        latency_ms: f64,
        error_message: String,
    ) -> Self {
        Self {
            api_type,
            endpoint: endpoint.to_string(),
            status_code,
            success: false,
            latency_ms,
            error_message: Some(error_message),
            created_at: Utc::now(),
        }
    }
}

/// Per-run usage accumulator. Network calls that succeeded are counted per API;
/// cache hits are tracked separately and never count as calls.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiUsage {
    pub news_calls: u32,
    pub search_calls: u32,
    pub analysis_calls: u32,
    pub research_calls: u32,
    pub cache_hits: u32,
}

impl ApiUsage {
    pub fn record_call(&mut self, api: ApiType) {
        let slot = match api {
            ApiType::News => &mut self.news_calls,
            ApiType::Search => &mut self.search_calls,
            ApiType::Analysis => &mut self.analysis_calls,
            ApiType::Research => &mut self.research_calls,
        };
        *slot = slot.saturating_add(1);
    }

    pub fn record_cache_hit(&mut self) {
        self.cache_hits = self.cache_hits.saturating_add(1);
    }

    pub fn calls_for(&self, api: ApiType) -> u32 {
        match api {
            ApiType::News => self.news_calls,
            ApiType::Search => self.search_calls,
            ApiType::Analysis => self.analysis_calls,
            ApiType::Research => self.research_calls,
        }
    }

    pub fn total_calls(&self) -> u32 {
        ApiType::ALL.iter().map(|api| self.calls_for(*api)).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usage_counts_calls_per_api_and_hits_separately() {
        let mut usage = ApiUsage::default();
        usage.record_call(ApiType::News);
        usage.record_call(ApiType::News);
        usage.record_call(ApiType::Research);
        usage.record_cache_hit();

        assert_eq!(usage.calls_for(ApiType::News), 2);
        assert_eq!(usage.calls_for(ApiType::Search), 0);
        assert_eq!(usage.total_calls(), 3);
        assert_eq!(usage.cache_hits, 1);
    }

    #[test]
    fn api_type_serializes_lowercase() {
        let s = serde_json::to_string(&ApiType::Analysis).unwrap();
        assert_eq!(s, "\"analysis\"");
    }
}
