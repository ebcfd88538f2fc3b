// src/sources/mod.rs
//! Data sources for the four pipeline stages.
//!
//! [`DataSource`] is the seam between the orchestrator and the outside world.
//! [`live::LiveDataSource`] talks to the real APIs through cache + retry + call log;
//! [`fixture::FixtureDataSource`] serves deterministic demo data. Both return the same
//! payload types, normalized here from the raw JSON the APIs send back.

pub mod fixture;
pub mod live;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::PipelineError;
use crate::types::ApiUsage;

pub use fixture::FixtureDataSource;
pub use live::{Endpoints, LiveDataSource};

/// Provider abstraction for the four external calls. Usage is accumulated into the
/// caller's per-run [`ApiUsage`].
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Short name for logs and the card's explainability block.
    fn name(&self) -> &'static str;

    async fn fetch_news(
        &self,
        competitor: &str,
        query: &str,
        usage: &mut ApiUsage,
    ) -> Result<NewsPayload, PipelineError>;

    async fn search_context(
        &self,
        competitor: &str,
        query: &str,
        usage: &mut ApiUsage,
    ) -> Result<SearchPayload, PipelineError>;

    async fn analyze(
        &self,
        competitor: &str,
        prompt: &str,
        usage: &mut ApiUsage,
    ) -> Result<AgentReply, PipelineError>;

    /// `topic` keys the cache, `prompt` is what gets sent.
    async fn research(
        &self,
        competitor: &str,
        topic: &str,
        prompt: &str,
        usage: &mut ApiUsage,
    ) -> Result<ResearchPayload, PipelineError>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsArticle {
    pub title: String,
    pub url: Option<String>,
    pub description: String,
    pub source: Option<String>,
    pub published_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub url: Option<String>,
    pub snippet: String,
}

/// A research citation. The API sends either a bare URL string or an object; both end
/// up here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    pub url: Option<String>,
    pub title: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewsPayload {
    pub articles: Vec<NewsArticle>,
    pub raw: Value,
}

#[derive(Debug, Clone)]
pub struct SearchPayload {
    pub results: Vec<SearchResult>,
    pub raw: Value,
}

/// Text answer from the agents API.
#[derive(Debug, Clone)]
pub struct AgentReply {
    pub text: String,
    pub raw: Value,
}

#[derive(Debug, Clone)]
pub struct ResearchPayload {
    pub report: String,
    pub citations: Vec<Citation>,
    pub raw: Value,
}

impl NewsPayload {
    /// Accepts `{"news": {"results": [...]}}`, `{"results": [...]}` or `{"articles": [...]}`.
    /// Non-object entries are skipped; a missing title is kept as empty.
    pub fn from_raw(raw: Value) -> Self {
        let items = first_array(&raw, &["/news/results", "/results", "/articles"]);
        let articles = items
            .iter()
            .filter(|item| item.is_object())
            .map(|item| NewsArticle {
                title: str_at(item, &["title"]).unwrap_or_default(),
                url: url_at(item),
                description: str_at(item, &["description", "snippet"]).unwrap_or_default(),
                source: str_at(item, &["source", "source_name"])
                    .or_else(|| pointer_str(item, "/meta_url/hostname")),
                published_at: str_at(item, &["page_age", "published_at", "age"]),
            })
            .collect();
        Self { articles, raw }
    }
}

impl SearchPayload {
    /// Accepts `{"results": {"web": [...]}}`, `{"hits": [...]}` or `{"results": [...]}`.
    pub fn from_raw(raw: Value) -> Self {
        let items = first_array(&raw, &["/results/web", "/hits", "/results"]);
        let results = items
            .iter()
            .filter(|item| item.is_object())
            .map(|item| {
                let snippet = str_at(item, &["description", "snippet"]).unwrap_or_else(|| {
                    item.get("snippets")
                        .and_then(Value::as_array)
                        .and_then(|s| s.first())
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string()
                });
                SearchResult {
                    title: str_at(item, &["title"]).unwrap_or_default(),
                    url: url_at(item),
                    snippet,
                }
            })
            .collect();
        Self { results, raw }
    }
}

impl AgentReply {
    pub fn from_raw(raw: Value) -> Self {
        let text = agent_text(&raw);
        Self { text, raw }
    }
}

impl ResearchPayload {
    /// Citations come from a top-level `citations`/`sources` array or from the same
    /// arrays inside `output[]` items.
    pub fn from_raw(raw: Value) -> Self {
        let report = agent_text(&raw);
        let mut citations = Vec::new();
        for key in ["citations", "sources"] {
            if let Some(list) = raw.get(key).and_then(Value::as_array) {
                citations.extend(list.iter().filter_map(normalize_citation));
            }
        }
        if let Some(output) = raw.get("output").and_then(Value::as_array) {
            for item in output {
                for key in ["citations", "sources"] {
                    if let Some(list) = item.get(key).and_then(Value::as_array) {
                        citations.extend(list.iter().filter_map(normalize_citation));
                    }
                }
            }
        }
        Self {
            report,
            citations,
            raw,
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawCitation {
    Url(String),
    Object {
        #[serde(default)]
        url: Option<String>,
        #[serde(default, alias = "name")]
        title: Option<String>,
    },
}

/// Turn a string-or-object citation into a [`Citation`]. Other JSON values are dropped.
pub fn normalize_citation(value: &Value) -> Option<Citation> {
    let raw: RawCitation = serde_json::from_value(value.clone()).ok()?;
    Some(match raw {
        RawCitation::Url(url) => Citation {
            url: non_empty(url),
            title: None,
        },
        RawCitation::Object { url, title } => Citation {
            url: url.and_then(non_empty),
            title: title.and_then(non_empty),
        },
    })
}

/// Agent replies: `{"output": [{"text": ...}]}`, `{"answer": ...}` or a bare string.
fn agent_text(raw: &Value) -> String {
    if let Some(s) = raw.as_str() {
        return s.to_string();
    }
    if let Some(output) = raw.get("output").and_then(Value::as_array) {
        let parts: Vec<&str> = output
            .iter()
            .filter_map(|item| item.get("text").and_then(Value::as_str))
            .collect();
        if !parts.is_empty() {
            return parts.join("\n");
        }
    }
    str_at(raw, &["answer", "text", "content"]).unwrap_or_default()
}

fn first_array<'a>(raw: &'a Value, pointers: &[&str]) -> &'a [Value] {
    pointers
        .iter()
        .find_map(|p| raw.pointer(p).and_then(Value::as_array))
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

fn str_at(item: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|k| item.get(*k).and_then(Value::as_str))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn pointer_str(item: &Value, pointer: &str) -> Option<String> {
    item.pointer(pointer)
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn url_at(item: &Value) -> Option<String> {
    str_at(item, &["url", "link"])
}

fn non_empty(s: String) -> Option<String> {
    let t = s.trim();
    if t.is_empty() {
        None
    } else {
        Some(t.to_string())
    }
}
