// src/analyze/prompt.rs
//! Queries and prompts sent to the external APIs, and strict parsing of the analysis
//! reply.
//!
//! The analysis agent answers in free text that should contain one JSON object, often
//! wrapped in a ```json fence. Seven fields are required with exact JSON types; anything
//! missing or mistyped is a [`PipelineError::MalformedResponse`].

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::PipelineError;
use crate::sources::{NewsArticle, SearchResult};

/// How many news articles / search results go into the analysis prompt.
pub const PROMPT_TOP_N: usize = 5;

static FENCED_JSON: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```(?:json)?\s*(\{.*?\})\s*```").expect("fence regex"));

/// News query: competitor name plus any caller keywords.
pub fn news_query(competitor: &str, keywords: &[String]) -> String {
    let competitor = competitor.trim();
    let extra: Vec<&str> = keywords
        .iter()
        .map(|k| k.trim())
        .filter(|k| !k.is_empty())
        .collect();
    if extra.is_empty() {
        competitor.to_string()
    } else {
        format!("{competitor} {}", extra.join(" "))
    }
}

pub fn search_query(competitor: &str) -> String {
    format!("{} company products strategy", competitor.trim())
}

/// Research topic. Also the research cache key.
pub fn research_topic(competitor: &str) -> String {
    format!("{} competitive analysis", competitor.trim())
}

pub fn build_analysis_prompt(
    competitor: &str,
    news: &[NewsArticle],
    search: &[SearchResult],
) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "Analyze the competitive impact of recent activity by {competitor}.\n\n"
    ));

    out.push_str("Recent news:\n");
    if news.is_empty() {
        out.push_str("- (none)\n");
    }
    for a in news.iter().take(PROMPT_TOP_N) {
        out.push_str(&format!("- {}: {}\n", a.title, a.description));
    }

    out.push_str("\nBackground context:\n");
    if search.is_empty() {
        out.push_str("- (none)\n");
    }
    for r in search.iter().take(PROMPT_TOP_N) {
        out.push_str(&format!("- {}: {}\n", r.title, r.snippet));
    }

    out.push_str(
        "\nRespond with a single JSON object and nothing else, with these fields:\n\
         - risk_score: integer 0-100\n\
         - risk_level: one of \"low\", \"medium\", \"high\", \"critical\"\n\
         - impact_areas: list of {\"area\", \"impact_score\", \"description\"}\n\
         - key_insights: list of strings\n\
         - recommended_actions: list of strings\n\
         - confidence_score: integer 0-100\n\
         - reasoning: string\n",
    );
    out
}

pub fn build_research_prompt(competitor: &str, topic: &str) -> String {
    format!(
        "Produce a research report on: {topic}.\n\
         Cover {competitor}'s products, pricing, partnerships, funding and go-to-market \
         moves from the last twelve months. Cite every claim with a source URL."
    )
}

/// An impact area as reported by the analysis agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImpactArea {
    pub area: String,
    pub impact_score: Option<f64>,
    pub description: String,
}

/// A recommended action before enrichment. Agents send plain strings or objects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionItem {
    pub action: String,
    pub priority: Option<String>,
    pub timeline: Option<String>,
}

/// Validated analysis reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub risk_score: i64,
    pub risk_level: String,
    pub impact_areas: Vec<ImpactArea>,
    pub key_insights: Vec<String>,
    pub recommended_actions: Vec<ActionItem>,
    pub confidence_score: i64,
    pub reasoning: String,
}

/// Pull the JSON object out of the agent text and validate it.
pub fn parse_analysis(text: &str) -> Result<AnalysisResult, PipelineError> {
    let body = extract_json(text)
        .ok_or_else(|| PipelineError::malformed("response", "contains no JSON object"))?;
    let value: Value = serde_json::from_str(body)
        .map_err(|e| PipelineError::malformed("response", format!("is not valid JSON: {e}")))?;
    let obj = value
        .as_object()
        .ok_or_else(|| PipelineError::malformed("response", "is not a JSON object"))?;

    let risk_score = int_field(obj, "risk_score")?;
    let risk_level = str_field(obj, "risk_level")?;
    let impact_areas = list_field(obj, "impact_areas")?;
    let key_insights = list_field(obj, "key_insights")?;
    let recommended_actions = list_field(obj, "recommended_actions")?;
    let confidence_score = int_field(obj, "confidence_score")?;
    let reasoning = str_field(obj, "reasoning")?;

    Ok(AnalysisResult {
        risk_score: risk_score.clamp(0, 100),
        risk_level: risk_level.to_string(),
        impact_areas: impact_areas.iter().filter_map(impact_area).collect(),
        key_insights: key_insights.iter().filter_map(text_of).collect(),
        recommended_actions: recommended_actions.iter().filter_map(action_item).collect(),
        confidence_score: confidence_score.clamp(0, 100),
        reasoning: reasoning.to_string(),
    })
}

/// First fenced block that parses as an object, else the first fenced block, else the
/// outermost braces in the text.
fn extract_json(text: &str) -> Option<&str> {
    let fenced: Vec<&str> = FENCED_JSON
        .captures_iter(text)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str())
        .collect();
    if let Some(first) = fenced.first() {
        let parsed = fenced
            .iter()
            .find(|b| serde_json::from_str::<Map<String, Value>>(b).is_ok());
        return Some(*parsed.unwrap_or(first));
    }
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

fn field<'a>(obj: &'a Map<String, Value>, name: &str) -> Result<&'a Value, PipelineError> {
    match obj.get(name) {
        None | Some(Value::Null) => Err(PipelineError::malformed(name, "is missing")),
        Some(v) => Ok(v),
    }
}

fn int_field(obj: &Map<String, Value>, name: &str) -> Result<i64, PipelineError> {
    field(obj, name)?
        .as_i64()
        .ok_or_else(|| PipelineError::malformed(name, "must be an integer"))
}

fn str_field<'a>(obj: &'a Map<String, Value>, name: &str) -> Result<&'a str, PipelineError> {
    field(obj, name)?
        .as_str()
        .ok_or_else(|| PipelineError::malformed(name, "must be a string"))
}

fn list_field<'a>(obj: &'a Map<String, Value>, name: &str) -> Result<&'a [Value], PipelineError> {
    field(obj, name)?
        .as_array()
        .map(Vec::as_slice)
        .ok_or_else(|| PipelineError::malformed(name, "must be a list"))
}

fn text_of(v: &Value) -> Option<String> {
    match v {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::String(_) | Value::Null => None,
        other => Some(other.to_string()),
    }
}

fn obj_str(obj: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|k| obj.get(*k).and_then(Value::as_str))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn impact_area(v: &Value) -> Option<ImpactArea> {
    match v {
        Value::String(s) if !s.trim().is_empty() => Some(ImpactArea {
            area: s.trim().to_string(),
            impact_score: None,
            description: String::new(),
        }),
        Value::Object(obj) => Some(ImpactArea {
            area: obj_str(obj, &["area", "name"])?,
            impact_score: obj
                .get("impact_score")
                .or_else(|| obj.get("score"))
                .and_then(Value::as_f64),
            description: obj_str(obj, &["description", "details"]).unwrap_or_default(),
        }),
        _ => None,
    }
}

fn action_item(v: &Value) -> Option<ActionItem> {
    match v {
        Value::String(s) if !s.trim().is_empty() => Some(ActionItem {
            action: s.trim().to_string(),
            priority: None,
            timeline: None,
        }),
        Value::Object(obj) => Some(ActionItem {
            action: obj_str(obj, &["action", "title", "description"])?,
            priority: obj_str(obj, &["priority"]),
            timeline: obj_str(obj, &["timeline"]),
        }),
        _ => None,
    }
}
