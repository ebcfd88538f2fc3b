// src/analyze/mod.rs
//! Pure analysis steps that run between the external calls and the final card.
//!
//! - `prompt`: query/prompt construction and strict parsing of the analysis reply
//! - `source_quality`: domain tiering and the credibility score
//! - `actions`: owner/OKR mapping, evidence and ranking of recommended actions
//!
//! Nothing in here performs I/O.

pub mod actions;
pub mod prompt;
pub mod source_quality;

pub use actions::{rank_actions, ActionContext, Evidence, RankedAction};
pub use prompt::{
    build_analysis_prompt, build_research_prompt, news_query, parse_analysis, research_topic,
    search_query, ActionItem, AnalysisResult, ImpactArea,
};
pub use source_quality::{classify_url, evaluate, SourceKind, SourceQuality, SourceRef, Tier};

/// Risk bucket for a 0–100 score.
pub fn risk_level_for(score: i64) -> &'static str {
    match score {
        s if s >= 85 => "critical",
        s if s >= 70 => "high",
        s if s >= 40 => "medium",
        _ => "low",
    }
}
