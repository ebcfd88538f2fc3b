// src/pipeline/card.rs
//! The Impact Card and its assembly from the four stage outputs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::analyze::{
    evaluate, rank_actions, ActionContext, AnalysisResult, ImpactArea, RankedAction,
    SourceQuality,
};
use crate::analyze::source_quality::TierCounts;
use crate::sources::{NewsPayload, ResearchPayload, SearchPayload};
use crate::types::ApiUsage;

/// Cards at or above this risk need a human look when credibility is low.
pub const REVIEW_RISK_THRESHOLD: i64 = 85;
pub const REVIEW_CREDIBILITY_FLOOR: f64 = 0.8;

/// `risk >= 85 && credibility < 0.8`.
pub fn requires_review(risk_score: i64, credibility_score: f64) -> bool {
    risk_score >= REVIEW_RISK_THRESHOLD && credibility_score < REVIEW_CREDIBILITY_FLOOR
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceBreakdown {
    pub news_articles: usize,
    pub search_results: usize,
    pub research_citations: usize,
    /// URL-bearing sources per tier.
    pub tiers: TierCounts,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Explainability {
    pub reasoning: String,
    pub data_source: String,
    pub source_quality: SourceQuality,
    pub research_summary: String,
}

/// The four raw API payloads, kept for audit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawData {
    pub news: Value,
    pub search: Value,
    pub analysis: Value,
    pub research: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImpactCard {
    pub competitor: String,
    pub generated_at: DateTime<Utc>,
    pub risk_score: i64,
    pub risk_level: String,
    pub confidence_score: i64,
    pub impact_areas: Vec<ImpactArea>,
    pub key_insights: Vec<String>,
    pub recommended_actions: Vec<RankedAction>,
    pub total_sources: usize,
    pub source_breakdown: SourceBreakdown,
    pub credibility_score: f64,
    pub requires_review: bool,
    pub explainability: Explainability,
    pub raw_data: RawData,
    /// Wall-clock seconds for the whole run up to assembly.
    pub processing_time: f64,
    pub api_usage: ApiUsage,
}

/// Stage outputs handed to [`assemble`].
pub struct CardInputs<'a> {
    pub competitor: &'a str,
    pub data_source: &'a str,
    pub news: NewsPayload,
    pub search: SearchPayload,
    pub analysis: AnalysisResult,
    pub analysis_raw: Value,
    pub research: ResearchPayload,
    pub processing_time: f64,
    pub usage: ApiUsage,
}

pub fn assemble(inputs: CardInputs<'_>) -> ImpactCard {
    let CardInputs {
        competitor,
        data_source,
        news,
        search,
        analysis,
        analysis_raw,
        research,
        processing_time,
        usage,
    } = inputs;

    let quality = evaluate(&news.articles, &search.results, &research.citations);
    let credibility_score = quality.score.clamp(0.0, 1.0);
    let risk_score = analysis.risk_score.clamp(0, 100);

    let recommended_actions = rank_actions(
        &analysis.recommended_actions,
        ActionContext {
            risk_score,
            risk_level: &analysis.risk_level,
            impact_areas: &analysis.impact_areas,
            news: &news.articles,
            citations: &research.citations,
        },
    );

    let source_breakdown = SourceBreakdown {
        news_articles: news.articles.len(),
        search_results: search.results.len(),
        research_citations: research.citations.len(),
        tiers: quality.tiers.clone(),
    };
    let total_sources = source_breakdown.news_articles
        + source_breakdown.search_results
        + source_breakdown.research_citations;

    ImpactCard {
        competitor: competitor.to_string(),
        generated_at: Utc::now(),
        risk_score,
        risk_level: analysis.risk_level,
        confidence_score: analysis.confidence_score,
        impact_areas: analysis.impact_areas,
        key_insights: analysis.key_insights,
        recommended_actions,
        total_sources,
        source_breakdown,
        credibility_score,
        requires_review: requires_review(risk_score, credibility_score),
        explainability: Explainability {
            reasoning: analysis.reasoning,
            data_source: data_source.to_string(),
            source_quality: quality,
            research_summary: research.report.chars().take(500).collect(),
        },
        raw_data: RawData {
            news: news.raw,
            search: search.raw,
            analysis: analysis_raw,
            research: research.raw,
        },
        processing_time,
        api_usage: usage,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyze::ActionItem;
    use serde_json::json;

    #[test]
    fn review_boundaries() {
        assert!(!requires_review(84, 0.0));
        assert!(requires_review(85, 0.79));
        assert!(!requires_review(85, 0.80));
        assert!(!requires_review(100, 1.0));
    }

    #[test]
    fn totals_count_every_source_including_urlless() {
        let news = NewsPayload::from_raw(json!({"results": [
            {"title": "a", "url": "https://techcrunch.com/a"},
            {"title": "b"}
        ]}));
        let search = SearchPayload::from_raw(json!({"results": [{"title": "s", "url": "https://x.org"}]}));
        let research = ResearchPayload::from_raw(json!({"answer": "r", "citations": [{"title": "t"}]}));
        let analysis = AnalysisResult {
            risk_score: 90,
            risk_level: "critical".into(),
            impact_areas: vec![],
            key_insights: vec![],
            recommended_actions: vec![ActionItem {
                action: "Review pricing".into(),
                priority: None,
                timeline: None,
            }],
            confidence_score: 60,
            reasoning: "r".into(),
        };

        let card = assemble(CardInputs {
            competitor: "Acme",
            data_source: "test",
            news,
            search,
            analysis,
            analysis_raw: Value::Null,
            research,
            processing_time: 0.1,
            usage: ApiUsage::default(),
        });

        assert_eq!(card.total_sources, 4);
        assert_eq!(card.explainability.source_quality.total, 2);
        // (1.0 + 0.75 * 0.9) / 2
        assert!((card.credibility_score - 0.8375).abs() < 1e-9);
        assert!(!card.requires_review);
        assert_eq!(card.recommended_actions[0].evidence.len(), 1);
    }
}
