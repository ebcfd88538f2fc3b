// src/analyze/actions.rs
//! Enrichment and ranking of recommended actions.
//!
//! Each action gets an owner and OKR goal from a keyword table, an impact score taken
//! from the matching impact area (or the overall risk score), a fixed effort estimate and
//! up to three evidence links. Ranking is a stable sort on `impact - effort / 2`.

use serde::{Deserialize, Serialize};

use crate::analyze::prompt::{ActionItem, ImpactArea};
use crate::sources::{Citation, NewsArticle};

pub const MAX_EVIDENCE: usize = 3;

const DEFAULT_OWNER: (&str, &str) = ("Strategy Team", "Drive competitive differentiation");

/// Keyword → (owner, OKR goal). First match wins, so order matters.
const OKR_TABLE: &[(&str, &str, &str)] = &[
    ("pricing", "Revenue Team", "Protect revenue and margin"),
    ("price", "Revenue Team", "Protect revenue and margin"),
    ("product", "Product Team", "Ship differentiated product capabilities"),
    ("feature", "Product Team", "Ship differentiated product capabilities"),
    ("roadmap", "Product Team", "Ship differentiated product capabilities"),
    ("marketing", "Marketing Team", "Grow pipeline and brand awareness"),
    ("campaign", "Marketing Team", "Grow pipeline and brand awareness"),
    ("brand", "Marketing Team", "Grow pipeline and brand awareness"),
    ("partner", "Partnerships Team", "Expand strategic partnerships"),
    ("sales", "Sales Team", "Retain and grow key accounts"),
    ("customer", "Sales Team", "Retain and grow key accounts"),
    ("hire", "People Team", "Attract and retain critical talent"),
    ("talent", "People Team", "Attract and retain critical talent"),
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evidence {
    pub title: Option<String>,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedAction {
    pub action: String,
    pub priority: String,
    pub timeline: String,
    pub owner: String,
    pub okr_goal: String,
    pub impact_score: f64,
    pub effort_score: f64,
    pub score: f64,
    pub evidence: Vec<Evidence>,
    /// Position in the analysis reply; ties in `score` keep this order.
    pub index: usize,
}

/// Everything ranking needs from the rest of the run.
#[derive(Debug, Clone, Copy)]
pub struct ActionContext<'a> {
    pub risk_score: i64,
    pub risk_level: &'a str,
    pub impact_areas: &'a [ImpactArea],
    pub news: &'a [NewsArticle],
    pub citations: &'a [Citation],
}

pub fn owner_for(action: &str) -> (&'static str, &'static str) {
    let text = action.to_lowercase();
    OKR_TABLE
        .iter()
        .find(|(kw, _, _)| text.contains(kw))
        .map(|(_, owner, goal)| (*owner, *goal))
        .unwrap_or(DEFAULT_OWNER)
}

pub fn effort_for(action: &str) -> f64 {
    if action.to_lowercase().contains("accelerate") {
        40.0
    } else {
        60.0
    }
}

/// Score of the first impact area named in the action, else the risk score.
pub fn impact_for(action: &str, areas: &[ImpactArea], risk_score: i64) -> f64 {
    let text = action.to_lowercase();
    areas
        .iter()
        .find(|a| !a.area.is_empty() && text.contains(&a.area.to_lowercase()))
        .and_then(|a| a.impact_score)
        .unwrap_or(risk_score as f64)
}

/// Default (priority, timeline) for a risk level.
fn defaults_for(risk_level: &str) -> (&'static str, &'static str) {
    match risk_level.to_ascii_lowercase().as_str() {
        "critical" | "high" => ("high", "0-30 days"),
        "medium" => ("medium", "30-60 days"),
        _ => ("low", "60-90 days"),
    }
}

/// First URL-bearing news articles, then research citations.
pub fn collect_evidence(news: &[NewsArticle], citations: &[Citation]) -> Vec<Evidence> {
    news.iter()
        .filter_map(|a| {
            a.url.as_ref().map(|url| Evidence {
                title: Some(a.title.clone()).filter(|t| !t.is_empty()),
                url: url.clone(),
            })
        })
        .chain(citations.iter().filter_map(|c| {
            c.url.as_ref().map(|url| Evidence {
                title: c.title.clone(),
                url: url.clone(),
            })
        }))
        .take(MAX_EVIDENCE)
        .collect()
}

pub fn rank_actions(actions: &[ActionItem], ctx: ActionContext<'_>) -> Vec<RankedAction> {
    let evidence = collect_evidence(ctx.news, ctx.citations);
    let (default_priority, default_timeline) = defaults_for(ctx.risk_level);

    let mut ranked: Vec<RankedAction> = actions
        .iter()
        .enumerate()
        .map(|(index, item)| {
            let (owner, okr_goal) = owner_for(&item.action);
            let impact_score = impact_for(&item.action, ctx.impact_areas, ctx.risk_score);
            let effort_score = effort_for(&item.action);
            RankedAction {
                action: item.action.clone(),
                priority: item
                    .priority
                    .clone()
                    .unwrap_or_else(|| default_priority.to_string()),
                timeline: item
                    .timeline
                    .clone()
                    .unwrap_or_else(|| default_timeline.to_string()),
                owner: owner.to_string(),
                okr_goal: okr_goal.to_string(),
                impact_score,
                effort_score,
                score: impact_score - effort_score / 2.0,
                evidence: evidence.clone(),
                index,
            }
        })
        .collect();

    // `sort_by` is stable; the index tie-break keeps that explicit.
    ranked.sort_by(|a, b| b.score.total_cmp(&a.score).then(a.index.cmp(&b.index)));
    ranked
}
