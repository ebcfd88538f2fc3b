// src/analyze/source_quality.rs
//! # Source Quality
//!
//! Maps every source behind a card to a credibility tier and weight, then averages the
//! weights into a score in `[0.0, 1.0]`.
//!
//! - Domain = URL host, lowercased, leading `www.` stripped.
//! - Known outlets (exact domain or any subdomain) → tier1, weight 1.0.
//! - `.gov` / `.edu` → tier1, weight 0.95.
//! - A small suffix set (`.org`, `.int`, `.ac.uk`, `.gov.uk`) → tier2, weight 0.75.
//! - Anything else → tier3, weight 0.55.
//! - Channel multiplier on top: news ×1.0, search ×0.9, research ×1.1.
//!
//! Sources without a URL count toward the card's `total_sources` but are not scored.

use serde::{Deserialize, Serialize};

use crate::sources::{Citation, NewsArticle, SearchResult};

/// How many sources are echoed back in `top_sources`.
pub const TOP_SOURCES: usize = 5;

const TIER1_DOMAINS: &[&str] = &[
    "techcrunch.com",
    "reuters.com",
    "bloomberg.com",
    "wsj.com",
    "ft.com",
    "nytimes.com",
    "theverge.com",
    "wired.com",
    "cnbc.com",
    "forbes.com",
    "arstechnica.com",
    "venturebeat.com",
    "businessinsider.com",
    "theinformation.com",
    "axios.com",
    "apnews.com",
    "bbc.com",
    "bbc.co.uk",
    "economist.com",
    "washingtonpost.com",
    "gartner.com",
    "forrester.com",
    "mckinsey.com",
    "sec.gov",
];

const TIER2_SUFFIXES: &[&str] = &[".org", ".int", ".ac.uk", ".gov.uk"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Tier1,
    Tier2,
    Tier3,
}

/// Where a source came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    News,
    Search,
    Research,
}

impl SourceKind {
    pub fn multiplier(self) -> f64 {
        match self {
            SourceKind::News => 1.0,
            SourceKind::Search => 0.9,
            SourceKind::Research => 1.1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRef {
    #[serde(rename = "type")]
    pub kind: SourceKind,
    pub title: Option<String>,
    pub url: String,
    pub tier: Tier,
    pub weight: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TierCounts {
    pub tier1: usize,
    pub tier2: usize,
    pub tier3: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceQuality {
    pub score: f64,
    pub tiers: TierCounts,
    pub total: usize,
    pub top_sources: Vec<SourceRef>,
}

/// Tier and base weight (before the channel multiplier) for a URL.
pub fn classify_url(url: &str) -> (Tier, f64) {
    let domain = domain_of(url);
    if domain.is_empty() {
        return (Tier::Tier3, 0.55);
    }
    if TIER1_DOMAINS
        .iter()
        .any(|d| domain == *d || domain.ends_with(&format!(".{d}")))
    {
        return (Tier::Tier1, 1.0);
    }
    if domain.ends_with(".gov") || domain.ends_with(".edu") {
        return (Tier::Tier1, 0.95);
    }
    if TIER2_SUFFIXES.iter().any(|s| domain.ends_with(s)) {
        return (Tier::Tier2, 0.75);
    }
    (Tier::Tier3, 0.55)
}

/// Host without `www.`; accepts bare domains too.
fn domain_of(url: &str) -> String {
    let url = url.trim();
    let parsed = reqwest::Url::parse(url).or_else(|_| reqwest::Url::parse(&format!("https://{url}")));
    let host = match parsed {
        Ok(u) => u.host_str().unwrap_or_default().to_ascii_lowercase(),
        Err(_) => return String::new(),
    };
    host.strip_prefix("www.").unwrap_or(&host).to_string()
}

fn source_ref(kind: SourceKind, title: Option<&str>, url: Option<&str>) -> Option<SourceRef> {
    let url = url?.trim();
    if url.is_empty() {
        return None;
    }
    let (tier, base) = classify_url(url);
    Some(SourceRef {
        kind,
        title: title.filter(|t| !t.is_empty()).map(str::to_string),
        url: url.to_string(),
        tier,
        weight: base * kind.multiplier(),
    })
}

/// Score all URL-bearing sources in news → search → research order.
pub fn evaluate(news: &[NewsArticle], search: &[SearchResult], citations: &[Citation]) -> SourceQuality {
    let refs: Vec<SourceRef> = news
        .iter()
        .filter_map(|a| source_ref(SourceKind::News, Some(&a.title), a.url.as_deref()))
        .chain(
            search
                .iter()
                .filter_map(|r| source_ref(SourceKind::Search, Some(&r.title), r.url.as_deref())),
        )
        .chain(
            citations
                .iter()
                .filter_map(|c| source_ref(SourceKind::Research, c.title.as_deref(), c.url.as_deref())),
        )
        .collect();

    let mut tiers = TierCounts::default();
    for r in &refs {
        match r.tier {
            Tier::Tier1 => tiers.tier1 += 1,
            Tier::Tier2 => tiers.tier2 += 1,
            Tier::Tier3 => tiers.tier3 += 1,
        }
    }

    let total = refs.len();
    let score = if total == 0 {
        0.0
    } else {
        let sum: f64 = refs.iter().map(|r| r.weight).sum();
        (sum / total as f64).min(1.0)
    };

    SourceQuality {
        score,
        tiers,
        total,
        top_sources: refs.into_iter().take(TOP_SOURCES).collect(),
    }
}
