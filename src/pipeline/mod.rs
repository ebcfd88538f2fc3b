// src/pipeline/mod.rs
//! Impact Card orchestration.
//!
//! One run is strictly sequential:
//! NEWS_FETCH → CONTEXT_SEARCH → IMPACT_ANALYSIS → DEEP_RESEARCH → ASSEMBLY →
//! NOTIFICATION_EVAL → DONE.
//!
//! Any unrecovered error moves the run to FAILED and is returned as-is; no partial card
//! is ever produced. Usage is accumulated per run and returned on the card.

pub mod card;

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use metrics::{counter, histogram};
use serde_json::json;
use tracing::Instrument;

use crate::analyze::{
    build_analysis_prompt, build_research_prompt, news_query, parse_analysis, research_topic,
    search_query,
};
use crate::clients::{
    build_http, ApiClient, CacheBackend, CallLogger, JsonlCallLogStore, MemoryCache, RedisCache,
    ResponseCache,
};
use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::metrics::{ensure_described, PIPELINE_DURATION_MS, PIPELINE_RUNS_TOTAL};
use crate::notify::{InMemoryRuleStore, NotificationEvaluator, WebhookDispatcher};
use crate::progress::{LogTransport, ProgressEmitter};
use crate::sources::{DataSource, FixtureDataSource, LiveDataSource};
use crate::types::ApiUsage;

pub use card::{assemble, requires_review, CardInputs, ImpactCard};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    NewsFetch,
    ContextSearch,
    ImpactAnalysis,
    DeepResearch,
    Assembly,
    NotificationEval,
    Done,
    Failed,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::NewsFetch => "NEWS_FETCH",
            Stage::ContextSearch => "CONTEXT_SEARCH",
            Stage::ImpactAnalysis => "IMPACT_ANALYSIS",
            Stage::DeepResearch => "DEEP_RESEARCH",
            Stage::Assembly => "ASSEMBLY",
            Stage::NotificationEval => "NOTIFICATION_EVAL",
            Stage::Done => "DONE",
            Stage::Failed => "FAILED",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone)]
pub struct ImpactPipeline {
    source: Arc<dyn DataSource>,
    notifier: Option<NotificationEvaluator>,
    progress: ProgressEmitter,
    call_log: Option<CallLogger>,
}

impl ImpactPipeline {
    pub fn new(source: Arc<dyn DataSource>) -> Self {
        Self {
            source,
            notifier: None,
            progress: ProgressEmitter::disabled(),
            call_log: None,
        }
    }

    pub fn with_notifications(mut self, evaluator: NotificationEvaluator) -> Self {
        self.notifier = Some(evaluator);
        self
    }

    pub fn with_progress(mut self, progress: ProgressEmitter) -> Self {
        self.progress = progress;
        self
    }

    /// Logger to flush from [`ImpactPipeline::flush_logs`].
    pub fn with_call_log(mut self, log: CallLogger) -> Self {
        self.call_log = Some(log);
        self
    }

    pub fn source_name(&self) -> &'static str {
        self.source.name()
    }

    /// Wire everything from config. Must be called inside a Tokio runtime (the call log
    /// writer is spawned here).
    pub fn from_config(cfg: &PipelineConfig) -> anyhow::Result<Self> {
        let rules = Arc::new(InMemoryRuleStore::new(cfg.rules.clone()));
        let mut evaluator = NotificationEvaluator::new(rules);

        let progress = ProgressEmitter::new(Arc::new(LogTransport), cfg.progress.room.clone());

        if cfg.demo_mode {
            tracing::info!("demo mode: using fixture data source");
            if cfg.notify.deliver_webhooks {
                evaluator = evaluator.with_notifier(Arc::new(WebhookDispatcher::default()));
            }
            return Ok(Self::new(Arc::new(FixtureDataSource::new()))
                .with_notifications(evaluator)
                .with_progress(progress));
        }

        let key = cfg.resolved_api_key().context("resolving API key")?;
        let http = build_http(cfg.request_timeout()).context("building HTTP client")?;

        let store = Arc::new(JsonlCallLogStore::new(&cfg.call_log.path));
        let log = CallLogger::spawn(store, cfg.call_log.channel_capacity);

        let cache = if cfg.cache.enabled {
            let backend: Arc<dyn CacheBackend> = match &cfg.cache.redis_url {
                Some(url) => Arc::new(RedisCache::open(url).context("opening redis cache")?),
                None => Arc::new(MemoryCache::new()),
            };
            ResponseCache::new(backend, cfg.cache.namespace.clone(), cfg.cache_ttls())
        } else {
            ResponseCache::disabled()
        };

        if cfg.notify.deliver_webhooks {
            let dispatcher = WebhookDispatcher::new(http.clone())
                .with_timeout(cfg.notify.webhook_timeout_secs)
                .with_retries(cfg.notify.webhook_retries);
            evaluator = evaluator.with_notifier(Arc::new(dispatcher));
        }

        let source = LiveDataSource::new(
            ApiClient::with_api_key(http.clone(), key.clone(), log.clone()),
            ApiClient::with_bearer(http, key, log.clone()),
            cache,
            Arc::new(cfg.retry_policy()),
            cfg.endpoints(),
            cfg.query_options(),
        );

        Ok(Self::new(Arc::new(source))
            .with_notifications(evaluator)
            .with_progress(progress)
            .with_call_log(log))
    }

    /// Run all stages for `competitor`. `keywords` refine the news query.
    pub async fn generate(
        &self,
        competitor: &str,
        keywords: &[String],
    ) -> Result<ImpactCard, PipelineError> {
        ensure_described();
        let span = tracing::info_span!("impact_card", competitor, source = self.source.name());
        let started = Instant::now();
        let mut stage = Stage::NewsFetch;

        let result = self
            .run(competitor, keywords, started, &mut stage)
            .instrument(span.clone())
            .await;

        let elapsed_ms = started.elapsed().as_secs_f64() * 1_000.0;
        histogram!(PIPELINE_DURATION_MS).record(elapsed_ms);
        span.in_scope(|| match &result {
            Ok(card) => {
                counter!(PIPELINE_RUNS_TOTAL, "outcome" => "ok").increment(1);
                tracing::info!(
                    stage = %Stage::Done,
                    risk_score = card.risk_score,
                    credibility = card.credibility_score,
                    elapsed_ms,
                    "impact card generated"
                );
            }
            Err(e) => {
                counter!(PIPELINE_RUNS_TOTAL, "outcome" => "failed").increment(1);
                tracing::warn!(
                    stage = %Stage::Failed,
                    failed_at = %stage,
                    error = %e,
                    elapsed_ms,
                    "impact card generation failed"
                );
            }
        });
        result
    }

    async fn run(
        &self,
        competitor: &str,
        keywords: &[String],
        started: Instant,
        stage: &mut Stage,
    ) -> Result<ImpactCard, PipelineError> {
        let mut usage = ApiUsage::default();

        // NEWS_FETCH
        *stage = Stage::NewsFetch;
        tracing::info!(stage = %stage, "stage started");
        let query = news_query(competitor, keywords);
        let news = self.source.fetch_news(competitor, &query, &mut usage).await?;
        self.progress
            .stage_completed(
                competitor,
                "news",
                json!({"query": query, "articles": news.articles.len()}),
            )
            .await;

        // CONTEXT_SEARCH
        *stage = Stage::ContextSearch;
        tracing::info!(stage = %stage, "stage started");
        let query = search_query(competitor);
        let search = self
            .source
            .search_context(competitor, &query, &mut usage)
            .await?;
        self.progress
            .stage_completed(
                competitor,
                "search",
                json!({"query": query, "results": search.results.len()}),
            )
            .await;

        // IMPACT_ANALYSIS
        *stage = Stage::ImpactAnalysis;
        tracing::info!(stage = %stage, "stage started");
        let prompt = build_analysis_prompt(competitor, &news.articles, &search.results);
        let reply = self.source.analyze(competitor, &prompt, &mut usage).await?;
        let analysis = parse_analysis(&reply.text)?;
        self.progress
            .stage_completed(
                competitor,
                "analysis",
                json!({
                    "risk_score": analysis.risk_score,
                    "risk_level": analysis.risk_level,
                    "confidence_score": analysis.confidence_score,
                }),
            )
            .await;

        // DEEP_RESEARCH
        *stage = Stage::DeepResearch;
        tracing::info!(stage = %stage, "stage started");
        let topic = research_topic(competitor);
        let prompt = build_research_prompt(competitor, &topic);
        let research = self
            .source
            .research(competitor, &topic, &prompt, &mut usage)
            .await?;
        self.progress
            .stage_completed(
                competitor,
                "research",
                json!({"topic": topic, "citations": research.citations.len()}),
            )
            .await;

        // ASSEMBLY
        *stage = Stage::Assembly;
        let card = assemble(CardInputs {
            competitor,
            data_source: self.source.name(),
            news,
            search,
            analysis,
            analysis_raw: reply.raw,
            research,
            processing_time: started.elapsed().as_secs_f64(),
            usage,
        });
        tracing::info!(
            stage = %stage,
            total_sources = card.total_sources,
            actions = card.recommended_actions.len(),
            requires_review = card.requires_review,
            "card assembled"
        );

        // NOTIFICATION_EVAL
        *stage = Stage::NotificationEval;
        if let Some(evaluator) = &self.notifier {
            let context = json!({
                "risk_level": card.risk_level,
                "credibility_score": card.credibility_score,
                "requires_review": card.requires_review,
                "top_action": card.recommended_actions.first().map(|a| a.action.clone()),
            });
            let fired = evaluator
                .evaluate(competitor, card.risk_score, &context)
                .await?;
            tracing::info!(stage = %stage, fired = fired.len(), "notification rules evaluated");
        }

        *stage = Stage::Done;
        Ok(card)
    }

    /// Wait for queued call records to reach the store.
    pub async fn flush_logs(&self) {
        if let Some(log) = &self.call_log {
            log.flush().await;
        }
    }
}
