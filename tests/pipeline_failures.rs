// tests/pipeline_failures.rs
//
// All-or-nothing behaviour: a failing stage yields an error, no card and no
// notification side effects.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use impact_pipeline::notify::{InMemoryRuleStore, NotificationEvaluator, NotificationRule};
use impact_pipeline::sources::{AgentReply, NewsPayload, ResearchPayload, SearchPayload};
use impact_pipeline::{
    ApiType, ApiUsage, CallError, DataSource, FixtureDataSource, ImpactPipeline, PipelineError,
};

/// Delegates to the fixtures but lets a test replace the analysis reply or fail news.
struct StubSource {
    analysis: Option<serde_json::Value>,
    news_error: Option<CallError>,
}

#[async_trait]
impl DataSource for StubSource {
    fn name(&self) -> &'static str {
        "stub"
    }

    async fn fetch_news(
        &self,
        competitor: &str,
        query: &str,
        usage: &mut ApiUsage,
    ) -> Result<NewsPayload, PipelineError> {
        if let Some(err) = &self.news_error {
            return Err(err.clone().into());
        }
        FixtureDataSource.fetch_news(competitor, query, usage).await
    }

    async fn search_context(
        &self,
        competitor: &str,
        query: &str,
        usage: &mut ApiUsage,
    ) -> Result<SearchPayload, PipelineError> {
        FixtureDataSource.search_context(competitor, query, usage).await
    }

    async fn analyze(
        &self,
        competitor: &str,
        prompt: &str,
        usage: &mut ApiUsage,
    ) -> Result<AgentReply, PipelineError> {
        match &self.analysis {
            Some(raw) => Ok(AgentReply::from_raw(raw.clone())),
            None => FixtureDataSource.analyze(competitor, prompt, usage).await,
        }
    }

    async fn research(
        &self,
        competitor: &str,
        topic: &str,
        prompt: &str,
        usage: &mut ApiUsage,
    ) -> Result<ResearchPayload, PipelineError> {
        FixtureDataSource.research(competitor, topic, prompt, usage).await
    }
}

fn store_with_low_threshold() -> Arc<InMemoryRuleStore> {
    Arc::new(InMemoryRuleStore::new(vec![NotificationRule {
        id: 1,
        competitor_name: "OpenAI".into(),
        condition_type: "risk_threshold".into(),
        threshold_value: Some(0.0),
        channel: "email".into(),
        target: "x@example.com".into(),
        active: true,
        last_triggered_at: None,
    }]))
}

#[tokio::test]
async fn analysis_without_confidence_is_malformed_and_produces_nothing() {
    let analysis = json!({
        "risk_score": 75,
        "risk_level": "high",
        "impact_areas": [],
        "key_insights": [],
        "recommended_actions": [],
        "reasoning": "missing confidence"
    });
    let source = StubSource {
        analysis: Some(json!({ "output": [{ "text": analysis.to_string() }] })),
        news_error: None,
    };
    let store = store_with_low_threshold();
    let pipeline = ImpactPipeline::new(Arc::new(source))
        .with_notifications(NotificationEvaluator::new(store.clone()));

    let err = pipeline.generate("OpenAI", &[]).await.unwrap_err();

    assert!(err.is_malformed(), "unexpected error: {err}");
    assert!(err.to_string().contains("confidence_score"));
    assert!(store.logs().is_empty());
}

#[tokio::test]
async fn exhausted_call_surfaces_status_and_payload() {
    let source = StubSource {
        analysis: None,
        news_error: Some(CallError::status(
            ApiType::News,
            "https://news.example/livenews",
            503,
            json!({"error": "overloaded"}),
        )),
    };
    let store = store_with_low_threshold();
    let pipeline = ImpactPipeline::new(Arc::new(source))
        .with_notifications(NotificationEvaluator::new(store.clone()));

    let err = pipeline.generate("OpenAI", &[]).await.unwrap_err();

    assert_eq!(err.api_type(), Some(ApiType::News));
    assert_eq!(err.status_code(), Some(503));
    match err {
        PipelineError::ApiCall { payload, .. } => assert_eq!(payload["error"], "overloaded"),
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(store.logs().is_empty());
}
