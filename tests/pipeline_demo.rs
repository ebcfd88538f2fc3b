// tests/pipeline_demo.rs
//
// End-to-end runs against the fixture data source.
//
// Covered:
// - OpenAI demo card: risk 75 / "high", one NotificationLog for a threshold-70 rule
// - determinism for identical competitor + keywords
// - card bounds and source totals
// - one progress event per completed stage, in order

use std::sync::Arc;

use impact_pipeline::notify::{InMemoryRuleStore, NotificationEvaluator, NotificationRule};
use impact_pipeline::progress::{BroadcastTransport, ProgressEmitter, STEP_EVENT};
use impact_pipeline::{FixtureDataSource, ImpactCard, ImpactPipeline};

fn rule(id: u64, competitor: &str, threshold: f64) -> NotificationRule {
    NotificationRule {
        id,
        competitor_name: competitor.to_string(),
        condition_type: "risk_threshold".to_string(),
        threshold_value: Some(threshold),
        channel: "email".to_string(),
        target: "strategy@example.com".to_string(),
        active: true,
        last_triggered_at: None,
    }
}

fn demo_pipeline(store: Arc<InMemoryRuleStore>) -> ImpactPipeline {
    ImpactPipeline::new(Arc::new(FixtureDataSource::new()))
        .with_notifications(NotificationEvaluator::new(store))
}

#[tokio::test]
async fn openai_demo_triggers_exactly_one_notification() {
    let store = Arc::new(InMemoryRuleStore::new(vec![
        rule(1, "OpenAI", 70.0),
        rule(2, "OpenAI", 90.0),
        rule(3, "Anthropic", 10.0),
    ]));
    let pipeline = demo_pipeline(store.clone());

    let card = pipeline.generate("OpenAI", &[]).await.expect("demo card");

    assert_eq!(card.risk_score, 75);
    assert_eq!(card.risk_level, "high");
    assert_eq!(card.confidence_score, 82);
    assert!(!card.requires_review);

    let logs = store.logs();
    assert_eq!(logs.len(), 1, "only the threshold-70 rule should fire");
    assert_eq!(logs[0].rule_id, 1);
    assert_eq!(logs[0].competitor_name, "OpenAI");
    assert_eq!(logs[0].channel, "email");

    let fired = store.rules().into_iter().find(|r| r.id == 1).unwrap();
    assert!(fired.last_triggered_at.is_some());
}

#[tokio::test]
async fn demo_cards_are_deterministic() {
    let pipeline = demo_pipeline(Arc::new(InMemoryRuleStore::default()));
    let keywords = vec!["pricing".to_string(), "launch".to_string()];

    let a = pipeline.generate("Acme Corp", &keywords).await.unwrap();
    let b = pipeline.generate("Acme Corp", &keywords).await.unwrap();

    fn stable(card: &ImpactCard) -> ImpactCard {
        let mut c = card.clone();
        c.generated_at = chrono::DateTime::<chrono::Utc>::MIN_UTC;
        c.processing_time = 0.0;
        c
    }
    assert_eq!(stable(&a), stable(&b));
}

#[tokio::test]
async fn demo_card_shape_and_bounds() {
    let pipeline = demo_pipeline(Arc::new(InMemoryRuleStore::default()));
    let card = pipeline.generate("OpenAI", &[]).await.unwrap();

    assert!((0..=100).contains(&card.risk_score));
    assert!((0.0..=1.0).contains(&card.credibility_score));

    // 4 news + 4 search + 3 citations (one without a URL).
    assert_eq!(card.total_sources, 11);
    assert_eq!(card.source_breakdown.news_articles, 4);
    assert_eq!(card.source_breakdown.search_results, 4);
    assert_eq!(card.source_breakdown.research_citations, 3);
    assert_eq!(card.explainability.source_quality.total, 10);
    assert_eq!(card.explainability.source_quality.top_sources.len(), 5);
    assert!((card.credibility_score - 0.8675).abs() < 1e-9);
    assert_eq!(card.explainability.data_source, "fixture");

    // Fixture calls are not network calls.
    assert_eq!(card.api_usage.total_calls(), 0);
    assert_eq!(card.api_usage.cache_hits, 0);

    let first = &card.recommended_actions[0];
    assert!(first.action.starts_with("Accelerate"));
    assert_eq!(first.owner, "Product Team");
    assert_eq!(first.score, 50.0);
    assert_eq!(first.priority, "high");
    assert_eq!(first.evidence.len(), 3);
    let indices: Vec<usize> = card.recommended_actions.iter().map(|a| a.index).collect();
    assert_eq!(indices, vec![0, 1, 2, 3]);
}

#[tokio::test]
async fn stage_events_are_published_in_order() {
    let transport = BroadcastTransport::new(16);
    let mut rx = transport.subscribe();
    let pipeline = ImpactPipeline::new(Arc::new(FixtureDataSource::new()))
        .with_progress(ProgressEmitter::new(Arc::new(transport), Some("room-7".into())));

    pipeline.generate("OpenAI", &[]).await.unwrap();

    let mut steps = Vec::new();
    while let Ok(ev) = rx.try_recv() {
        assert_eq!(ev.event, STEP_EVENT);
        assert_eq!(ev.room, "room-7");
        assert_eq!(ev.payload["competitor"], "OpenAI");
        steps.push(ev.payload["step"].as_str().unwrap_or_default().to_string());
    }
    assert_eq!(steps, vec!["news", "search", "analysis", "research"]);
}
