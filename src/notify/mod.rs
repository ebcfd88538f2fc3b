// src/notify/mod.rs
//! Notification rules and their evaluation.
//!
//! Rules live in an external store ([`RuleStore`]); the pipeline only reads the active
//! rules for a competitor, appends a [`NotificationLog`] per trigger and stamps
//! `last_triggered_at`. Delivery to a webhook is optional and best-effort.

pub mod webhook;

use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use metrics::counter;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::PipelineError;
use crate::metrics::NOTIFICATIONS_TRIGGERED_TOTAL;

pub use webhook::WebhookDispatcher;

/// The only condition type evaluated by the pipeline.
pub const RISK_THRESHOLD: &str = "risk_threshold";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationRule {
    pub id: u64,
    pub competitor_name: String,
    pub condition_type: String,
    #[serde(default)]
    pub threshold_value: Option<f64>,
    pub channel: String,
    pub target: String,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default)]
    pub last_triggered_at: Option<DateTime<Utc>>,
}

fn default_active() -> bool {
    true
}

impl NotificationRule {
    /// `risk_threshold` rules with a threshold fire at `risk_score >= threshold`.
    pub fn matches(&self, risk_score: i64) -> bool {
        if self.condition_type != RISK_THRESHOLD {
            return false;
        }
        match self.threshold_value {
            Some(t) => risk_score as f64 >= t,
            None => false,
        }
    }
}

/// Append-only record of a fired rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationLog {
    pub rule_id: u64,
    pub competitor_name: String,
    pub channel: String,
    pub target: String,
    /// JSON document describing the trigger.
    pub message: String,
    pub created_at: DateTime<Utc>,
}

/// Persistence collaborator for rules and notification logs.
#[async_trait]
pub trait RuleStore: Send + Sync {
    async fn active_rules(&self, competitor: &str) -> Result<Vec<NotificationRule>>;
    async fn append_log(&self, log: &NotificationLog) -> Result<()>;
    async fn mark_triggered(&self, rule_id: u64, at: DateTime<Utc>) -> Result<()>;
}

/// Delivery of a fired rule to its channel.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn deliver(&self, rule: &NotificationRule, log: &NotificationLog) -> Result<()>;
}

/// Rules and logs kept in process memory.
#[derive(Default)]
pub struct InMemoryRuleStore {
    rules: Mutex<Vec<NotificationRule>>,
    logs: Mutex<Vec<NotificationLog>>,
}

impl InMemoryRuleStore {
    pub fn new(rules: Vec<NotificationRule>) -> Self {
        Self {
            rules: Mutex::new(rules),
            logs: Mutex::new(Vec::new()),
        }
    }

    pub fn add_rule(&self, rule: NotificationRule) {
        lock(&self.rules).push(rule);
    }

    pub fn rules(&self) -> Vec<NotificationRule> {
        lock(&self.rules).clone()
    }

    pub fn logs(&self) -> Vec<NotificationLog> {
        lock(&self.logs).clone()
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match m.lock() {
        Ok(g) => g,
        Err(poison) => poison.into_inner(),
    }
}

#[async_trait]
impl RuleStore for InMemoryRuleStore {
    async fn active_rules(&self, competitor: &str) -> Result<Vec<NotificationRule>> {
        Ok(lock(&self.rules)
            .iter()
            .filter(|r| r.active && r.competitor_name == competitor)
            .cloned()
            .collect())
    }

    async fn append_log(&self, log: &NotificationLog) -> Result<()> {
        lock(&self.logs).push(log.clone());
        Ok(())
    }

    async fn mark_triggered(&self, rule_id: u64, at: DateTime<Utc>) -> Result<()> {
        let mut rules = lock(&self.rules);
        match rules.iter_mut().find(|r| r.id == rule_id) {
            Some(rule) => {
                rule.last_triggered_at = Some(at);
                Ok(())
            }
            None => anyhow::bail!("rule {rule_id} not found"),
        }
    }
}

/// Matches a run's risk score against the competitor's active rules.
#[derive(Clone)]
pub struct NotificationEvaluator {
    store: Arc<dyn RuleStore>,
    notifier: Option<Arc<dyn Notifier>>,
}

impl NotificationEvaluator {
    pub fn new(store: Arc<dyn RuleStore>) -> Self {
        Self {
            store,
            notifier: None,
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Returns the logs written for this run. Store failures abort; delivery failures
    /// only warn.
    pub async fn evaluate(
        &self,
        competitor: &str,
        risk_score: i64,
        context: &Value,
    ) -> Result<Vec<NotificationLog>, PipelineError> {
        let rules = self
            .store
            .active_rules(competitor)
            .await
            .map_err(|e| PipelineError::RuleStore(format!("{e:#}")))?;

        let mut written = Vec::new();
        for rule in rules {
            if rule.condition_type != RISK_THRESHOLD {
                tracing::debug!(
                    rule_id = rule.id,
                    condition = %rule.condition_type,
                    "skipping unsupported rule condition"
                );
                continue;
            }
            if !rule.matches(risk_score) {
                continue;
            }

            let now = Utc::now();
            let message = json!({
                "rule_id": rule.id,
                "competitor": competitor,
                "condition_type": rule.condition_type,
                "threshold": rule.threshold_value,
                "risk_score": risk_score,
                "context": context,
            });
            let log = NotificationLog {
                rule_id: rule.id,
                competitor_name: competitor.to_string(),
                channel: rule.channel.clone(),
                target: rule.target.clone(),
                message: message.to_string(),
                created_at: now,
            };

            self.store
                .append_log(&log)
                .await
                .map_err(|e| PipelineError::RuleStore(format!("{e:#}")))?;
            self.store
                .mark_triggered(rule.id, now)
                .await
                .map_err(|e| PipelineError::RuleStore(format!("{e:#}")))?;

            counter!(NOTIFICATIONS_TRIGGERED_TOTAL).increment(1);
            tracing::info!(
                rule_id = rule.id,
                competitor,
                channel = %rule.channel,
                risk_score,
                "notification rule triggered"
            );

            if let Some(notifier) = &self.notifier {
                if let Err(e) = notifier.deliver(&rule, &log).await {
                    tracing::warn!(rule_id = rule.id, error = %format!("{e:#}"), "notification delivery failed");
                }
            }
            written.push(log);
        }
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(id: u64, condition: &str, threshold: Option<f64>) -> NotificationRule {
        NotificationRule {
            id,
            competitor_name: "Acme".into(),
            condition_type: condition.into(),
            threshold_value: threshold,
            channel: "email".into(),
            target: "team@example.com".into(),
            active: true,
            last_triggered_at: None,
        }
    }

    struct FailingNotifier;

    #[async_trait]
    impl Notifier for FailingNotifier {
        async fn deliver(&self, _rule: &NotificationRule, _log: &NotificationLog) -> Result<()> {
            anyhow::bail!("webhook down")
        }
    }

    struct BrokenStore;

    #[async_trait]
    impl RuleStore for BrokenStore {
        async fn active_rules(&self, _competitor: &str) -> Result<Vec<NotificationRule>> {
            anyhow::bail!("db gone")
        }
        async fn append_log(&self, _log: &NotificationLog) -> Result<()> {
            Ok(())
        }
        async fn mark_triggered(&self, _rule_id: u64, _at: DateTime<Utc>) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn threshold_rules_fire_at_or_above() {
        let mut inactive = rule(4, RISK_THRESHOLD, Some(10.0));
        inactive.active = false;
        let store = Arc::new(InMemoryRuleStore::new(vec![
            rule(1, RISK_THRESHOLD, Some(70.0)),
            rule(2, RISK_THRESHOLD, Some(76.0)),
            rule(3, "keyword_match", Some(0.0)),
            rule(5, RISK_THRESHOLD, None),
            inactive,
        ]));
        let eval = NotificationEvaluator::new(store.clone());

        let logs = eval
            .evaluate("Acme", 75, &json!({"risk_level": "high"}))
            .await
            .unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].rule_id, 1);
        assert_eq!(store.logs().len(), 1);

        let msg: Value = serde_json::from_str(&logs[0].message).unwrap();
        assert_eq!(msg["context"]["risk_level"], "high");
        assert_eq!(msg["risk_score"], 75);

        let stamped = store.rules().into_iter().find(|r| r.id == 1).unwrap();
        assert!(stamped.last_triggered_at.is_some());
        let untouched = store.rules().into_iter().find(|r| r.id == 2).unwrap();
        assert!(untouched.last_triggered_at.is_none());
    }

    #[tokio::test]
    async fn competitor_must_match_exactly() {
        let store = Arc::new(InMemoryRuleStore::new(vec![rule(1, RISK_THRESHOLD, Some(10.0))]));
        let eval = NotificationEvaluator::new(store.clone());
        for name in ["acme", " ACME ", "Acme "] {
            let logs = eval.evaluate(name, 90, &Value::Null).await.unwrap();
            assert!(logs.is_empty(), "{name:?} should not match \"Acme\"");
        }
        assert!(store.logs().is_empty());
        assert_eq!(eval.evaluate("Acme", 90, &Value::Null).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn delivery_failure_does_not_fail_evaluation() {
        let store = Arc::new(InMemoryRuleStore::new(vec![rule(1, RISK_THRESHOLD, Some(50.0))]));
        let eval = NotificationEvaluator::new(store.clone()).with_notifier(Arc::new(FailingNotifier));
        let logs = eval.evaluate("Acme", 90, &Value::Null).await.unwrap();
        assert_eq!(logs.len(), 1);
    }

    #[tokio::test]
    async fn store_failure_is_a_pipeline_error() {
        let eval = NotificationEvaluator::new(Arc::new(BrokenStore));
        let err = eval.evaluate("Acme", 90, &Value::Null).await.unwrap_err();
        assert!(matches!(err, PipelineError::RuleStore(_)));
    }
}
