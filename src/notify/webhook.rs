// src/notify/webhook.rs
//! Webhook delivery for fired rules. `slack` and `discord` targets are webhook URLs;
//! every other channel is log-only here and left to whoever consumes the notification
//! log.

use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;

use super::{NotificationLog, NotificationRule, Notifier};

#[derive(Clone)]
pub struct WebhookDispatcher {
    client: Client,
    timeout: Duration,
    max_retries: u8,
    /// First retry delay; doubles per attempt.
    backoff: Duration,
}

impl Default for WebhookDispatcher {
    fn default() -> Self {
        Self::new(Client::new())
    }
}

impl WebhookDispatcher {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            timeout: Duration::from_secs(5),
            max_retries: 3,
            backoff: Duration::from_millis(500),
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }

    pub fn with_retries(mut self, retries: u8) -> Self {
        self.max_retries = retries.max(1);
        self
    }

    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    async fn post<T: Serialize + ?Sized>(&self, url: &str, body: &T) -> Result<()> {
        let mut attempt: u8 = 0;
        loop {
            attempt += 1;
            let res = self
                .client
                .post(url)
                .timeout(self.timeout)
                .json(body)
                .send()
                .await;

            let err = match res {
                Ok(rsp) => match rsp.error_for_status_ref() {
                    Ok(_) => return Ok(()),
                    Err(e) => anyhow!("webhook HTTP error: {e}"),
                },
                Err(e) => anyhow!("webhook request failed: {e}"),
            };
            if attempt >= self.max_retries {
                return Err(err);
            }
            tokio::time::sleep(self.backoff.saturating_mul(1u32 << (attempt - 1).min(16))).await;
        }
    }
}

/// One-line human summary of a notification message.
fn summary(log: &NotificationLog) -> String {
    let msg: Value = serde_json::from_str(&log.message).unwrap_or(Value::Null);
    let risk = msg.get("risk_score").and_then(Value::as_i64);
    let level = msg
        .pointer("/context/risk_level")
        .and_then(Value::as_str)
        .unwrap_or("unknown");
    match risk {
        Some(score) => format!(
            "Impact alert for {}: risk {score} ({level}), rule #{}",
            log.competitor_name, log.rule_id
        ),
        None => format!("Impact alert for {}, rule #{}", log.competitor_name, log.rule_id),
    }
}

#[derive(Serialize)]
struct SlackPayload {
    text: String,
}

#[derive(Serialize)]
struct DiscordEmbed {
    title: String,
    description: String,
}

#[derive(Serialize)]
struct DiscordPayload {
    content: Option<String>,
    embeds: Vec<DiscordEmbed>,
}

#[async_trait]
impl Notifier for WebhookDispatcher {
    async fn deliver(&self, rule: &NotificationRule, log: &NotificationLog) -> Result<()> {
        match rule.channel.to_ascii_lowercase().as_str() {
            "slack" => {
                let body = SlackPayload {
                    text: format!("*{}*\n```{}```", summary(log), log.message),
                };
                self.post(&rule.target, &body).await
            }
            "discord" => {
                let body = DiscordPayload {
                    content: None,
                    embeds: vec![DiscordEmbed {
                        title: summary(log),
                        description: format!(
                            "**Time (UTC):** {}\n```json\n{}\n```",
                            log.created_at.to_rfc3339(),
                            log.message
                        ),
                    }],
                };
                self.post(&rule.target, &body).await
            }
            other => {
                tracing::debug!(channel = other, rule_id = rule.id, "channel is log-only");
                Ok(())
            }
        }
    }
}
