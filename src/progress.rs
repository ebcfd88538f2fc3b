// src/progress.rs
//! Stage progress events for observers of a pipeline run.
//!
//! Events are fire-and-forget: no room means nothing is published, and a failing
//! transport only costs a warning.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::sync::broadcast;

/// Event name for completed pipeline stages.
pub const STEP_EVENT: &str = "impact_generation_step";

/// One published event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressEvent {
    pub room: String,
    pub event: String,
    pub payload: Value,
}

/// Pub/sub transport addressed by room.
#[async_trait]
pub trait ProgressTransport: Send + Sync {
    async fn publish(&self, room: &str, event: &str, payload: &Value) -> Result<()>;
}

/// In-process fan-out over a `tokio::sync::broadcast` channel.
#[derive(Clone)]
pub struct BroadcastTransport {
    tx: broadcast::Sender<ProgressEvent>,
}

impl BroadcastTransport {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.tx.subscribe()
    }
}

#[async_trait]
impl ProgressTransport for BroadcastTransport {
    async fn publish(&self, room: &str, event: &str, payload: &Value) -> Result<()> {
        let ev = ProgressEvent {
            room: room.to_string(),
            event: event.to_string(),
            payload: payload.clone(),
        };
        match self.tx.send(ev) {
            Ok(receivers) => tracing::debug!(room, event, receivers, "progress event broadcast"),
            // No subscribers is not an error.
            Err(_) => tracing::debug!(room, event, "no progress subscribers"),
        }
        Ok(())
    }
}

/// Mirrors events to the log; used by the binary.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogTransport;

#[async_trait]
impl ProgressTransport for LogTransport {
    async fn publish(&self, room: &str, event: &str, payload: &Value) -> Result<()> {
        tracing::info!(room, event, payload = %payload, "progress");
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct ProgressEmitter {
    transport: Option<Arc<dyn ProgressTransport>>,
    room: Option<String>,
}

impl ProgressEmitter {
    pub fn new(transport: Arc<dyn ProgressTransport>, room: Option<String>) -> Self {
        Self {
            transport: Some(transport),
            room: room.filter(|r| !r.trim().is_empty()),
        }
    }

    /// Emitter that never publishes.
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn room(&self) -> Option<&str> {
        self.room.as_deref()
    }

    /// Publish to `room`, falling back to the emitter's default room.
    pub async fn emit(&self, event: &str, payload: &Value, room: Option<&str>) {
        let Some(transport) = &self.transport else {
            return;
        };
        let Some(room) = room.or(self.room.as_deref()) else {
            return;
        };
        if let Err(e) = transport.publish(room, event, payload).await {
            tracing::warn!(room, event, error = %format!("{e:#}"), "progress publish failed");
        }
    }

    /// `{event, competitor, step, ...details}` for a finished stage.
    pub async fn stage_completed(&self, competitor: &str, step: &str, details: Value) {
        let mut payload = Map::new();
        payload.insert("event".into(), Value::from(STEP_EVENT));
        payload.insert("competitor".into(), Value::from(competitor));
        payload.insert("step".into(), Value::from(step));
        if let Value::Object(extra) = details {
            for (k, v) in extra {
                payload.entry(k).or_insert(v);
            }
        }
        self.emit(STEP_EVENT, &Value::Object(payload), None).await;
    }
}
