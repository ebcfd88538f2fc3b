// src/clients/call_log.rs
//! Durable log of external call attempts.
//!
//! Call sites hand records to a [`CallLogger`], which only enqueues them on a bounded
//! channel. A background task drains the channel into a [`CallLogStore`]. A full channel
//! or a failing store costs a warning, never the request.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use async_trait::async_trait;
use metrics::counter;
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, oneshot};

use crate::metrics::CALL_LOG_DROPPED_TOTAL;
use crate::types::CallRecord;

/// Append-only sink for call records (owned by the persistence collaborator).
#[async_trait]
pub trait CallLogStore: Send + Sync {
    async fn append(&self, record: &CallRecord) -> Result<()>;
}

enum Command {
    Record(CallRecord),
    Flush(oneshot::Sender<()>),
}

/// Cheap-to-clone handle feeding the background writer.
#[derive(Clone, Default)]
pub struct CallLogger {
    tx: Option<mpsc::Sender<Command>>,
}

impl std::fmt::Debug for CallLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallLogger")
            .field("enabled", &self.tx.is_some())
            .finish()
    }
}

impl CallLogger {
    /// Spawn the background writer. Must be called inside a Tokio runtime.
    pub fn spawn(store: Arc<dyn CallLogStore>, capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        tokio::spawn(drain(store, rx));
        Self { tx: Some(tx) }
    }

    /// Logger that discards everything.
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    /// Enqueue a record without waiting.
    pub fn record(&self, record: CallRecord) {
        let Some(tx) = &self.tx else {
            return;
        };
        if let Err(e) = tx.try_send(Command::Record(record)) {
            let reason = match e {
                mpsc::error::TrySendError::Full(_) => "channel full",
                mpsc::error::TrySendError::Closed(_) => "writer stopped",
            };
            tracing::warn!(reason, "dropping api call record");
            counter!(CALL_LOG_DROPPED_TOTAL).increment(1);
        }
    }

    /// Wait until every record enqueued before this call has reached the store.
    pub async fn flush(&self) {
        let Some(tx) = &self.tx else {
            return;
        };
        let (ack_tx, ack_rx) = oneshot::channel();
        if tx.send(Command::Flush(ack_tx)).await.is_ok() {
            let _ = ack_rx.await;
        }
    }
}

async fn drain(store: Arc<dyn CallLogStore>, mut rx: mpsc::Receiver<Command>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            Command::Record(record) => {
                if let Err(e) = store.append(&record).await {
                    tracing::warn!(
                        error = %format!("{e:#}"),
                        api = %record.api_type,
                        "failed to write api call record"
                    );
                }
            }
            Command::Flush(ack) => {
                let _ = ack.send(());
            }
        }
    }
    tracing::debug!("call log writer stopped");
}

/// JSON-lines file, one record per line.
pub struct JsonlCallLogStore {
    path: PathBuf,
    lock: tokio::sync::Mutex<()>,
}

impl JsonlCallLogStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl CallLogStore for JsonlCallLogStore {
    async fn append(&self, record: &CallRecord) -> Result<()> {
        let mut line = serde_json::to_string(record).context("serialize call record")?;
        line.push('\n');

        let _guard = self.lock.lock().await;
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir)
                .await
                .with_context(|| format!("create {}", dir.display()))?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .with_context(|| format!("open {}", self.path.display()))?;
        file.write_all(line.as_bytes())
            .await
            .context("append call record")?;
        Ok(())
    }
}

/// In-process store, handy for tests and embedding.
#[derive(Default)]
pub struct MemoryCallLogStore {
    records: Mutex<Vec<CallRecord>>,
}

impl MemoryCallLogStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<CallRecord> {
        match self.records.lock() {
            Ok(g) => g.clone(),
            Err(poison) => poison.into_inner().clone(),
        }
    }
}

#[async_trait]
impl CallLogStore for MemoryCallLogStore {
    async fn append(&self, record: &CallRecord) -> Result<()> {
        self.records
            .lock()
            .map_err(|_| anyhow::anyhow!("call log mutex poisoned"))?
            .push(record.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ApiType;

    struct BrokenStore;

    #[async_trait]
    impl CallLogStore for BrokenStore {
        async fn append(&self, _record: &CallRecord) -> Result<()> {
            anyhow::bail!("disk on fire")
        }
    }

    #[tokio::test]
    async fn flush_waits_for_enqueued_records() {
        let store = Arc::new(MemoryCallLogStore::new());
        let logger = CallLogger::spawn(store.clone(), 16);
        for _ in 0..3 {
            logger.record(CallRecord::succeeded(ApiType::News, "u", 200, 1.0));
        }
        logger.flush().await;
        assert_eq!(store.records().len(), 3);
    }

    #[tokio::test]
    async fn failing_store_is_not_fatal() {
        let logger = CallLogger::spawn(Arc::new(BrokenStore), 4);
        logger.record(CallRecord::failed(
            ApiType::Search,
            "u",
            Some(500),
            2.0,
            "HTTP 500".into(),
        ));
        // Writer keeps running after the failed append.
        logger.flush().await;
        logger.record(CallRecord::succeeded(ApiType::Search, "u", 200, 1.0));
        logger.flush().await;
    }

    #[tokio::test]
    async fn jsonl_store_appends_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/calls.jsonl");
        let store = JsonlCallLogStore::new(&path);
        store
            .append(&CallRecord::succeeded(ApiType::Research, "u", 200, 3.5))
            .await
            .unwrap();
        store
            .append(&CallRecord::failed(ApiType::Research, "u", None, 1.0, "timeout".into()))
            .await
            .unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        let second: CallRecord = serde_json::from_str(lines[1]).unwrap();
        assert!(!second.success);
        assert_eq!(second.error_message.as_deref(), Some("timeout"));
    }

    #[test]
    fn disabled_logger_is_noop() {
        let logger = CallLogger::disabled();
        logger.record(CallRecord::succeeded(ApiType::News, "u", 200, 1.0));
    }
}
