// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Batched Check-in Writer
//!
//! Coalesces per-agent liveness and metadata updates in memory and writes
//! them out on a fixed interval. Each flush issues one structured bulk update
//! to the document store and, when any entry advanced its sequence number, one
//! raw partial-document bulk update to the indexer.
//!
//! Pending entries are last-write-wins per agent. A failed flush drops its
//! batch; the next check-in from each agent re-queues fresh data.

use chrono::Utc;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::application::error::CheckinError;
use crate::domain::action::format_timestamp;
use crate::domain::agent::{
    Fields, AGENT_DOC_TYPE, FIELD_ACTION_SEQ_NO, FIELD_LAST_CHECKIN, FIELD_UPDATED_AT,
};
use crate::domain::repository::{BulkIndexer, BulkOp, DocumentStore, UpdateOp, WriteOptions};

/// Queued update for one agent.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingData {
    pub fields: Fields,
    /// Negative means no sequence-number advance.
    pub seq_no: i64,
}

pub struct BulkCheckin {
    store: Arc<dyn DocumentStore>,
    indexer: Arc<dyn BulkIndexer>,
    pending: Mutex<HashMap<String, PendingData>>,
    flush_interval: Duration,
}

impl BulkCheckin {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        indexer: Arc<dyn BulkIndexer>,
        flush_interval: Duration,
    ) -> Self {
        Self {
            store,
            indexer,
            pending: Mutex::new(HashMap::new()),
            flush_interval,
        }
    }

    /// Record that `agent_id` is alive now. Never touches I/O.
    pub fn check_in(&self, agent_id: &str, fields: Option<Fields>, seq_no: i64) {
        let mut fields = fields.unwrap_or_default();
        fields.insert(
            FIELD_LAST_CHECKIN.to_string(),
            Value::String(format_timestamp(Utc::now())),
        );

        self.pending
            .lock()
            .insert(agent_id.to_string(), PendingData { fields, seq_no });

        metrics::counter!("fleet_checkins_total").increment(1);
    }

    pub fn pending(&self, agent_id: &str) -> Option<PendingData> {
        self.pending.lock().get(agent_id).cloned()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.lock().len()
    }

    /// Run the flush loop until `shutdown` fires.
    ///
    /// Always ends with `CheckinError::Cancelled`. A flush that is already
    /// running when shutdown fires completes first.
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) -> Result<(), CheckinError> {
        info!(interval = ?self.flush_interval, "Starting bulk check-in flush loop");

        let start = tokio::time::Instant::now() + self.flush_interval;
        let mut ticker = tokio::time::interval_at(start, self.flush_interval);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Bulk check-in flush loop stopped");
                    return Err(CheckinError::Cancelled);
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.flush().await {
                        error!(error = %e, "Bulk check-in flush failed, batch dropped");
                    }
                }
            }
        }
    }

    /// Write out everything queued since the previous flush.
    pub async fn flush(&self) -> Result<(), CheckinError> {
        let snapshot = std::mem::take(&mut *self.pending.lock());
        if snapshot.is_empty() {
            return Ok(());
        }

        let started = Instant::now();
        let now = format_timestamp(Utc::now());
        let count = snapshot.len();

        let mut updates = Vec::with_capacity(count);
        let mut seq_ops = Vec::new();

        for (agent_id, data) in snapshot {
            if data.seq_no >= 0 {
                seq_ops.push(BulkOp {
                    index: AGENT_DOC_TYPE.to_string(),
                    id: agent_id.clone(),
                    body: json!({
                        "doc": {
                            FIELD_ACTION_SEQ_NO: data.seq_no,
                            FIELD_UPDATED_AT: now,
                        }
                    }),
                });
            }

            updates.push(UpdateOp {
                doc_type: AGENT_DOC_TYPE.to_string(),
                id: agent_id,
                fields: data.fields,
            });
        }

        metrics::counter!("fleet_checkin_flush_total").increment(1);
        metrics::histogram!("fleet_checkin_flush_agents").record(count as f64);

        if let Err(e) = self.store.m_update(updates).await {
            metrics::counter!("fleet_checkin_flush_errors_total").increment(1);
            return Err(e.into());
        }

        if !seq_ops.is_empty() {
            let seq_count = seq_ops.len();
            if let Err(e) = self.indexer.bulk_update(seq_ops, WriteOptions::refresh()).await {
                metrics::counter!("fleet_checkin_flush_errors_total").increment(1);
                warn!(error = %e, agents = seq_count, "Failed to update agent sequence numbers");
            }
        }

        debug!(rtt = ?started.elapsed(), cnt = count, "Flushed bulk check-ins");

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::agent::FIELD_LOCAL_METADATA;
    use crate::domain::repository::{FindQuery, Hit, RepositoryError};
    use async_trait::async_trait;

    #[derive(Default)]
    struct RecordingStore {
        calls: Mutex<Vec<Vec<UpdateOp>>>,
        fail: bool,
    }

    #[async_trait]
    impl DocumentStore for RecordingStore {
        async fn read(&self, _doc_type: &str, id: &str) -> Result<Value, RepositoryError> {
            Err(RepositoryError::NotFound(id.to_string()))
        }

        async fn update(
            &self,
            _doc_type: &str,
            _id: &str,
            _fields: Fields,
            _opts: WriteOptions,
        ) -> Result<(), RepositoryError> {
            Ok(())
        }

        async fn m_update(&self, updates: Vec<UpdateOp>) -> Result<(), RepositoryError> {
            self.calls.lock().push(updates);
            if self.fail {
                return Err(RepositoryError::Database("store unavailable".to_string()));
            }
            Ok(())
        }

        async fn create(
            &self,
            _doc_type: &str,
            _doc: Value,
            _opts: WriteOptions,
        ) -> Result<String, RepositoryError> {
            Ok(String::new())
        }

        async fn find_raw(&self, _query: &FindQuery) -> Result<Vec<Hit>, RepositoryError> {
            Ok(vec![])
        }
    }

    #[derive(Default)]
    struct RecordingIndexer {
        calls: Mutex<Vec<(Vec<BulkOp>, WriteOptions)>>,
    }

    #[async_trait]
    impl BulkIndexer for RecordingIndexer {
        async fn bulk_update(&self, ops: Vec<BulkOp>, opts: WriteOptions) -> Result<(), RepositoryError> {
            self.calls.lock().push((ops, opts));
            Ok(())
        }
    }

    fn writer(fail: bool) -> (BulkCheckin, Arc<RecordingStore>, Arc<RecordingIndexer>) {
        let store = Arc::new(RecordingStore {
            fail,
            ..Default::default()
        });
        let indexer = Arc::new(RecordingIndexer::default());
        let bc = BulkCheckin::new(store.clone(), indexer.clone(), Duration::from_secs(10));
        (bc, store, indexer)
    }

    #[test]
    fn test_last_write_wins() {
        let (bc, _, _) = writer(false);

        let mut first = Fields::new();
        first.insert(FIELD_LOCAL_METADATA.to_string(), json!({"v": 1}));
        bc.check_in("agent-1", Some(first), 4);
        bc.check_in("agent-1", None, -1);

        let pending = bc.pending("agent-1").unwrap();
        assert_eq!(pending.seq_no, -1);
        assert!(pending.fields.get(FIELD_LOCAL_METADATA).is_none());
        assert!(pending.fields.contains_key(FIELD_LAST_CHECKIN));
        assert_eq!(bc.pending_len(), 1);
    }

    #[tokio::test]
    async fn test_empty_flush_writes_nothing() {
        let (bc, store, indexer) = writer(false);
        bc.flush().await.unwrap();
        assert!(store.calls.lock().is_empty());
        assert!(indexer.calls.lock().is_empty());
    }

    #[tokio::test]
    async fn test_flush_splits_metadata_and_seq_no() {
        let (bc, store, indexer) = writer(false);
        bc.check_in("a", None, 3);
        bc.check_in("b", None, -1);
        bc.check_in("c", None, 0);

        bc.flush().await.unwrap();

        let store_calls = store.calls.lock();
        assert_eq!(store_calls.len(), 1);
        assert_eq!(store_calls[0].len(), 3);

        let indexer_calls = indexer.calls.lock();
        assert_eq!(indexer_calls.len(), 1);
        let (ops, opts) = &indexer_calls[0];
        assert_eq!(ops.len(), 2);
        assert!(opts.refresh);
        let a = ops.iter().find(|op| op.id == "a").unwrap();
        assert_eq!(a.body["doc"][FIELD_ACTION_SEQ_NO], 3);

        assert_eq!(bc.pending_len(), 0);
    }

    #[tokio::test]
    async fn test_no_seq_no_update_without_advances() {
        let (bc, store, indexer) = writer(false);
        bc.check_in("a", None, -1);
        bc.flush().await.unwrap();
        assert_eq!(store.calls.lock().len(), 1);
        assert!(indexer.calls.lock().is_empty());
    }

    #[tokio::test]
    async fn test_failed_metadata_update_skips_seq_no() {
        let (bc, store, indexer) = writer(true);
        bc.check_in("a", None, 7);

        assert!(bc.flush().await.is_err());
        assert_eq!(store.calls.lock().len(), 1);
        assert!(indexer.calls.lock().is_empty());
        // Batch is dropped, not re-queued.
        assert_eq!(bc.pending_len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_flushes_on_interval_and_stops_on_cancel() {
        let (bc, store, _) = writer(false);
        let bc = Arc::new(bc);
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(bc.clone().run(shutdown.clone()));

        bc.check_in("a", None, -1);
        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(store.calls.lock().len(), 1);

        shutdown.cancel();
        let result = handle.await.unwrap();
        assert!(matches!(result, Err(CheckinError::Cancelled)));
    }
}
