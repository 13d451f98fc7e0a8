// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Action index monitor.
//!
//! Polls the action index past the dispatcher's checkpoint and hands new
//! documents to the dispatcher, which raises the checkpoint and fans them
//! out to waiting check-ins. Expired documents still advance the checkpoint
//! but are not delivered.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::domain::repository::{ActionSearch, RepositoryError};
use crate::domain::subscription::ActionDispatcher;
use crate::infrastructure::subscriptions::InMemoryActionDispatcher;

/// Most documents read per poll.
pub const DEFAULT_BATCH_SIZE: usize = 1000;

pub struct ActionMonitor {
    search: Arc<dyn ActionSearch>,
    dispatcher: Arc<InMemoryActionDispatcher>,
    poll_interval: Duration,
    batch_size: usize,
}

impl ActionMonitor {
    pub fn new(
        search: Arc<dyn ActionSearch>,
        dispatcher: Arc<InMemoryActionDispatcher>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            search,
            dispatcher,
            poll_interval,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Dispatch everything indexed past the checkpoint.
    ///
    /// Returns the number of documents read.
    pub async fn poll_once(&self) -> Result<usize, RepositoryError> {
        let mut total = 0;
        loop {
            let since = self.dispatcher.checkpoint();
            let docs = self.search.search_since(since, self.batch_size).await?;
            let Some(last_seq_no) = docs.last().map(|doc| doc.seq_no) else {
                break;
            };
            let read = docs.len();
            total += read;

            let now = Utc::now();
            let live: Vec<_> = docs.into_iter().filter(|doc| !doc.is_expired(now)).collect();
            self.dispatcher.dispatch(live);
            self.dispatcher.set_checkpoint(last_seq_no);

            if read < self.batch_size {
                break;
            }
        }

        if total > 0 {
            debug!(count = total, checkpoint = self.dispatcher.checkpoint(), "Dispatched new actions");
        }
        Ok(total)
    }

    /// Poll until `shutdown` fires. Failed polls are retried on the next tick.
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        info!(interval = ?self.poll_interval, "Starting action monitor");

        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Action monitor stopped");
                    return;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.poll_once().await {
                        warn!(error = %e, "Failed to poll action index");
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::action::ActionDoc;
    use crate::infrastructure::memory_store::InMemoryDocumentStore;
    use serde_json::json;

    fn doc(agents: &[&str]) -> ActionDoc {
        ActionDoc {
            doc_id: String::new(),
            seq_no: 0,
            action_id: uuid::Uuid::new_v4().to_string(),
            action_type: "UPGRADE".to_string(),
            agents: agents.iter().map(|a| a.to_string()).collect(),
            data: json!({}),
            timestamp: Utc::now(),
            expiration: None,
        }
    }

    fn monitor(store: &Arc<InMemoryDocumentStore>, dispatcher: &Arc<InMemoryActionDispatcher>) -> ActionMonitor {
        ActionMonitor::new(store.clone(), dispatcher.clone(), Duration::from_secs(1))
    }

    #[tokio::test]
    async fn test_poll_raises_checkpoint_across_batches() {
        let store = Arc::new(InMemoryDocumentStore::new());
        let dispatcher = Arc::new(InMemoryActionDispatcher::new(4));
        for _ in 0..5 {
            store.index_action(doc(&["agent-1"]));
        }

        let monitor = monitor(&store, &dispatcher).with_batch_size(2);
        assert_eq!(monitor.poll_once().await.unwrap(), 5);
        assert_eq!(dispatcher.checkpoint(), 5);
        assert_eq!(monitor.poll_once().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_expired_actions_advance_without_delivery() {
        let store = Arc::new(InMemoryDocumentStore::new());
        let dispatcher = Arc::new(InMemoryActionDispatcher::new(4));
        let mut sub = dispatcher.subscribe("agent-1", 0);

        let mut expired = doc(&["agent-1"]);
        expired.expiration = Some(Utc::now() - chrono::Duration::minutes(1));
        store.index_action(expired);

        monitor(&store, &dispatcher).poll_once().await.unwrap();
        assert_eq!(dispatcher.checkpoint(), 1);
        assert!(sub.receiver.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_delivers_to_subscribers() {
        let store = Arc::new(InMemoryDocumentStore::new());
        let dispatcher = Arc::new(InMemoryActionDispatcher::new(4));
        let mut sub = dispatcher.subscribe("agent-1", 0);
        let shutdown = CancellationToken::new();

        let handle = tokio::spawn(Arc::new(monitor(&store, &dispatcher)).run(shutdown.clone()));
        let indexed = store.index_action(doc(&["agent-1"]));

        let batch = sub.receiver.recv().await.unwrap();
        assert_eq!(batch[0].doc_id, indexed.doc_id);

        shutdown.cancel();
        handle.await.unwrap();
    }
}
