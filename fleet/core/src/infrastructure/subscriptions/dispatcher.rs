// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Sequence-number-aware action dispatcher.
//!
//! Each subscriber carries a cursor. A dispatched document reaches a
//! subscriber only if it targets the subscriber's agent and its `seq_no` is
//! past the cursor; the cursor advances on successful delivery.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use tokio::sync::mpsc;
use tracing::warn;

use crate::domain::action::ActionDoc;
use crate::domain::subscription::{ActionDispatcher, Subscription, SubscriptionId};

struct Subscriber {
    agent_id: String,
    cursor: i64,
    sender: mpsc::Sender<Vec<ActionDoc>>,
}

pub struct InMemoryActionDispatcher {
    subscribers: Mutex<HashMap<SubscriptionId, Subscriber>>,
    checkpoint: AtomicI64,
    capacity: usize,
}

impl InMemoryActionDispatcher {
    pub fn new(capacity: usize) -> Self {
        Self::with_checkpoint(capacity, 0)
    }

    pub fn with_checkpoint(capacity: usize, checkpoint: i64) -> Self {
        Self {
            subscribers: Mutex::new(HashMap::new()),
            checkpoint: AtomicI64::new(checkpoint),
            capacity: capacity.max(1),
        }
    }

    /// Raise the global checkpoint. Lower values are ignored.
    pub fn set_checkpoint(&self, seq_no: i64) {
        self.checkpoint.fetch_max(seq_no, Ordering::SeqCst);
    }

    /// Fan newly indexed documents out to subscribers.
    ///
    /// Documents are delivered in `seq_no` order and the checkpoint is raised
    /// to the highest one seen.
    pub fn dispatch(&self, mut docs: Vec<ActionDoc>) {
        if docs.is_empty() {
            return;
        }
        docs.sort_by_key(|doc| doc.seq_no);
        if let Some(last) = docs.last() {
            self.set_checkpoint(last.seq_no);
        }

        let mut subscribers = self.subscribers.lock();
        for (id, sub) in subscribers.iter_mut() {
            let batch: Vec<ActionDoc> = docs
                .iter()
                .filter(|doc| doc.seq_no > sub.cursor && doc.targets(&sub.agent_id))
                .cloned()
                .collect();
            let Some(last_seq_no) = batch.last().map(|doc| doc.seq_no) else {
                continue;
            };
            match sub.sender.try_send(batch) {
                Ok(()) => sub.cursor = last_seq_no,
                Err(e) => warn!(subscription = %id, agent_id = %sub.agent_id, error = %e, "Dropped action dispatch"),
            }
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}

impl ActionDispatcher for InMemoryActionDispatcher {
    fn subscribe(&self, agent_id: &str, since_seq_no: i64) -> Subscription<Vec<ActionDoc>> {
        let (sender, receiver) = mpsc::channel(self.capacity);
        let id = SubscriptionId::next();
        self.subscribers.lock().insert(
            id,
            Subscriber {
                agent_id: agent_id.to_string(),
                cursor: since_seq_no,
                sender,
            },
        );
        Subscription::new(id, receiver)
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        self.subscribers.lock().remove(&id);
    }

    fn checkpoint(&self) -> i64 {
        self.checkpoint.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    fn doc(seq_no: i64, agents: &[&str]) -> ActionDoc {
        ActionDoc {
            doc_id: format!("doc-{}", seq_no),
            seq_no,
            action_id: format!("action-{}", seq_no),
            action_type: "UPGRADE".to_string(),
            agents: agents.iter().map(|a| a.to_string()).collect(),
            data: json!({}),
            timestamp: Utc::now(),
            expiration: None,
        }
    }

    #[tokio::test]
    async fn test_dispatch_respects_cursor_and_target() {
        let dispatcher = InMemoryActionDispatcher::new(4);
        let mut sub = dispatcher.subscribe("agent-1", 2);

        dispatcher.dispatch(vec![doc(3, &["agent-1"]), doc(1, &["agent-1"]), doc(2, &["agent-2"])]);
        let batch = sub.receiver.recv().await.unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].seq_no, 3);
        assert_eq!(dispatcher.checkpoint(), 3);

        // Already delivered documents are not sent again.
        dispatcher.dispatch(vec![doc(3, &["agent-1"])]);
        assert!(sub.receiver.try_recv().is_err());
    }

    #[test]
    fn test_checkpoint_only_rises() {
        let dispatcher = InMemoryActionDispatcher::with_checkpoint(4, 10);
        dispatcher.set_checkpoint(5);
        assert_eq!(dispatcher.checkpoint(), 10);
        dispatcher.set_checkpoint(12);
        assert_eq!(dispatcher.checkpoint(), 12);
    }

    #[test]
    fn test_unsubscribe() {
        let dispatcher = InMemoryActionDispatcher::new(4);
        let sub = dispatcher.subscribe("agent-1", 0);
        assert_eq!(dispatcher.subscriber_count(), 1);
        dispatcher.unsubscribe(sub.id);
        assert_eq!(dispatcher.subscriber_count(), 0);
    }
}
