// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Legacy per-agent action queue.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::domain::action::Action;
use crate::domain::subscription::{ActionQueue, Subscription, SubscriptionError, SubscriptionId};

struct Subscriber {
    agent_id: String,
    sender: mpsc::Sender<Vec<Action>>,
}

pub struct InMemoryActionQueue {
    subscribers: RwLock<HashMap<SubscriptionId, Subscriber>>,
    capacity: usize,
    closed: AtomicBool,
}

impl InMemoryActionQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            subscribers: RwLock::new(HashMap::new()),
            capacity: capacity.max(1),
            closed: AtomicBool::new(false),
        }
    }

    /// Deliver `actions` to every subscriber they apply to.
    ///
    /// Actions with an empty `agent_id` go to all subscribers. Returns the
    /// number of subscribers that received a batch.
    pub fn publish(&self, actions: &[Action]) -> usize {
        let subscribers = self.subscribers.read();
        let mut delivered = 0;

        for (id, sub) in subscribers.iter() {
            let batch: Vec<Action> = actions
                .iter()
                .filter(|a| a.agent_id.is_empty() || a.agent_id == sub.agent_id)
                .cloned()
                .collect();
            if batch.is_empty() {
                continue;
            }
            match sub.sender.try_send(batch) {
                Ok(()) => delivered += 1,
                Err(e) => warn!(subscription = %id, agent_id = %sub.agent_id, error = %e, "Dropped legacy action delivery"),
            }
        }

        debug!(actions = actions.len(), delivered, "Published legacy actions");
        delivered
    }

    /// Refuse new subscriptions and drop every queue.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.subscribers.write().clear();
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }
}

impl ActionQueue for InMemoryActionQueue {
    fn subscribe(&self, agent_id: &str) -> Result<Subscription<Vec<Action>>, SubscriptionError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(SubscriptionError::Closed);
        }
        let (sender, receiver) = mpsc::channel(self.capacity);
        let id = SubscriptionId::next();
        self.subscribers.write().insert(
            id,
            Subscriber {
                agent_id: agent_id.to_string(),
                sender,
            },
        );
        Ok(Subscription::new(id, receiver))
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        self.subscribers.write().remove(&id);
    }
}
