// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Policy revision monitor.
//!
//! Tracks the newest policy-change action per policy id. Subscribers behind
//! the newest known revision receive it immediately; later publications
//! reach every subscriber whose revision they exceed.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::domain::action::Action;
use crate::domain::subscription::{PolicyMonitor, Subscription, SubscriptionError, SubscriptionId};

struct Subscriber {
    policy_id: String,
    revision: i64,
    sender: mpsc::Sender<Action>,
}

#[derive(Default)]
struct State {
    subscribers: HashMap<SubscriptionId, Subscriber>,
    latest: HashMap<String, Action>,
}

pub struct InMemoryPolicyMonitor {
    state: Mutex<State>,
    capacity: usize,
    closed: AtomicBool,
}

impl InMemoryPolicyMonitor {
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(State::default()),
            capacity: capacity.max(1),
            closed: AtomicBool::new(false),
        }
    }

    /// Record a new policy revision and notify subscribers behind it.
    ///
    /// Revisions at or below the newest known one are ignored.
    pub fn publish(&self, action: Action) {
        let mut state = self.state.lock();

        if let Some(latest) = state.latest.get(&action.policy_id) {
            if latest.policy_revision >= action.policy_revision {
                debug!(policy_id = %action.policy_id, revision = action.policy_revision, "Ignoring stale policy revision");
                return;
            }
        }

        for (id, sub) in state.subscribers.iter_mut() {
            if sub.policy_id != action.policy_id || sub.revision >= action.policy_revision {
                continue;
            }
            match sub.sender.try_send(action.clone()) {
                Ok(()) => sub.revision = action.policy_revision,
                Err(e) => warn!(subscription = %id, policy_id = %sub.policy_id, error = %e, "Dropped policy delivery"),
            }
        }

        state.latest.insert(action.policy_id.clone(), action);
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.state.lock().subscribers.clear();
    }

    pub fn subscriber_count(&self) -> usize {
        self.state.lock().subscribers.len()
    }
}

impl PolicyMonitor for InMemoryPolicyMonitor {
    fn subscribe(&self, policy_id: &str, revision: i64) -> Result<Subscription<Action>, SubscriptionError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(SubscriptionError::Closed);
        }

        let (sender, receiver) = mpsc::channel(self.capacity);
        let id = SubscriptionId::next();
        let mut state = self.state.lock();

        let mut known = revision;
        if let Some(latest) = state.latest.get(policy_id) {
            if latest.policy_revision > revision && sender.try_send(latest.clone()).is_ok() {
                known = latest.policy_revision;
            }
        }

        state.subscribers.insert(
            id,
            Subscriber {
                policy_id: policy_id.to_string(),
                revision: known,
                sender,
            },
        );
        Ok(Subscription::new(id, receiver))
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        self.state.lock().subscribers.remove(&id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(policy_id: &str, rev: i64) -> Action {
        Action {
            id: format!("{}-{}", policy_id, rev),
            action_type: "POLICY_CHANGE".to_string(),
            policy_id: policy_id.to_string(),
            policy_revision: rev,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_publish_reaches_older_revisions_only() {
        let monitor = InMemoryPolicyMonitor::new(4);
        let mut behind = monitor.subscribe("p1", 1).unwrap();
        let mut current = monitor.subscribe("p1", 3).unwrap();
        let mut other = monitor.subscribe("p2", 0).unwrap();

        monitor.publish(policy("p1", 3));

        assert_eq!(behind.receiver.recv().await.unwrap().policy_revision, 3);
        assert!(current.receiver.try_recv().is_err());
        assert!(other.receiver.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_late_subscriber_gets_latest() {
        let monitor = InMemoryPolicyMonitor::new(4);
        monitor.publish(policy("p1", 5));
        monitor.publish(policy("p1", 4));

        let mut sub = monitor.subscribe("p1", 2).unwrap();
        assert_eq!(sub.receiver.recv().await.unwrap().policy_revision, 5);

        let mut up_to_date = monitor.subscribe("p1", 5).unwrap();
        assert!(up_to_date.receiver.try_recv().is_err());
    }

    #[test]
    fn test_close_rejects_subscribe() {
        let monitor = InMemoryPolicyMonitor::new(4);
        let sub = monitor.subscribe("p1", 0).unwrap();
        monitor.unsubscribe(sub.id);
        assert_eq!(monitor.subscriber_count(), 0);
        monitor.close();
        assert!(monitor.subscribe("p1", 0).is_err());
    }
}
