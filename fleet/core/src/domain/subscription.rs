// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Action subscription sources.
//!
//! Three independent publish/subscribe sources feed the long-poll check-in:
//! the legacy per-agent [`ActionQueue`], the sequence-aware
//! [`ActionDispatcher`] and the [`PolicyMonitor`]. Each subscribe call hands
//! back a [`Subscription`] owning the delivery queue. The source keeps the
//! sending half and preserves delivery order per subscription.
//!
//! Callers wrap subscriptions in a [`SubscriptionGuard`] so that every exit
//! path, including a dropped request future, unsubscribes.

use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;

use crate::domain::action::{Action, ActionDoc};

static NEXT_SUBSCRIPTION_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

impl SubscriptionId {
    pub fn next() -> Self {
        Self(NEXT_SUBSCRIPTION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Live subscription: an id known to the issuing source plus the inbound queue.
#[derive(Debug)]
pub struct Subscription<T> {
    pub id: SubscriptionId,
    pub receiver: mpsc::Receiver<T>,
}

impl<T> Subscription<T> {
    pub fn new(id: SubscriptionId, receiver: mpsc::Receiver<T>) -> Self {
        Self { id, receiver }
    }
}

/// Legacy per-agent action queue.
pub trait ActionQueue: Send + Sync {
    fn subscribe(&self, agent_id: &str) -> Result<Subscription<Vec<Action>>, SubscriptionError>;
    fn unsubscribe(&self, id: SubscriptionId);
}

/// Sequence-number-aware action dispatcher.
pub trait ActionDispatcher: Send + Sync {
    /// Deliver documents targeted at `agent_id` with `seq_no > since_seq_no`.
    fn subscribe(&self, agent_id: &str, since_seq_no: i64) -> Subscription<Vec<ActionDoc>>;
    fn unsubscribe(&self, id: SubscriptionId);
    /// Global high-watermark: highest sequence number safe to read.
    fn checkpoint(&self) -> i64;
}

/// Policy revision monitor keyed by policy id.
pub trait PolicyMonitor: Send + Sync {
    /// Deliver policy-change actions for `policy_id` newer than `revision`.
    fn subscribe(&self, policy_id: &str, revision: i64) -> Result<Subscription<Action>, SubscriptionError>;
    fn unsubscribe(&self, id: SubscriptionId);
}

/// Subscription that releases itself on drop.
pub struct SubscriptionGuard<T> {
    id: SubscriptionId,
    receiver: mpsc::Receiver<T>,
    release: Option<Box<dyn FnOnce(SubscriptionId) + Send>>,
}

impl<T> SubscriptionGuard<T> {
    pub fn new<F>(subscription: Subscription<T>, release: F) -> Self
    where
        F: FnOnce(SubscriptionId) + Send + 'static,
    {
        Self {
            id: subscription.id,
            receiver: subscription.receiver,
            release: Some(Box::new(release)),
        }
    }

    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Next delivery; `None` once the source has dropped its sender.
    pub async fn recv(&mut self) -> Option<T> {
        self.receiver.recv().await
    }
}

impl<T> Drop for SubscriptionGuard<T> {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release(self.id);
        }
    }
}

/// Receive from an optional subscription; pending forever when absent.
pub async fn recv_optional<T>(guard: &mut Option<SubscriptionGuard<T>>) -> Option<T> {
    match guard {
        Some(guard) => guard.recv().await,
        None => std::future::pending().await,
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SubscriptionError {
    #[error("Subscription source is closed")]
    Closed,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    #[test]
    fn test_subscription_ids_are_unique() {
        let a = SubscriptionId::next();
        let b = SubscriptionId::next();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_guard_releases_on_drop() {
        let released = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = mpsc::channel::<u32>(1);
        let counter = released.clone();

        let mut guard = SubscriptionGuard::new(Subscription::new(SubscriptionId::next(), rx), move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        tx.send(7).await.unwrap();
        assert_eq!(guard.recv().await, Some(7));
        assert_eq!(released.load(Ordering::SeqCst), 0);

        drop(guard);
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_recv_optional_none_never_resolves() {
        let mut none: Option<SubscriptionGuard<u32>> = None;
        let result = tokio::time::timeout(std::time::Duration::from_millis(10), recv_optional(&mut none)).await;
        assert!(result.is_err());
    }
}
