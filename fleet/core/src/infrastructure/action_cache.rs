// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Bounded LRU cache of action saved objects.

use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;

use crate::domain::action::Action;
use crate::domain::repository::ActionCache;

pub struct LruActionCache {
    entries: Mutex<LruCache<String, Action>>,
}

impl LruActionCache {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Zero capacity is clamped to one entry.
    pub fn with_capacity(capacity: usize) -> Self {
        Self::new(NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN))
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl ActionCache for LruActionCache {
    fn get_action(&self, id: &str) -> Option<Action> {
        self.entries.lock().get(id).cloned()
    }

    fn set_action(&self, action: Action) {
        self.entries.lock().put(action.id.clone(), action);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn action(id: &str) -> Action {
        Action {
            id: id.to_string(),
            action_type: "POLICY_CHANGE".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_get_after_set() {
        let cache = LruActionCache::with_capacity(4);
        assert!(cache.get_action("a").is_none());
        cache.set_action(action("a"));
        assert_eq!(cache.get_action("a").unwrap().id, "a");
    }

    #[test]
    fn test_evicts_least_recently_used() {
        let cache = LruActionCache::with_capacity(2);
        cache.set_action(action("a"));
        cache.set_action(action("b"));
        cache.get_action("a");
        cache.set_action(action("c"));

        assert!(cache.get_action("b").is_none());
        assert!(cache.get_action("a").is_some());
        assert_eq!(cache.len(), 2);
    }
}
