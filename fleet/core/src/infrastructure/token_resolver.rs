// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Ack token resolution.
//!
//! Tokens are action document ids. Resolved sequence numbers never change,
//! so hits are memoized in a bounded LRU. Misses are not cached.

use async_trait::async_trait;
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::Arc;

use crate::domain::repository::{ActionSearch, RepositoryError, TokenResolver};

pub struct CachingTokenResolver {
    search: Arc<dyn ActionSearch>,
    cache: Mutex<LruCache<String, i64>>,
}

impl CachingTokenResolver {
    pub fn new(search: Arc<dyn ActionSearch>, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            search,
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }
}

#[async_trait]
impl TokenResolver for CachingTokenResolver {
    async fn resolve(&self, ack_token: &str) -> Result<i64, RepositoryError> {
        if let Some(seq_no) = self.cache.lock().get(ack_token) {
            return Ok(*seq_no);
        }

        let doc = self.search.find_action_doc(ack_token).await?;
        self.cache.lock().put(ack_token.to_string(), doc.seq_no);
        Ok(doc.seq_no)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::action::ActionDoc;
    use crate::infrastructure::memory_store::InMemoryDocumentStore;
    use chrono::Utc;
    use serde_json::json;

    #[tokio::test]
    async fn test_resolves_doc_id_to_seq_no() {
        let store = Arc::new(InMemoryDocumentStore::new());
        store.index_action(ActionDoc {
            doc_id: "first".to_string(),
            seq_no: 0,
            action_id: "a1".to_string(),
            action_type: "UPGRADE".to_string(),
            agents: vec![],
            data: json!({}),
            timestamp: Utc::now(),
            expiration: None,
        });
        let resolver = CachingTokenResolver::new(store, 8);

        assert_eq!(resolver.resolve("first").await.unwrap(), 1);
        assert_eq!(resolver.resolve("first").await.unwrap(), 1);
        assert!(resolver.resolve("unknown").await.unwrap_err().is_not_found());
    }
}
