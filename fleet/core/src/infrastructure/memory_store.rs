// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! In-memory document store.
//!
//! Implements the document store, bulk indexer and action search contracts
//! over process memory. Used when no database is configured and in tests.
//! Writes are visible immediately, so refresh options are accepted and
//! ignored.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::domain::action::ActionDoc;
use crate::domain::agent::Fields;
use crate::domain::repository::{
    ActionSearch, BulkIndexer, BulkOp, DocumentStore, FindQuery, Hit, PendingActionsQuery,
    RepositoryError, UpdateOp, WriteOptions,
};

type DocKey = (String, String);

#[derive(Default)]
struct ActionIndex {
    last_seq_no: i64,
    by_seq_no: BTreeMap<i64, ActionDoc>,
    seq_no_by_doc_id: HashMap<String, i64>,
}

#[derive(Clone, Default)]
pub struct InMemoryDocumentStore {
    documents: Arc<RwLock<HashMap<DocKey, Value>>>,
    actions: Arc<RwLock<ActionIndex>>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an action document, assigning the next sequence number.
    ///
    /// An empty `doc_id` is replaced with a generated one.
    pub fn index_action(&self, mut doc: ActionDoc) -> ActionDoc {
        let mut index = self.actions.write();
        index.last_seq_no += 1;
        doc.seq_no = index.last_seq_no;
        if doc.doc_id.is_empty() {
            doc.doc_id = uuid::Uuid::new_v4().to_string();
        }
        index.seq_no_by_doc_id.insert(doc.doc_id.clone(), doc.seq_no);
        index.by_seq_no.insert(doc.seq_no, doc.clone());
        doc
    }

    /// Highest sequence number assigned so far.
    pub fn max_seq_no(&self) -> i64 {
        self.actions.read().last_seq_no
    }

    pub fn document_count(&self, doc_type: &str) -> usize {
        self.documents
            .read()
            .keys()
            .filter(|(t, _)| t == doc_type)
            .count()
    }
}

fn key(doc_type: &str, id: &str) -> DocKey {
    (doc_type.to_string(), id.to_string())
}

fn merge(doc: &mut Value, fields: Fields) -> Result<(), RepositoryError> {
    let obj = doc
        .as_object_mut()
        .ok_or_else(|| RepositoryError::Serialization("document is not an object".to_string()))?;
    obj.extend(fields);
    Ok(())
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn read(&self, doc_type: &str, id: &str) -> Result<Value, RepositoryError> {
        self.documents
            .read()
            .get(&key(doc_type, id))
            .cloned()
            .ok_or_else(|| RepositoryError::NotFound(format!("{}/{}", doc_type, id)))
    }

    async fn update(
        &self,
        doc_type: &str,
        id: &str,
        fields: Fields,
        _opts: WriteOptions,
    ) -> Result<(), RepositoryError> {
        let mut documents = self.documents.write();
        let doc = documents
            .get_mut(&key(doc_type, id))
            .ok_or_else(|| RepositoryError::NotFound(format!("{}/{}", doc_type, id)))?;
        merge(doc, fields)
    }

    async fn m_update(&self, updates: Vec<UpdateOp>) -> Result<(), RepositoryError> {
        let mut documents = self.documents.write();
        for op in updates {
            match documents.get_mut(&key(&op.doc_type, &op.id)) {
                Some(doc) => {
                    if let Err(e) = merge(doc, op.fields) {
                        warn!(doc_type = %op.doc_type, id = %op.id, error = %e, "Skipping bulk update item");
                    }
                }
                None => debug!(doc_type = %op.doc_type, id = %op.id, "Bulk update target missing"),
            }
        }
        Ok(())
    }

    async fn create(
        &self,
        doc_type: &str,
        doc: Value,
        opts: WriteOptions,
    ) -> Result<String, RepositoryError> {
        let id = opts
            .id
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let mut documents = self.documents.write();
        let k = key(doc_type, &id);
        if documents.contains_key(&k) && !opts.overwrite {
            return Err(RepositoryError::Conflict(format!("{}/{}", doc_type, id)));
        }
        documents.insert(k, doc);
        Ok(id)
    }

    async fn find_raw(&self, query: &FindQuery) -> Result<Vec<Hit>, RepositoryError> {
        let documents = self.documents.read();
        let mut hits: Vec<Hit> = documents
            .iter()
            .filter(|((t, _), doc)| t == &query.doc_type && doc.get(&query.field) == Some(&query.value))
            .map(|((_, id), doc)| Hit {
                id: id.clone(),
                data: doc.clone(),
            })
            .collect();
        hits.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(hits)
    }
}

#[async_trait]
impl BulkIndexer for InMemoryDocumentStore {
    async fn bulk_update(&self, ops: Vec<BulkOp>, _opts: WriteOptions) -> Result<(), RepositoryError> {
        let mut documents = self.documents.write();
        let mut missing = Vec::new();

        for op in ops {
            let Some(Value::Object(partial)) = op.body.get("doc").cloned() else {
                return Err(RepositoryError::Serialization(format!(
                    "bulk op for {} has no doc body",
                    op.id
                )));
            };
            match documents.get_mut(&key(&op.index, &op.id)) {
                Some(doc) => merge(doc, partial)?,
                None => missing.push(op.id),
            }
        }

        if missing.is_empty() {
            Ok(())
        } else {
            Err(RepositoryError::NotFound(missing.join(",")))
        }
    }
}

#[async_trait]
impl ActionSearch for InMemoryDocumentStore {
    async fn search_pending(&self, query: &PendingActionsQuery) -> Result<Vec<ActionDoc>, RepositoryError> {
        if query.max_seq_no <= query.since_seq_no {
            return Ok(Vec::new());
        }
        let index = self.actions.read();
        Ok(index
            .by_seq_no
            .range(query.since_seq_no + 1..=query.max_seq_no)
            .map(|(_, doc)| doc)
            .filter(|doc| doc.targets(&query.agent_id) && !doc.is_expired(query.now))
            .cloned()
            .collect())
    }

    async fn find_action_doc(&self, doc_id: &str) -> Result<ActionDoc, RepositoryError> {
        let index = self.actions.read();
        index
            .seq_no_by_doc_id
            .get(doc_id)
            .and_then(|seq_no| index.by_seq_no.get(seq_no))
            .cloned()
            .ok_or_else(|| RepositoryError::NotFound(doc_id.to_string()))
    }

    async fn search_since(&self, since_seq_no: i64, limit: usize) -> Result<Vec<ActionDoc>, RepositoryError> {
        let index = self.actions.read();
        Ok(index
            .by_seq_no
            .range(since_seq_no.saturating_add(1)..)
            .take(limit)
            .map(|(_, doc)| doc.clone())
            .collect())
    }
}
