// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Collaborator Contracts
//!
//! Persistence interfaces the check-in core consumes. Interfaces live in the
//! domain layer and are implemented in `crate::infrastructure`.
//!
//! | Trait | Role | Implementations |
//! |-------|------|----------------|
//! | `DocumentStore` | Structured-object reads and writes | `InMemoryDocumentStore`, `PostgresDocumentStore` |
//! | `BulkIndexer` | Raw partial-document bulk updates | `InMemoryDocumentStore`, `PostgresDocumentStore` |
//! | `ActionSearch` | Pending action queries, ack token lookups | `InMemoryDocumentStore`, `PostgresDocumentStore` |
//! | `ActionCache` | Action id to action lookup | `LruActionCache` |
//! | `TokenResolver` | Ack token to sequence number | `CachingTokenResolver` |
//! | `CredentialIssuer` | Per-agent output credentials | `LocalCredentialIssuer` |
//!
//! None of these retry on their own; callers decide whether a failure is
//! dropped or surfaced.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::domain::action::{Action, ActionDoc};
use crate::domain::agent::Fields;

/// Write options shared by the store and the indexer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteOptions {
    /// Make the write visible to readers before returning.
    pub refresh: bool,
    /// `create` replaces an existing document instead of failing.
    pub overwrite: bool,
    /// Explicit document id for `create`.
    pub id: Option<String>,
}

impl WriteOptions {
    pub fn refresh() -> Self {
        Self {
            refresh: true,
            ..Default::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_overwrite(mut self) -> Self {
        self.overwrite = true;
        self
    }

    pub fn with_refresh(mut self) -> Self {
        self.refresh = true;
        self
    }
}

/// One item of a structured bulk update.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateOp {
    pub doc_type: String,
    pub id: String,
    pub fields: Fields,
}

/// One raw partial-document operation; `body` is `{"doc": {...}}`.
#[derive(Debug, Clone, PartialEq)]
pub struct BulkOp {
    pub index: String,
    pub id: String,
    pub body: Value,
}

/// Equality filter on a top-level document field.
#[derive(Debug, Clone, PartialEq)]
pub struct FindQuery {
    pub doc_type: String,
    pub field: String,
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Hit {
    pub id: String,
    pub data: Value,
}

/// Actions an agent has not seen yet: `since < seq_no <= max`, not expired
/// at `now`, targeted at `agent_id`.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingActionsQuery {
    pub agent_id: String,
    pub since_seq_no: i64,
    pub max_seq_no: i64,
    pub now: DateTime<Utc>,
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Read a document body. Missing documents yield `RepositoryError::NotFound`.
    async fn read(&self, doc_type: &str, id: &str) -> Result<Value, RepositoryError>;

    /// Merge `fields` into an existing document.
    async fn update(
        &self,
        doc_type: &str,
        id: &str,
        fields: Fields,
        opts: WriteOptions,
    ) -> Result<(), RepositoryError>;

    /// Bulk partial update, best-effort per item.
    async fn m_update(&self, updates: Vec<UpdateOp>) -> Result<(), RepositoryError>;

    /// Create a document and return its id.
    async fn create(
        &self,
        doc_type: &str,
        doc: Value,
        opts: WriteOptions,
    ) -> Result<String, RepositoryError>;

    async fn find_raw(&self, query: &FindQuery) -> Result<Vec<Hit>, RepositoryError>;
}

#[async_trait]
pub trait BulkIndexer: Send + Sync {
    /// Apply raw partial-document operations in one bulk request.
    async fn bulk_update(&self, ops: Vec<BulkOp>, opts: WriteOptions) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait ActionSearch: Send + Sync {
    /// Pending actions ordered by ascending `seq_no`.
    async fn search_pending(&self, query: &PendingActionsQuery) -> Result<Vec<ActionDoc>, RepositoryError>;

    /// Look up an indexed action by document id.
    async fn find_action_doc(&self, doc_id: &str) -> Result<ActionDoc, RepositoryError>;

    /// Up to `limit` indexed actions with `seq_no > since_seq_no`, for any
    /// agent, ordered by ascending `seq_no`.
    async fn search_since(&self, since_seq_no: i64, limit: usize) -> Result<Vec<ActionDoc>, RepositoryError>;
}

/// Owned action cache. Callers read through to the store on a miss and
/// populate the cache with what they read.
pub trait ActionCache: Send + Sync {
    fn get_action(&self, id: &str) -> Option<Action>;
    fn set_action(&self, action: Action);
}

#[async_trait]
pub trait TokenResolver: Send + Sync {
    /// Resolve an ack token to its sequence number.
    async fn resolve(&self, ack_token: &str) -> Result<i64, RepositoryError>;
}

/// Minted credential: `id` identifies it, `key` is the secret half.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiKey {
    pub id: String,
    pub key: String,
}

impl ApiKey {
    /// Bearer value handed to agents: `base64(id:key)`.
    pub fn token(&self) -> String {
        use base64::Engine;
        base64::engine::general_purpose::STANDARD.encode(format!("{}:{}", self.id, self.key))
    }
}

#[async_trait]
pub trait CredentialIssuer: Send + Sync {
    async fn issue_output_key(&self, agent_id: &str, output_name: &str) -> Result<ApiKey, RepositoryError>;
}

/// Read and decode a document.
pub async fn read_as<T: serde::de::DeserializeOwned>(
    store: &dyn DocumentStore,
    doc_type: &str,
    id: &str,
) -> Result<T, RepositoryError> {
    let body = store.read(doc_type, id).await?;
    Ok(serde_json::from_value(body)?)
}

/// Repository errors
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("Entity not found: {0}")]
    NotFound(String),

    #[error("Document already exists: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl RepositoryError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, RepositoryError::NotFound(_))
    }
}

impl From<sqlx::Error> for RepositoryError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => RepositoryError::NotFound("Row not found".to_string()),
            _ => RepositoryError::Database(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for RepositoryError {
    fn from(err: serde_json::Error) -> Self {
        RepositoryError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine;

    #[test]
    fn test_api_key_token_is_base64_of_id_and_key() {
        let key = ApiKey {
            id: "kid".to_string(),
            key: "secret".to_string(),
        };
        let decoded = base64::engine::general_purpose::STANDARD
            .decode(key.token())
            .unwrap();
        assert_eq!(decoded, b"kid:secret");
    }

    #[test]
    fn test_write_options_builders() {
        let opts = WriteOptions::default().with_id("a").with_overwrite().with_refresh();
        assert_eq!(opts.id.as_deref(), Some("a"));
        assert!(opts.overwrite);
        assert!(opts.refresh);
        assert_eq!(WriteOptions::refresh(), WriteOptions::default().with_refresh());
    }
}
