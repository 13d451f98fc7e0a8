// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Locally minted API keys.
//!
//! Keys are random ids and secrets. Only a SHA-256 digest of the secret is
//! stored, in an API key record the authenticator checks against.

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::info;

use crate::domain::action::format_timestamp;
use crate::domain::repository::{ApiKey, CredentialIssuer, DocumentStore, RepositoryError, WriteOptions};

/// Document type holding API key records, keyed by key id.
pub const API_KEY_DOC_TYPE: &str = "fleet-api-keys";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiKeyRecord {
    pub agent_id: String,
    pub name: String,
    /// Hex SHA-256 of the secret.
    pub hash: String,
    pub created_at: String,
}

pub fn hash_secret(secret: &str) -> String {
    hex::encode(Sha256::digest(secret.as_bytes()))
}

pub struct LocalCredentialIssuer {
    store: Arc<dyn DocumentStore>,
    issued: AtomicUsize,
}

impl LocalCredentialIssuer {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            issued: AtomicUsize::new(0),
        }
    }

    /// Number of keys minted by this issuer.
    pub fn issued_count(&self) -> usize {
        self.issued.load(Ordering::SeqCst)
    }

    /// Mint a key named `name` for `agent_id` and persist its record.
    pub async fn issue(&self, agent_id: &str, name: &str) -> Result<ApiKey, RepositoryError> {
        let key = ApiKey {
            id: uuid::Uuid::new_v4().simple().to_string(),
            key: hex::encode(Sha256::digest(uuid::Uuid::new_v4().as_bytes())),
        };

        let record = ApiKeyRecord {
            agent_id: agent_id.to_string(),
            name: name.to_string(),
            hash: hash_secret(&key.key),
            created_at: format_timestamp(Utc::now()),
        };

        self.store
            .create(
                API_KEY_DOC_TYPE,
                serde_json::to_value(&record)?,
                WriteOptions::default().with_id(key.id.clone()),
            )
            .await?;

        self.issued.fetch_add(1, Ordering::SeqCst);
        info!(agent_id = %agent_id, key_id = %key.id, name = %name, "Issued API key");

        Ok(key)
    }
}

#[async_trait]
impl CredentialIssuer for LocalCredentialIssuer {
    async fn issue_output_key(&self, agent_id: &str, output_name: &str) -> Result<ApiKey, RepositoryError> {
        self.issue(agent_id, output_name).await
    }
}
