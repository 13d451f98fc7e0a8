// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! API key authentication for per-agent endpoints.
//!
//! Agents send `Authorization: ApiKey <base64(id:secret)>`. The key id
//! selects the agent through its `access_api_key_id`; the secret is checked
//! against the stored key record.

use async_trait::async_trait;
use base64::Engine;
use serde_json::Value;
use std::sync::Arc;

use crate::domain::agent::{Agent, AGENT_DOC_TYPE, FIELD_ACCESS_API_KEY_ID};
use crate::domain::auth::{AgentAuthenticator, AuthError};
use crate::domain::repository::{read_as, DocumentStore, FindQuery, RepositoryError};
use crate::infrastructure::credentials::{hash_secret, ApiKeyRecord, API_KEY_DOC_TYPE};

pub const API_KEY_SCHEME: &str = "ApiKey";

pub struct ApiKeyAuthenticator {
    store: Arc<dyn DocumentStore>,
}

impl ApiKeyAuthenticator {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    async fn find_agent_by_api_key_id(&self, key_id: &str) -> Result<Agent, AuthError> {
        let hits = self
            .store
            .find_raw(&FindQuery {
                doc_type: AGENT_DOC_TYPE.to_string(),
                field: FIELD_ACCESS_API_KEY_ID.to_string(),
                value: Value::String(key_id.to_string()),
            })
            .await?;

        match hits.as_slice() {
            [] => Err(AuthError::AgentNotFound),
            [hit] => Agent::from_document(&hit.id, hit.data.clone())
                .map_err(|e| AuthError::Corrupted(e.to_string())),
            many => Err(AuthError::Corrupted(format!("hit count mismatch {}", many.len()))),
        }
    }

    async fn verify_secret(&self, key_id: &str, secret: &str) -> Result<(), AuthError> {
        let record: ApiKeyRecord = match read_as(self.store.as_ref(), API_KEY_DOC_TYPE, key_id).await {
            Ok(record) => record,
            Err(RepositoryError::NotFound(_)) => {
                return Err(AuthError::Unauthorized("unknown api key".to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        if record.hash != hash_secret(secret) {
            return Err(AuthError::Unauthorized("invalid api key".to_string()));
        }
        Ok(())
    }
}

/// Split an `ApiKey` header value into key id and secret.
pub fn parse_api_key(authorization: &str) -> Result<(String, String), AuthError> {
    let encoded = authorization
        .strip_prefix(API_KEY_SCHEME)
        .and_then(|rest| rest.strip_prefix(' '))
        .ok_or_else(|| AuthError::Unauthorized("expected ApiKey authorization".to_string()))?;

    let decoded = base64::engine::general_purpose::STANDARD
        .decode(encoded.trim())
        .map_err(|_| AuthError::Unauthorized("malformed api key".to_string()))?;
    let decoded = String::from_utf8(decoded)
        .map_err(|_| AuthError::Unauthorized("malformed api key".to_string()))?;

    match decoded.split_once(':') {
        Some((id, secret)) if !id.is_empty() && !secret.is_empty() => {
            Ok((id.to_string(), secret.to_string()))
        }
        _ => Err(AuthError::Unauthorized("malformed api key".to_string())),
    }
}

#[async_trait]
impl AgentAuthenticator for ApiKeyAuthenticator {
    async fn authenticate(&self, authorization: Option<&str>, agent_id: &str) -> Result<Agent, AuthError> {
        let header = authorization.ok_or_else(|| AuthError::Unauthorized("missing api key".to_string()))?;
        let (key_id, secret) = parse_api_key(header)?;

        self.verify_secret(&key_id, &secret).await?;
        let agent = self.find_agent_by_api_key_id(&key_id).await?;

        if agent.id != agent_id {
            return Err(AuthError::Unauthorized("agent id mismatch".to_string()));
        }
        if !agent.active {
            return Err(AuthError::Unauthorized("agent not active".to_string()));
        }

        Ok(agent)
    }
}
