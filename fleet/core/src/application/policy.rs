// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Policy Injection
//!
//! Fills the agent's default output credential into a policy-change payload
//! before it is delivered. The credential is minted once per agent and
//! stored on the agent record; later deliveries reuse it.

use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};

use crate::application::error::CheckinError;
use crate::domain::action::{Action, ActionResp};
use crate::domain::agent::{Agent, AGENT_DOC_TYPE};
use crate::domain::repository::{CredentialIssuer, DocumentStore, RepositoryError, WriteOptions};

/// Output whose credential is injected into policies.
pub const DEFAULT_OUTPUT_NAME: &str = "default";

pub const OUTPUTS_API_KEY_PATH: &[&str] = &["policy", "outputs", "default", "api_key"];
pub const CONFIG_API_KEY_PATH: &[&str] = &["policy", "config", "default", "api_key"];

/// Injection targets, tried in order. The first path whose parent objects
/// all exist receives the credential.
pub const API_KEY_INJECTION_PATHS: &[&[&str]] = &[OUTPUTS_API_KEY_PATH, CONFIG_API_KEY_PATH];

pub struct PolicyInjector {
    store: Arc<dyn DocumentStore>,
    issuer: Arc<dyn CredentialIssuer>,
}

impl PolicyInjector {
    pub fn new(store: Arc<dyn DocumentStore>, issuer: Arc<dyn CredentialIssuer>) -> Self {
        Self { store, issuer }
    }

    /// Prepare a policy-change action for delivery to `agent_id`.
    pub async fn inject(&self, agent_id: &str, action: &Action) -> Result<ActionResp, CheckinError> {
        let mut payload = decode_payload(&action.data)?;

        // Always re-read: the credential may have been minted by another request.
        let mut agent = self.read_agent(agent_id).await?;

        if !agent.has_default_api_key() {
            let key = self
                .issuer
                .issue_output_key(&agent.id, DEFAULT_OUTPUT_NAME)
                .await?;
            agent.default_api_key = key.token();
            agent.default_api_key_id = key.id;

            info!(agent_id = %agent.id, "Rewriting full agent record to pick up default output key");

            let doc = serde_json::to_value(&agent)?;
            let opts = WriteOptions::default()
                .with_id(agent.id.clone())
                .with_overwrite()
                .with_refresh();
            self.store.create(AGENT_DOC_TYPE, doc, opts).await?;
        }

        let api_key = Value::String(agent.default_api_key.clone());
        let injected = API_KEY_INJECTION_PATHS
            .iter()
            .any(|path| set_json_path(&mut payload, path, api_key.clone()));
        if !injected {
            debug!(action_id = %action.id, "Cannot inject api_key into action");
        }

        // Text payloads are delivered decoded.
        Ok(ActionResp {
            agent_id: agent.id,
            created_at: action.created_at.clone(),
            data: payload,
            id: action.id.clone(),
            action_type: action.action_type.clone(),
        })
    }

    async fn read_agent(&self, agent_id: &str) -> Result<Agent, CheckinError> {
        let body = match self.store.read(AGENT_DOC_TYPE, agent_id).await {
            Ok(body) => body,
            Err(RepositoryError::NotFound(_)) => return Err(CheckinError::AgentNotFound),
            Err(e) => return Err(e.into()),
        };
        Ok(Agent::from_document(agent_id, body)?)
    }
}

/// Payloads arrive either as a JSON object or as serialized JSON text.
fn decode_payload(data: &Value) -> Result<Value, CheckinError> {
    let payload = match data {
        Value::String(text) => serde_json::from_str(text)?,
        other => other.clone(),
    };
    if !payload.is_object() {
        return Err(CheckinError::Payload("policy payload is not an object".to_string()));
    }
    Ok(payload)
}

/// Set `value` at `path` inside nested objects.
///
/// Every key but the last must name an existing object; the last key is
/// inserted or replaced. Returns false, leaving `root` untouched, when the
/// path cannot be followed.
pub fn set_json_path(root: &mut Value, path: &[&str], value: Value) -> bool {
    let Some((last, parents)) = path.split_last() else {
        return false;
    };

    let mut node = root;
    for key in parents {
        match node.get_mut(*key) {
            Some(child) if child.is_object() => node = child,
            _ => return false,
        }
    }

    match node.as_object_mut() {
        Some(obj) => {
            obj.insert((*last).to_string(), value);
            true
        }
        None => false,
    }
}
