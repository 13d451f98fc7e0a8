// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Operator-issued actions.
//!
//! Two shapes exist: the stored [`Action`] saved object (read through the
//! action cache and the document store) and the indexed [`ActionDoc`] that
//! carries a sequence number and a target agent list for dispatch.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Document type holding action saved objects.
pub const ACTION_DOC_TYPE: &str = "fleet-agent-actions";

pub const TYPE_POLICY_CHANGE: &str = "POLICY_CHANGE";
// Recognized but not reconciled.
pub const TYPE_UPGRADE: &str = "UPGRADE";
pub const TYPE_UNENROLL: &str = "UNENROLL";

/// Action saved object. Immutable once created.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Action {
    #[serde(default)]
    pub id: String,

    #[serde(rename = "type")]
    pub action_type: String,

    /// Empty means not targeted at a single agent.
    #[serde(default)]
    pub agent_id: String,

    #[serde(default)]
    pub policy_id: String,

    #[serde(default)]
    pub policy_revision: i64,

    /// Opaque payload handed to the agent.
    #[serde(default)]
    pub data: Value,

    /// Payload recorded on the agent when the action is acknowledged.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ack_data: Option<Value>,

    #[serde(default)]
    pub created_at: String,
}

/// Indexed action document, ordered by `seq_no`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionDoc {
    /// Index document id; doubles as the ack token handed to agents.
    pub doc_id: String,

    pub seq_no: i64,

    pub action_id: String,

    #[serde(rename = "type")]
    pub action_type: String,

    #[serde(default)]
    pub agents: Vec<String>,

    #[serde(default)]
    pub data: Value,

    #[serde(rename = "@timestamp")]
    pub timestamp: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration: Option<DateTime<Utc>>,
}

impl ActionDoc {
    pub fn targets(&self, agent_id: &str) -> bool {
        self.agents.iter().any(|a| a == agent_id)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        matches!(self.expiration, Some(exp) if exp <= now)
    }
}

/// Action as delivered in a check-in response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionResp {
    pub agent_id: String,
    pub created_at: String,
    pub data: Value,
    pub id: String,
    #[serde(rename = "type")]
    pub action_type: String,
}

impl From<&Action> for ActionResp {
    fn from(action: &Action) -> Self {
        Self {
            agent_id: action.agent_id.clone(),
            created_at: action.created_at.clone(),
            data: action.data.clone(),
            id: action.id.clone(),
            action_type: action.action_type.clone(),
        }
    }
}

/// Convert legacy queue actions. No ack token is derived from these.
pub fn convert_actions(actions: &[Action]) -> Vec<ActionResp> {
    actions.iter().map(ActionResp::from).collect()
}

/// Convert indexed action documents for `agent_id`.
///
/// The returned ack token is the document id of the last document, or empty
/// when `docs` is empty.
pub fn convert_action_docs(agent_id: &str, docs: &[ActionDoc]) -> (Vec<ActionResp>, String) {
    let actions = docs
        .iter()
        .map(|doc| ActionResp {
            agent_id: agent_id.to_string(),
            created_at: format_timestamp(doc.timestamp),
            data: doc.data.clone(),
            id: doc.action_id.clone(),
            action_type: doc.action_type.clone(),
        })
        .collect();

    let ack_token = docs.last().map(|doc| doc.doc_id.clone()).unwrap_or_default();

    (actions, ack_token)
}

/// RFC 3339 timestamp, second precision, `Z` suffix.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}
