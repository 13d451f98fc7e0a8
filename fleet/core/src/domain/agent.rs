// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Document type (and index name) holding agent records.
pub const AGENT_DOC_TYPE: &str = "fleet-agents";

pub const FIELD_LAST_CHECKIN: &str = "last_checkin";
pub const FIELD_LOCAL_METADATA: &str = "local_metadata";
pub const FIELD_POLICY_REVISION: &str = "policy_revision";
pub const FIELD_PACKAGES: &str = "packages";
pub const FIELD_ACTION_SEQ_NO: &str = "action_seq_no";
pub const FIELD_UPDATED_AT: &str = "updated_at";
pub const FIELD_ACCESS_API_KEY_ID: &str = "access_api_key_id";

/// Partial document update: field name to new JSON value.
pub type Fields = serde_json::Map<String, Value>;

/// Durable record of an enrolled agent.
///
/// The document id is not part of the stored body; readers fill `id` in
/// from the document key after decoding.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    #[serde(default, skip_serializing)]
    pub id: String,

    #[serde(default)]
    pub active: bool,

    #[serde(default)]
    pub policy_id: String,

    #[serde(default)]
    pub policy_revision: i64,

    /// Last action sequence number the agent has applied.
    #[serde(default)]
    pub action_seq_no: i64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_metadata: Option<Value>,

    /// Bearer credential for the default output, minted lazily on the
    /// first policy delivery.
    #[serde(default)]
    pub default_api_key: String,

    #[serde(default)]
    pub default_api_key_id: String,

    /// Id of the API key the agent authenticates with.
    #[serde(default)]
    pub access_api_key_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub packages: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_checkin: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enrolled_at: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

impl Agent {
    /// Decode an agent from a stored document body, attaching its id.
    pub fn from_document(id: &str, body: Value) -> Result<Self, serde_json::Error> {
        let mut agent: Agent = serde_json::from_value(body)?;
        agent.id = id.to_string();
        Ok(agent)
    }

    pub fn has_default_api_key(&self) -> bool {
        !self.default_api_key.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_document_attaches_id_and_defaults() {
        let agent = Agent::from_document(
            "agent-1",
            json!({ "policy_id": "p1", "policy_revision": 3, "active": true }),
        )
        .unwrap();

        assert_eq!(agent.id, "agent-1");
        assert_eq!(agent.policy_id, "p1");
        assert_eq!(agent.policy_revision, 3);
        assert_eq!(agent.action_seq_no, 0);
        assert!(agent.local_metadata.is_none());
        assert!(!agent.has_default_api_key());
    }

    #[test]
    fn test_id_is_not_serialized() {
        let agent = Agent {
            id: "agent-1".to_string(),
            ..Default::default()
        };
        let body = serde_json::to_value(&agent).unwrap();
        assert!(body.get("id").is_none());
    }
}
