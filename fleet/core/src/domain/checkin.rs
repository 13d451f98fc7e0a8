// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Request and response bodies of the check-in and ack endpoints.

use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use serde_json::Value;

use crate::domain::action::ActionResp;

#[derive(Debug, Default, Deserialize)]
pub struct CheckinRequest {
    /// Cursor returned by the previous check-in response.
    #[serde(default)]
    pub ack_token: String,

    /// Kept raw so an unchanged value can be detected without decoding.
    #[serde(default)]
    pub local_metadata: Option<Box<RawValue>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckinResponse {
    pub ack_token: String,
    pub action: String,
    pub actions: Vec<ActionResp>,
}

impl CheckinResponse {
    pub fn new(actions: Vec<ActionResp>, ack_token: String) -> Self {
        Self {
            ack_token,
            action: "checkin".to_string(),
            actions,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct AckRequest {
    #[serde(default)]
    pub events: Vec<AckEvent>,
}

/// One acknowledged action.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AckEvent {
    pub action_id: String,

    /// Must match the authenticated agent when present.
    #[serde(default)]
    pub agent_id: String,

    #[serde(default, rename = "type")]
    pub event_type: Option<String>,

    #[serde(default)]
    pub subtype: Option<String>,

    #[serde(default)]
    pub message: Option<String>,

    #[serde(default)]
    pub timestamp: Option<String>,

    #[serde(default)]
    pub payload: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AckResponse {
    pub action: String,
}

impl Default for AckResponse {
    fn default() -> Self {
        Self {
            action: "acks".to_string(),
        }
    }
}
