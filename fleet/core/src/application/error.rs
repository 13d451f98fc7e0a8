// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use crate::domain::auth::AuthError;
use crate::domain::repository::RepositoryError;
use crate::domain::subscription::SubscriptionError;

/// Failure of a check-in, ack or flush operation.
#[derive(Debug, thiserror::Error)]
pub enum CheckinError {
    #[error("agent not found")]
    AgentNotFound,

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("malformed request: {0}")]
    MalformedRequest(String),

    #[error("event agent id mismatch: expected {expected}, got {actual}")]
    EventAgentMismatch { expected: String, actual: String },

    /// Shutdown was signalled while the operation was in progress.
    #[error("operation cancelled")]
    Cancelled,

    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("subscription error: {0}")]
    Subscription(#[from] SubscriptionError),

    #[error("payload error: {0}")]
    Payload(String),
}

impl CheckinError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, CheckinError::Cancelled)
    }
}

impl From<AuthError> for CheckinError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::AgentNotFound => CheckinError::AgentNotFound,
            AuthError::Unauthorized(msg) => CheckinError::Unauthorized(msg),
            AuthError::Corrupted(msg) => CheckinError::Payload(msg),
            AuthError::Repository(e) => CheckinError::Repository(e),
        }
    }
}

impl From<serde_json::Error> for CheckinError {
    fn from(err: serde_json::Error) -> Self {
        CheckinError::Payload(err.to_string())
    }
}
