// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Agent authentication contract.

use async_trait::async_trait;

use crate::domain::agent::Agent;
use crate::domain::repository::RepositoryError;

#[async_trait]
pub trait AgentAuthenticator: Send + Sync {
    /// Authenticate the caller of a per-agent endpoint from its
    /// `Authorization` header value and return the agent record.
    async fn authenticate(&self, authorization: Option<&str>, agent_id: &str) -> Result<Agent, AuthError>;
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("agent not found")]
    AgentNotFound,

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("agent record corrupted: {0}")]
    Corrupted(String),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}
