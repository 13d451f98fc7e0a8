// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Acknowledgment Handler
//!
//! Reconciles agent-reported completion of actions into the agent record.
//! Only policy changes are reconciled; upgrade and unenroll acks are resolved
//! and grouped but otherwise ignored.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, trace};

use crate::application::error::CheckinError;
use crate::domain::action::{Action, ACTION_DOC_TYPE, TYPE_POLICY_CHANGE};
use crate::domain::agent::{Agent, Fields, AGENT_DOC_TYPE, FIELD_PACKAGES, FIELD_POLICY_REVISION};
use crate::domain::auth::AgentAuthenticator;
use crate::domain::checkin::{AckEvent, AckRequest, AckResponse};
use crate::domain::repository::{read_as, ActionCache, DocumentStore, WriteOptions};

pub struct AckService {
    authenticator: Arc<dyn AgentAuthenticator>,
    store: Arc<dyn DocumentStore>,
    cache: Arc<dyn ActionCache>,
}

impl AckService {
    pub fn new(
        authenticator: Arc<dyn AgentAuthenticator>,
        store: Arc<dyn DocumentStore>,
        cache: Arc<dyn ActionCache>,
    ) -> Self {
        Self {
            authenticator,
            store,
            cache,
        }
    }

    /// Handle one ack request for `agent_id`.
    pub async fn ack(
        &self,
        agent_id: &str,
        authorization: Option<&str>,
        body: &[u8],
    ) -> Result<AckResponse, CheckinError> {
        let agent = self.authenticator.authenticate(authorization, agent_id).await?;

        let req: AckRequest = serde_json::from_slice(body)
            .map_err(|e| CheckinError::MalformedRequest(e.to_string()))?;

        trace!(agent_id = %agent.id, raw = %String::from_utf8_lossy(body), "Ack request");

        self.handle_events(&agent, &req.events).await?;

        metrics::counter!("fleet_acks_total").increment(req.events.len() as u64);

        Ok(AckResponse::default())
    }

    async fn handle_events(&self, agent: &Agent, events: &[AckEvent]) -> Result<(), CheckinError> {
        // The whole batch is rejected before anything is read or written.
        if let Some(ev) = events
            .iter()
            .find(|ev| !ev.agent_id.is_empty() && ev.agent_id != agent.id)
        {
            return Err(CheckinError::EventAgentMismatch {
                expected: agent.id.clone(),
                actual: ev.agent_id.clone(),
            });
        }

        let mut by_type: HashMap<String, Vec<Action>> = HashMap::new();
        for ev in events {
            let action = self.resolve_action(&ev.action_id).await?;
            by_type.entry(action.action_type.clone()).or_default().push(action);
        }

        if let Some(actions) = by_type.get(TYPE_POLICY_CHANGE) {
            self.handle_policy_change(agent, actions).await?;
        }

        Ok(())
    }

    /// Cache first, store on miss. Store reads populate the cache.
    async fn resolve_action(&self, action_id: &str) -> Result<Action, CheckinError> {
        if let Some(action) = self.cache.get_action(action_id) {
            return Ok(action);
        }

        let mut action: Action = read_as(self.store.as_ref(), ACTION_DOC_TYPE, action_id).await?;
        if action.id.is_empty() {
            action.id = action_id.to_string();
        }
        self.cache.set_action(action.clone());
        Ok(action)
    }

    async fn handle_policy_change(&self, agent: &Agent, actions: &[Action]) -> Result<(), CheckinError> {
        let Some(winner) = select_policy_winner(agent, actions) else {
            debug!(agent_id = %agent.id, candidates = actions.len(), "No policy change matches agent policy");
            return Ok(());
        };

        let mut fields = Fields::new();
        fields.insert(
            FIELD_POLICY_REVISION.to_string(),
            Value::from(winner.policy_revision),
        );
        fields.insert(
            FIELD_PACKAGES.to_string(),
            winner.ack_data.clone().unwrap_or(Value::Null),
        );

        self.store
            .update(AGENT_DOC_TYPE, &agent.id, fields, WriteOptions::refresh())
            .await?;

        debug!(
            agent_id = %agent.id,
            policy_id = %winner.policy_id,
            revision = winner.policy_revision,
            "Policy revision acknowledged"
        );

        Ok(())
    }
}

/// Pick the policy change to record for `agent`.
///
/// Candidates must be policy changes for the agent's current policy. The
/// strictly highest revision wins; on a tie the earliest candidate is kept.
pub fn select_policy_winner<'a>(agent: &Agent, actions: &'a [Action]) -> Option<&'a Action> {
    let mut best: Option<&Action> = None;
    for action in actions {
        if action.action_type != TYPE_POLICY_CHANGE || action.policy_id != agent.policy_id {
            continue;
        }
        match best {
            Some(current) if action.policy_revision <= current.policy_revision => {}
            _ => best = Some(action),
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::action::TYPE_UPGRADE;

    fn agent() -> Agent {
        Agent {
            id: "agent-1".to_string(),
            policy_id: "p1".to_string(),
            policy_revision: 1,
            ..Default::default()
        }
    }

    fn policy_change(id: &str, policy_id: &str, rev: i64) -> Action {
        Action {
            id: id.to_string(),
            action_type: TYPE_POLICY_CHANGE.to_string(),
            policy_id: policy_id.to_string(),
            policy_revision: rev,
            ..Default::default()
        }
    }

    #[test]
    fn test_highest_revision_wins_regardless_of_order() {
        let a = policy_change("a", "p1", 5);
        let b = policy_change("b", "p1", 9);

        let forward = [a.clone(), b.clone()];
        let backward = [b, a];
        assert_eq!(select_policy_winner(&agent(), &forward).unwrap().id, "b");
        assert_eq!(select_policy_winner(&agent(), &backward).unwrap().id, "b");
    }

    #[test]
    fn test_first_wins_on_tie() {
        let actions = [policy_change("first", "p1", 4), policy_change("second", "p1", 4)];
        assert_eq!(select_policy_winner(&agent(), &actions).unwrap().id, "first");
    }

    #[test]
    fn test_other_policy_and_type_are_ignored() {
        let mut upgrade = policy_change("u", "p1", 10);
        upgrade.action_type = TYPE_UPGRADE.to_string();
        let actions = [policy_change("x", "p2", 7), upgrade];
        assert!(select_policy_winner(&agent(), &actions).is_none());
    }

    #[test]
    fn test_lower_revision_still_wins_when_alone() {
        let actions = [policy_change("a", "p1", 0)];
        assert_eq!(select_policy_winner(&agent(), &actions).unwrap().id, "a");
    }
}
