// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Check-in Handler
//!
//! One call per agent long-poll request:
//!
//! 1. Authenticate the agent and decode the request body.
//! 2. Diff the reported local metadata against the stored value.
//! 3. Resolve the ack token to a sequence-number cursor.
//! 4. Subscribe to the legacy queue, the dispatcher and the policy monitor.
//! 5. Record the check-in with the batched writer.
//! 6. Return already-pending actions, or wait for the first delivery.
//!
//! Subscriptions are held in [`SubscriptionGuard`]s, so every exit path
//! releases them, including a request future dropped on client disconnect.

use serde_json::value::RawValue;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

use crate::application::bulk_checkin::BulkCheckin;
use crate::application::error::CheckinError;
use crate::application::policy::PolicyInjector;
use crate::domain::action::{convert_action_docs, convert_actions, Action, ActionDoc, ActionResp};
use crate::domain::agent::{Agent, Fields, FIELD_LOCAL_METADATA};
use crate::domain::auth::AgentAuthenticator;
use crate::domain::checkin::{CheckinRequest, CheckinResponse};
use crate::domain::config::FleetConfig;
use crate::domain::repository::{ActionSearch, PendingActionsQuery, TokenResolver};
use crate::domain::subscription::{
    recv_optional, ActionDispatcher, ActionQueue, PolicyMonitor, SubscriptionGuard,
};

#[derive(Debug, Clone, PartialEq)]
pub struct CheckinSettings {
    pub long_poll_timeout: Duration,
    pub keep_alive_interval: Duration,
    /// Sequence-number dispatch and pending action fetch.
    pub actions_enabled: bool,
}

impl Default for CheckinSettings {
    fn default() -> Self {
        Self {
            long_poll_timeout: Duration::from_secs(300),
            keep_alive_interval: Duration::from_secs(30),
            actions_enabled: true,
        }
    }
}

impl CheckinSettings {
    pub fn from_config(config: &FleetConfig) -> Self {
        Self {
            long_poll_timeout: config.checkin.long_poll_timeout,
            keep_alive_interval: config.checkin.keep_alive_interval,
            actions_enabled: config.features.actions,
        }
    }
}

/// Collaborators of the check-in handler.
#[derive(Clone)]
pub struct CheckinDeps {
    pub authenticator: Arc<dyn AgentAuthenticator>,
    pub bulk_checkin: Arc<BulkCheckin>,
    pub action_search: Arc<dyn ActionSearch>,
    pub action_queue: Arc<dyn ActionQueue>,
    pub dispatcher: Arc<dyn ActionDispatcher>,
    pub policy_monitor: Arc<dyn PolicyMonitor>,
    /// Without a resolver the stored cursor is always used.
    pub token_resolver: Option<Arc<dyn TokenResolver>>,
    pub policy_injector: Arc<PolicyInjector>,
}

/// How a long-poll wait ended.
#[derive(Debug, Clone, PartialEq)]
pub enum WaitOutcome {
    Cancelled,
    DispatcherActions(Vec<ActionDoc>),
    LegacyActions(Vec<Action>),
    PolicyAction(Action),
    /// Long-poll timeout with nothing delivered.
    Idle,
}

impl WaitOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            WaitOutcome::Cancelled => "cancelled",
            WaitOutcome::DispatcherActions(_) => "dispatcher",
            WaitOutcome::LegacyActions(_) => "legacy",
            WaitOutcome::PolicyAction(_) => "policy",
            WaitOutcome::Idle => "idle",
        }
    }
}

/// Subscriptions held for the lifetime of one check-in.
struct Subscriptions {
    legacy: SubscriptionGuard<Vec<Action>>,
    dispatcher: Option<SubscriptionGuard<Vec<ActionDoc>>>,
    policy: SubscriptionGuard<Action>,
}

pub struct CheckinService {
    deps: CheckinDeps,
    settings: CheckinSettings,
    shutdown: CancellationToken,
}

impl CheckinService {
    pub fn new(deps: CheckinDeps, settings: CheckinSettings, shutdown: CancellationToken) -> Self {
        Self {
            deps,
            settings,
            shutdown,
        }
    }

    pub fn settings(&self) -> &CheckinSettings {
        &self.settings
    }

    /// Handle one check-in request for `agent_id`.
    pub async fn checkin(
        &self,
        agent_id: &str,
        authorization: Option<&str>,
        body: &[u8],
    ) -> Result<CheckinResponse, CheckinError> {
        let agent = self.deps.authenticator.authenticate(authorization, agent_id).await?;

        let req: CheckinRequest = serde_json::from_slice(body)
            .map_err(|e| CheckinError::MalformedRequest(e.to_string()))?;

        let fields = parse_meta(&agent, req.local_metadata.as_deref())?;
        let seq_no = self.resolve_seq_no(&agent, &req.ack_token).await?;

        let mut subs = self.subscribe(&agent, seq_no)?;

        self.deps.bulk_checkin.check_in(&agent.id, fields, seq_no);

        let (mut actions, mut ack_token) = self.fetch_pending(&agent.id, seq_no).await?;

        if actions.is_empty() {
            let outcome = self.wait_for_actions(&agent.id, seq_no, &mut subs).await;
            metrics::counter!("fleet_longpoll_outcomes_total", "outcome" => outcome.label())
                .increment(1);
            (actions, ack_token) = self.resolve_outcome(&agent.id, outcome).await?;
        }

        let resp = CheckinResponse::new(actions, ack_token);
        trace!(agent_id = %agent.id, actions = resp.actions.len(), ack_token = %resp.ack_token, "Checkin response");

        Ok(resp)
    }

    /// Ack token when present and resolvable, stored cursor otherwise.
    async fn resolve_seq_no(&self, agent: &Agent, ack_token: &str) -> Result<i64, CheckinError> {
        let Some(resolver) = &self.deps.token_resolver else {
            return Ok(agent.action_seq_no);
        };
        if ack_token.is_empty() {
            return Ok(agent.action_seq_no);
        }

        match resolver.resolve(ack_token).await {
            Ok(seq_no) => Ok(seq_no),
            Err(e) if e.is_not_found() => {
                debug!(token = %ack_token, agent_id = %agent.id, "Token not found");
                Ok(agent.action_seq_no)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn subscribe(&self, agent: &Agent, seq_no: i64) -> Result<Subscriptions, CheckinError> {
        let queue = self.deps.action_queue.clone();
        let legacy = SubscriptionGuard::new(queue.subscribe(&agent.id)?, move |id| {
            queue.unsubscribe(id)
        });

        let dispatcher = if self.settings.actions_enabled {
            let dispatcher = self.deps.dispatcher.clone();
            Some(SubscriptionGuard::new(
                dispatcher.subscribe(&agent.id, seq_no),
                move |id| dispatcher.unsubscribe(id),
            ))
        } else {
            None
        };

        let monitor = self.deps.policy_monitor.clone();
        let policy = SubscriptionGuard::new(
            monitor.subscribe(&agent.policy_id, agent.policy_revision)?,
            move |id| monitor.unsubscribe(id),
        );

        Ok(Subscriptions {
            legacy,
            dispatcher,
            policy,
        })
    }

    async fn fetch_pending(
        &self,
        agent_id: &str,
        seq_no: i64,
    ) -> Result<(Vec<ActionResp>, String), CheckinError> {
        if !self.settings.actions_enabled {
            return Ok((Vec::new(), String::new()));
        }

        let query = PendingActionsQuery {
            agent_id: agent_id.to_string(),
            since_seq_no: seq_no,
            max_seq_no: self.deps.dispatcher.checkpoint(),
            now: chrono::Utc::now(),
        };
        let docs = self.deps.action_search.search_pending(&query).await?;

        Ok(convert_action_docs(agent_id, &docs))
    }

    /// Block until one source delivers, the long poll expires or shutdown.
    ///
    /// The keep-alive timer re-records the check-in without ending the wait.
    async fn wait_for_actions(
        &self,
        agent_id: &str,
        seq_no: i64,
        subs: &mut Subscriptions,
    ) -> WaitOutcome {
        let long_poll = tokio::time::sleep(self.settings.long_poll_timeout);
        tokio::pin!(long_poll);

        let period = self.settings.keep_alive_interval;
        let mut keep_alive = tokio::time::interval_at(tokio::time::Instant::now() + period, period);

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => return WaitOutcome::Cancelled,
                Some(docs) = recv_optional(&mut subs.dispatcher) => {
                    return WaitOutcome::DispatcherActions(docs);
                }
                Some(actions) = subs.legacy.recv() => return WaitOutcome::LegacyActions(actions),
                Some(action) = subs.policy.recv() => return WaitOutcome::PolicyAction(action),
                _ = &mut long_poll => {
                    trace!(agent_id = %agent_id, "Fire long poll");
                    return WaitOutcome::Idle;
                }
                _ = keep_alive.tick() => {
                    self.deps.bulk_checkin.check_in(agent_id, None, seq_no);
                }
            }
        }
    }

    async fn resolve_outcome(
        &self,
        agent_id: &str,
        outcome: WaitOutcome,
    ) -> Result<(Vec<ActionResp>, String), CheckinError> {
        match outcome {
            WaitOutcome::Cancelled => Err(CheckinError::Cancelled),
            WaitOutcome::DispatcherActions(docs) => Ok(convert_action_docs(agent_id, &docs)),
            WaitOutcome::LegacyActions(actions) => Ok((convert_actions(&actions), String::new())),
            WaitOutcome::PolicyAction(action) => {
                let resp = self.deps.policy_injector.inject(agent_id, &action).await?;
                Ok((vec![resp], String::new()))
            }
            WaitOutcome::Idle => Ok((Vec::new(), String::new())),
        }
    }
}

/// Field update for the reported local metadata, if it changed.
///
/// Byte-identical input short-circuits; otherwise both sides are compared
/// structurally so re-encoded but equal values produce no update. The stored
/// value keeps the agent's key order; numbers are normalised to what
/// `serde_json::Value` can hold (`i64`, `u64` or `f64`).
pub fn parse_meta(agent: &Agent, requested: Option<&RawValue>) -> Result<Option<Fields>, CheckinError> {
    let Some(raw) = requested else {
        return Ok(None);
    };

    if let Some(stored) = &agent.local_metadata {
        if serde_json::to_string(stored)? == raw.get() {
            trace!("Quick comparing local metadata is equal");
            return Ok(None);
        }
    }

    let value: Value = serde_json::from_str(raw.get())
        .map_err(|e| CheckinError::MalformedRequest(e.to_string()))?;

    if value.is_null() || agent.local_metadata.as_ref() == Some(&value) {
        return Ok(None);
    }

    info!(agent_id = %agent.id, local_metadata = %raw.get(), "Applying new local metadata");

    let mut fields = Fields::new();
    fields.insert(FIELD_LOCAL_METADATA.to_string(), value);
    Ok(Some(fields))
}
