// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Shared wiring for integration tests: every collaborator in memory.

#![allow(dead_code)]

use chrono::Utc;
use fleet_core::application::{AckService, BulkCheckin, CheckinDeps, CheckinService, CheckinSettings, PolicyInjector};
use fleet_core::domain::action::{Action, ActionDoc, ACTION_DOC_TYPE};
use fleet_core::domain::agent::{Agent, AGENT_DOC_TYPE};
use fleet_core::domain::repository::{DocumentStore, TokenResolver, WriteOptions};
use fleet_core::infrastructure::{
    ActionMonitor, ApiKeyAuthenticator, CachingTokenResolver, InMemoryActionDispatcher, InMemoryActionQueue,
    InMemoryDocumentStore, InMemoryPolicyMonitor, LocalCredentialIssuer, LruActionCache,
};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub struct Harness {
    pub store: Arc<InMemoryDocumentStore>,
    pub bulk: Arc<BulkCheckin>,
    pub queue: Arc<InMemoryActionQueue>,
    pub dispatcher: Arc<InMemoryActionDispatcher>,
    pub monitor: Arc<InMemoryPolicyMonitor>,
    pub action_monitor: Arc<ActionMonitor>,
    pub issuer: Arc<LocalCredentialIssuer>,
    pub cache: Arc<LruActionCache>,
    pub shutdown: CancellationToken,
    pub checkin: Arc<CheckinService>,
    pub acks: Arc<AckService>,
}

impl Harness {
    pub fn new() -> Self {
        Self::build(CheckinSettings::default(), true)
    }

    pub fn build(settings: CheckinSettings, with_resolver: bool) -> Self {
        let store = Arc::new(InMemoryDocumentStore::new());
        let bulk = Arc::new(BulkCheckin::new(store.clone(), store.clone(), Duration::from_secs(10)));
        let queue = Arc::new(InMemoryActionQueue::new(8));
        let dispatcher = Arc::new(InMemoryActionDispatcher::new(8));
        let monitor = Arc::new(InMemoryPolicyMonitor::new(8));
        let action_monitor = Arc::new(ActionMonitor::new(
            store.clone(),
            dispatcher.clone(),
            Duration::from_secs(1),
        ));
        let issuer = Arc::new(LocalCredentialIssuer::new(store.clone()));
        let cache = Arc::new(LruActionCache::with_capacity(64));
        let authenticator = Arc::new(ApiKeyAuthenticator::new(store.clone()));
        let shutdown = CancellationToken::new();

        let token_resolver: Option<Arc<dyn TokenResolver>> = if with_resolver {
            Some(Arc::new(CachingTokenResolver::new(store.clone(), 64)))
        } else {
            None
        };

        let deps = CheckinDeps {
            authenticator: authenticator.clone(),
            bulk_checkin: bulk.clone(),
            action_search: store.clone(),
            action_queue: queue.clone(),
            dispatcher: dispatcher.clone(),
            policy_monitor: monitor.clone(),
            token_resolver,
            policy_injector: Arc::new(PolicyInjector::new(store.clone(), issuer.clone())),
        };

        let checkin = Arc::new(CheckinService::new(deps, settings, shutdown.clone()));
        let acks = Arc::new(AckService::new(authenticator, store.clone(), cache.clone()));

        Self {
            store,
            bulk,
            queue,
            dispatcher,
            monitor,
            action_monitor,
            issuer,
            cache,
            shutdown,
            checkin,
            acks,
        }
    }

    /// Enroll an active agent; returns its `Authorization` header value.
    pub async fn enroll(&self, agent_id: &str, policy_id: &str, revision: i64, extra: Value) -> String {
        let key = self.issuer.issue(agent_id, "access").await.unwrap();

        let mut body = json!({
            "active": true,
            "policy_id": policy_id,
            "policy_revision": revision,
            "access_api_key_id": key.id,
        });
        if let (Some(obj), Value::Object(extra)) = (body.as_object_mut(), extra) {
            obj.extend(extra);
        }

        self.store
            .create(AGENT_DOC_TYPE, body, WriteOptions::default().with_id(agent_id))
            .await
            .unwrap();

        format!("ApiKey {}", key.token())
    }

    pub async fn agent(&self, agent_id: &str) -> Agent {
        let body = self.store.read(AGENT_DOC_TYPE, agent_id).await.unwrap();
        Agent::from_document(agent_id, body).unwrap()
    }

    /// Index an action targeted at `agents` and advance the checkpoint.
    pub fn index_action(&self, agents: &[&str]) -> ActionDoc {
        let doc = self.store_action(agents);
        self.dispatcher.set_checkpoint(doc.seq_no);
        doc
    }

    /// Index an action without touching the dispatcher.
    pub fn store_action(&self, agents: &[&str]) -> ActionDoc {
        self.store.index_action(ActionDoc {
            doc_id: String::new(),
            seq_no: 0,
            action_id: uuid::Uuid::new_v4().to_string(),
            action_type: "UPGRADE".to_string(),
            agents: agents.iter().map(|a| a.to_string()).collect(),
            data: json!({ "version": "8.1.0" }),
            timestamp: Utc::now(),
            expiration: None,
        })
    }

    pub async fn save_action(&self, action: &Action) {
        self.store
            .create(
                ACTION_DOC_TYPE,
                serde_json::to_value(action).unwrap(),
                WriteOptions::default().with_id(action.id.clone()),
            )
            .await
            .unwrap();
    }

    pub fn subscriber_counts(&self) -> (usize, usize, usize) {
        (
            self.queue.subscriber_count(),
            self.dispatcher.subscriber_count(),
            self.monitor.subscriber_count(),
        )
    }

    /// Yield until every source holds `n` subscribers.
    pub async fn wait_for_subscribers(&self, n: usize) {
        for _ in 0..1000 {
            if self.subscriber_counts() == (n, n, n) {
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!("subscribers never reached {}: {:?}", n, self.subscriber_counts());
    }
}

pub fn policy_change(id: &str, policy_id: &str, revision: i64) -> Action {
    Action {
        id: id.to_string(),
        action_type: "POLICY_CHANGE".to_string(),
        policy_id: policy_id.to_string(),
        policy_revision: revision,
        data: json!({
            "policy": {
                "id": policy_id,
                "revision": revision,
                "outputs": { "default": { "type": "elasticsearch" } }
            }
        }),
        ack_data: Some(json!({ "packages": ["system"], "revision": revision })),
        created_at: "2026-01-01T00:00:00Z".to_string(),
        ..Default::default()
    }
}
