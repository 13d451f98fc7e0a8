// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use chrono::Utc;
use fleet_core::domain::action::ActionDoc;
use fleet_core::domain::config::FleetConfig;
use fleet_core::domain::subscription::ActionDispatcher;
use fleet_core::infrastructure::InMemoryDocumentStore;
use fleet_server::server::FleetServer;
use serde_json::json;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

fn upgrade_for(agent_id: &str) -> ActionDoc {
    ActionDoc {
        doc_id: String::new(),
        seq_no: 0,
        action_id: "upgrade-1".to_string(),
        action_type: "UPGRADE".to_string(),
        agents: vec![agent_id.to_string()],
        data: json!({ "version": "8.2.0" }),
        timestamp: Utc::now(),
        expiration: None,
    }
}

#[tokio::test(start_paused = true)]
async fn test_actions_indexed_after_start_are_dispatched() {
    let store = Arc::new(InMemoryDocumentStore::new());
    let shutdown = CancellationToken::new();
    let server = FleetServer::build(&FleetConfig::default(), store.clone(), 0, shutdown.clone());

    let mut sub = server.dispatcher.subscribe("agent-1", 0);
    let monitor = server.spawn_action_monitor(shutdown.clone());

    let indexed = store.index_action(upgrade_for("agent-1"));

    let batch = sub.receiver.recv().await.unwrap();
    assert_eq!(batch.len(), 1);
    assert_eq!(batch[0].doc_id, indexed.doc_id);
    assert_eq!(server.dispatcher.checkpoint(), indexed.seq_no);

    shutdown.cancel();
    monitor.await.unwrap();
}
