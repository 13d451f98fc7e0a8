// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Ack reconciliation against in-memory collaborators.

mod common;

use common::{policy_change, Harness};
use fleet_core::application::CheckinError;
use fleet_core::domain::repository::ActionCache;
use serde_json::json;

fn acks(events: serde_json::Value) -> Vec<u8> {
    serde_json::to_vec(&json!({ "events": events })).unwrap()
}

#[tokio::test]
async fn test_highest_revision_is_recorded() {
    let h = Harness::new();
    let auth = h.enroll("agent-1", "p1", 1, json!({})).await;

    let rev5 = policy_change("pc-5", "p1", 5);
    let rev9 = policy_change("pc-9", "p1", 9);
    h.save_action(&rev5).await;
    h.save_action(&rev9).await;

    let resp = h
        .acks
        .ack(
            "agent-1",
            Some(&auth),
            &acks(json!([{ "action_id": "pc-9", "agent_id": "agent-1" }, { "action_id": "pc-5" }])),
        )
        .await
        .unwrap();
    assert_eq!(resp.action, "acks");

    let agent = h.agent("agent-1").await;
    assert_eq!(agent.policy_revision, 9);
    assert_eq!(agent.packages, rev9.ack_data);
}

#[tokio::test]
async fn test_other_policy_is_not_recorded() {
    let h = Harness::new();
    let auth = h.enroll("agent-1", "p1", 1, json!({})).await;
    h.save_action(&policy_change("pc-other", "p2", 12)).await;

    h.acks
        .ack("agent-1", Some(&auth), &acks(json!([{ "action_id": "pc-other" }])))
        .await
        .unwrap();

    let agent = h.agent("agent-1").await;
    assert_eq!(agent.policy_revision, 1);
    assert!(agent.packages.is_none());
}

#[tokio::test]
async fn test_agent_mismatch_aborts_whole_batch() {
    let h = Harness::new();
    let auth = h.enroll("agent-1", "p1", 1, json!({})).await;
    h.save_action(&policy_change("pc-3", "p1", 3)).await;

    let err = h
        .acks
        .ack(
            "agent-1",
            Some(&auth),
            &acks(json!([{ "action_id": "pc-3" }, { "action_id": "pc-3", "agent_id": "agent-2" }])),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, CheckinError::EventAgentMismatch { .. }));

    let agent = h.agent("agent-1").await;
    assert_eq!(agent.policy_revision, 1);
    assert!(h.cache.get_action("pc-3").is_none());
}

#[tokio::test]
async fn test_store_reads_populate_cache() {
    let h = Harness::new();
    let auth = h.enroll("agent-1", "p1", 1, json!({})).await;
    h.save_action(&policy_change("pc-2", "p1", 2)).await;

    h.acks
        .ack("agent-1", Some(&auth), &acks(json!([{ "action_id": "pc-2" }])))
        .await
        .unwrap();
    assert_eq!(h.cache.get_action("pc-2").unwrap().policy_revision, 2);

    // Cached actions resolve without a stored copy.
    h.cache.set_action(policy_change("pc-cached", "p1", 4));
    h.acks
        .ack("agent-1", Some(&auth), &acks(json!([{ "action_id": "pc-cached" }])))
        .await
        .unwrap();
    assert_eq!(h.agent("agent-1").await.policy_revision, 4);
}

#[tokio::test]
async fn test_unknown_action_fails_request() {
    let h = Harness::new();
    let auth = h.enroll("agent-1", "p1", 1, json!({})).await;

    let err = h
        .acks
        .ack("agent-1", Some(&auth), &acks(json!([{ "action_id": "missing" }])))
        .await
        .unwrap_err();
    assert!(matches!(err, CheckinError::Repository(_)));
}

#[tokio::test]
async fn test_malformed_ack_body() {
    let h = Harness::new();
    let auth = h.enroll("agent-1", "p1", 1, json!({})).await;

    let err = h.acks.ack("agent-1", Some(&auth), b"not json").await.unwrap_err();
    assert!(matches!(err, CheckinError::MalformedRequest(_)));
}
