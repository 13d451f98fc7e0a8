// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Fleet Server Core
//!
//! Control-plane check-in server for a fleet of remote agents. Agents call in
//! to report liveness and metadata, receive pending actions (policy changes,
//! upgrades, unenroll) and acknowledge the actions they applied.
//!
//! # Architecture
//!
//! - **Layer:** Core System
//! - **Purpose:** Check-in / action-dispatch / acknowledgment
//!
//! | Layer | Contents |
//! |-------|----------|
//! | [`domain`] | Agent and action records, wire types, collaborator contracts, configuration |
//! | [`application`] | Batched check-in writer, long-poll check-in, ack reconciliation, policy injection |
//! | [`infrastructure`] | In-memory and PostgreSQL collaborators, action cache, subscription sources |
//! | [`presentation`] | Axum HTTP surface |

pub mod domain;
pub mod application;
pub mod infrastructure;
pub mod presentation;

pub use domain::*;
