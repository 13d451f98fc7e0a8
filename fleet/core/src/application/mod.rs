// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Check-in use cases.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Orchestrates the domain contracts behind the HTTP surface

pub mod error;
pub mod bulk_checkin;
pub mod checkin;
pub mod ack;
pub mod policy;

pub use error::CheckinError;
pub use bulk_checkin::BulkCheckin;
pub use checkin::{CheckinDeps, CheckinService, CheckinSettings, WaitOutcome};
pub use ack::{select_policy_winner, AckService};
pub use policy::PolicyInjector;
