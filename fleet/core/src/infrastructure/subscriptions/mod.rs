// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! In-process action subscription sources.
//!
//! Each source keeps the sending half of every subscriber's bounded queue.
//! A delivery that finds the queue full is dropped for that subscriber with
//! a warning; the agent picks the action up on its next check-in through
//! the pending action fetch.

pub mod action_monitor;
pub mod action_queue;
pub mod dispatcher;
pub mod policy_monitor;

pub use action_monitor::ActionMonitor;
pub use action_queue::InMemoryActionQueue;
pub use dispatcher::InMemoryActionDispatcher;
pub use policy_monitor::InMemoryPolicyMonitor;

/// Default bound of each subscriber's queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 16;
