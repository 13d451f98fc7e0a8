// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Presentation Layer (`fleet-server-core`)
//!
//! HTTP surface that translates agent requests into application service
//! calls. No business logic lives here.
//!
//! | Module | Transport | Description |
//! |--------|-----------|-------------|
//! | [`api`] | HTTP (Axum) | Check-in, ack and health endpoints |

pub mod api;
