// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Domain model and collaborator contracts.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Records, wire types and the interfaces the core consumes

pub mod agent;
pub mod action;
pub mod checkin;
pub mod config;
pub mod auth;
pub mod repository;
pub mod subscription;
