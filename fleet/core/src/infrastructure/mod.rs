// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Collaborator implementations.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure
//! - **Purpose:** Back the domain contracts with memory or PostgreSQL
//!
//! | Module | Provides |
//! |--------|----------|
//! | [`memory_store`] | `InMemoryDocumentStore` (store, indexer, action search) |
//! | [`postgres_store`] | `PostgresDocumentStore` (store, indexer, action search) |
//! | [`action_cache`] | `LruActionCache` |
//! | [`token_resolver`] | `CachingTokenResolver` |
//! | [`credentials`] | `LocalCredentialIssuer` |
//! | [`auth`] | `ApiKeyAuthenticator` |
//! | [`subscriptions`] | Legacy queue, dispatcher, action index monitor and policy monitor |

pub mod memory_store;
pub mod postgres_store;
pub mod action_cache;
pub mod token_resolver;
pub mod credentials;
pub mod auth;
pub mod subscriptions;

pub use memory_store::InMemoryDocumentStore;
pub use postgres_store::PostgresDocumentStore;
pub use action_cache::LruActionCache;
pub use token_resolver::CachingTokenResolver;
pub use credentials::LocalCredentialIssuer;
pub use auth::ApiKeyAuthenticator;
pub use subscriptions::{ActionMonitor, InMemoryActionDispatcher, InMemoryActionQueue, InMemoryPolicyMonitor};
