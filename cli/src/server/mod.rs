// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! HTTP server wiring
//!
//! Builds the check-in core from configuration, runs the batched writer's
//! flush loop and the action index monitor, and serves the agent API until
//! a shutdown signal arrives.

use anyhow::{Context, Result};
use axum::Router;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use fleet_core::application::{
    AckService, BulkCheckin, CheckinDeps, CheckinError, CheckinService, CheckinSettings,
    PolicyInjector,
};
use fleet_core::domain::config::FleetConfig;
use fleet_core::domain::repository::{ActionSearch, BulkIndexer, DocumentStore, TokenResolver};
use fleet_core::infrastructure::{
    ActionMonitor, ApiKeyAuthenticator, CachingTokenResolver, InMemoryActionDispatcher, InMemoryActionQueue,
    InMemoryDocumentStore, InMemoryPolicyMonitor, LocalCredentialIssuer, LruActionCache,
    PostgresDocumentStore,
};
use fleet_core::presentation::api::app;

/// Wired server: the router plus the background tasks it depends on.
pub struct FleetServer {
    pub router: Router,
    pub bulk_checkin: Arc<BulkCheckin>,
    pub action_monitor: Arc<ActionMonitor>,
    pub dispatcher: Arc<InMemoryActionDispatcher>,
    pub action_queue: Arc<InMemoryActionQueue>,
    pub policy_monitor: Arc<InMemoryPolicyMonitor>,
}

impl FleetServer {
    /// Build against the configured backend.
    pub async fn from_config(config: &FleetConfig, shutdown: CancellationToken) -> Result<Self> {
        match &config.database {
            Some(db) => {
                info!("Connecting to PostgreSQL document store");
                let store = PostgresDocumentStore::connect(&db.url, db.max_connections)
                    .await
                    .context("Failed to connect to database")?;
                store.migrate().await.context("Failed to apply database schema")?;
                let checkpoint = store.max_seq_no().await.context("Failed to read action checkpoint")?;
                Ok(Self::build(config, Arc::new(store), checkpoint, shutdown))
            }
            None => {
                info!("No database configured, using in-memory document store");
                let store = InMemoryDocumentStore::new();
                let checkpoint = store.max_seq_no();
                Ok(Self::build(config, Arc::new(store), checkpoint, shutdown))
            }
        }
    }

    pub fn build<S>(config: &FleetConfig, store: Arc<S>, checkpoint: i64, shutdown: CancellationToken) -> Self
    where
        S: DocumentStore + BulkIndexer + ActionSearch + 'static,
    {
        let queue_capacity = config.subscriptions.queue_capacity;

        let bulk_checkin = Arc::new(BulkCheckin::new(
            store.clone(),
            store.clone(),
            config.checkin.flush_interval,
        ));
        let action_queue = Arc::new(InMemoryActionQueue::new(queue_capacity));
        let dispatcher = Arc::new(InMemoryActionDispatcher::with_checkpoint(queue_capacity, checkpoint));
        let policy_monitor = Arc::new(InMemoryPolicyMonitor::new(queue_capacity));
        let action_monitor = Arc::new(ActionMonitor::new(
            store.clone(),
            dispatcher.clone(),
            config.subscriptions.action_poll_interval,
        ));
        let authenticator = Arc::new(ApiKeyAuthenticator::new(store.clone()));
        let issuer = Arc::new(LocalCredentialIssuer::new(store.clone()));
        let cache = Arc::new(LruActionCache::with_capacity(config.action_cache.capacity));

        let token_resolver: Option<Arc<dyn TokenResolver>> = if config.token_resolver.enabled {
            Some(Arc::new(CachingTokenResolver::new(
                store.clone(),
                config.token_resolver.cache_capacity,
            )))
        } else {
            None
        };

        let deps = CheckinDeps {
            authenticator: authenticator.clone(),
            bulk_checkin: bulk_checkin.clone(),
            action_search: store.clone(),
            action_queue: action_queue.clone(),
            dispatcher: dispatcher.clone(),
            policy_monitor: policy_monitor.clone(),
            token_resolver,
            policy_injector: Arc::new(PolicyInjector::new(store.clone(), issuer)),
        };

        let checkin = Arc::new(CheckinService::new(
            deps,
            CheckinSettings::from_config(config),
            shutdown,
        ));
        let acks = Arc::new(AckService::new(authenticator, store, cache));

        Self {
            router: app(checkin, acks),
            bulk_checkin,
            action_monitor,
            dispatcher,
            action_queue,
            policy_monitor,
        }
    }

    /// Spawn the batched writer's flush loop.
    pub fn spawn_flush_loop(&self, shutdown: CancellationToken) -> JoinHandle<()> {
        let bulk_checkin = self.bulk_checkin.clone();
        tokio::spawn(async move {
            match bulk_checkin.run(shutdown).await {
                Err(CheckinError::Cancelled) | Ok(()) => {}
                Err(e) => error!(error = %e, "Bulk check-in loop exited"),
            }
        })
    }

    /// Spawn the loop that dispatches newly indexed actions.
    pub fn spawn_action_monitor(&self, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.action_monitor.clone().run(shutdown))
    }
}

pub async fn start_server(config: FleetConfig) -> Result<()> {
    config.validate().context("Configuration validation failed")?;

    if let Some(port) = config.observability.metrics_port {
        let addr = SocketAddr::from(([0, 0, 0, 0], port));
        PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .context("Failed to install Prometheus exporter")?;
        info!("Metrics exporter listening on {}", addr);
    }

    let shutdown = CancellationToken::new();
    let server = FleetServer::from_config(&config, shutdown.clone()).await?;
    let flush_loop = server.spawn_flush_loop(shutdown.clone());
    let action_monitor = server.spawn_action_monitor(shutdown.clone());

    let addr = format!("{}:{}", config.server.bind_address, config.server.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    info!("Fleet server listening on {}", addr);

    let signal_token = shutdown.clone();
    axum::serve(listener, server.router)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            // Release held long polls so graceful shutdown can finish.
            signal_token.cancel();
        })
        .await
        .context("HTTP server failed")?;

    shutdown.cancel();
    if let Err(e) = flush_loop.await {
        error!(error = %e, "Flush loop task failed");
    }
    if let Err(e) = action_monitor.await {
        error!(error = %e, "Action monitor task failed");
    }

    info!("Fleet server shut down");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
    }
}
