// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Run the check-in server

use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;
use tracing::info;

use fleet_core::domain::config::FleetConfig;

use crate::server;

#[derive(Args, Debug, Default)]
pub struct ServeArgs {
    /// Override the listen port
    #[arg(long)]
    pub port: Option<u16>,

    /// Override the bind address
    #[arg(long)]
    pub bind: Option<String>,
}

/// Load configuration and apply command-line overrides.
pub fn resolve_config(args: &ServeArgs, config_path: Option<PathBuf>) -> Result<FleetConfig> {
    let mut config = FleetConfig::load_or_default(config_path)
        .context("Failed to load configuration")?;

    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(bind) = &args.bind {
        config.server.bind_address = bind.clone();
    }

    Ok(config)
}

pub async fn execute(args: ServeArgs, config_path: Option<PathBuf>) -> Result<()> {
    let config = resolve_config(&args, config_path)?;
    info!(
        port = config.server.port,
        actions = config.features.actions,
        "Starting fleet server"
    );
    server::start_server(config).await
}
