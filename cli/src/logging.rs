// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Logging setup

use anyhow::{Context, Result};
use std::path::PathBuf;

use fleet_core::domain::config::FleetConfig;

pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Level from `--log-level` / `FLEET_LOG_LEVEL`, else the configuration's
/// `observability.log_level`, else `info`.
pub fn effective_log_level(flag: Option<String>, config: Option<&FleetConfig>) -> String {
    flag.or_else(|| config.map(|c| c.observability.log_level.clone()))
        .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string())
}

/// Resolve the level before the subscriber exists.
///
/// A configuration that fails to load here is reported later by the command
/// that needs it.
pub fn resolve_log_level(flag: Option<String>, config_path: Option<PathBuf>) -> String {
    if flag.is_some() {
        return effective_log_level(flag, None);
    }
    let config = FleetConfig::load_or_default(config_path).ok();
    effective_log_level(None, config.as_ref())
}

/// Initialize tracing subscriber for logging. `RUST_LOG` takes precedence.
pub fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .init();

    Ok(())
}
