// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Configuration management commands
//!
//! Commands: show, validate, generate

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::{Path, PathBuf};

use fleet_core::domain::config::FleetConfig;

pub const MINIMAL_TEMPLATE: &str = include_str!("../../templates/config-minimal.yaml");
pub const EXAMPLES_TEMPLATE: &str = include_str!("../../templates/config-with-examples.yaml");

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Show config file paths checked
        #[arg(long)]
        paths: bool,
    },

    /// Validate configuration file
    Validate {
        /// Path to config file (default: discover)
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },

    /// Generate sample configuration
    Generate {
        /// Output path (default: ./fleet-server.yaml)
        #[arg(short, long, default_value = "./fleet-server.yaml")]
        output: PathBuf,

        /// Include examples and comments
        #[arg(long)]
        examples: bool,
    },
}

pub async fn handle_command(
    command: ConfigCommand,
    config_override: Option<PathBuf>,
) -> Result<()> {
    match command {
        ConfigCommand::Show { paths } => show(config_override, paths).await,
        ConfigCommand::Validate { file } => validate(file.or(config_override)).await,
        ConfigCommand::Generate { output, examples } => generate(&output, examples).await,
    }
}

async fn show(config_override: Option<PathBuf>, show_paths: bool) -> Result<()> {
    let config = FleetConfig::load_or_default(config_override.clone())
        .context("Failed to load configuration")?;

    if show_paths {
        println!("{}", "Configuration discovery paths:".bold());
        if let Some(path) = &config_override {
            println!("  1. --config flag: {}", path.display());
        } else {
            println!("  1. --config flag: {}", "(not set)".dimmed());
        }
        println!(
            "  2. FLEET_CONFIG_PATH: {}",
            std::env::var("FLEET_CONFIG_PATH")
                .unwrap_or_else(|_| "(not set)".to_string())
                .dimmed()
        );
        println!("  3. ./fleet-server.yaml");
        println!("  4. ~/.fleet/config.yaml");
        println!("  5. /etc/fleet-server/config.yaml");
        println!();
    }

    println!("{}", "Current configuration:".bold());
    println!();

    println!("{}", "Server:".bold());
    println!("  Listen: {}:{}", config.server.bind_address, config.server.port);
    println!();

    println!("{}", "Check-in:".bold());
    println!("  Flush interval: {:?}", config.checkin.flush_interval);
    println!("  Long-poll timeout: {:?}", config.checkin.long_poll_timeout);
    println!("  Keep-alive interval: {:?}", config.checkin.keep_alive_interval);
    println!(
        "  Action poll interval: {:?}",
        config.subscriptions.action_poll_interval
    );
    println!(
        "  Action dispatch: {}",
        if config.features.actions { "enabled".green() } else { "disabled".yellow() }
    );
    println!();

    println!("{}", "Storage:".bold());
    match &config.database {
        Some(db) => println!("  PostgreSQL (max {} connections)", db.max_connections),
        None => println!("  In-memory {}", "(state is lost on restart)".dimmed()),
    }
    println!();

    println!("{}", "Observability:".bold());
    println!("  Log level: {}", config.observability.log_level);
    match config.observability.metrics_port {
        Some(port) => println!("  Metrics port: {}", port),
        None => println!("  Metrics port: {}", "(disabled)".dimmed()),
    }
    println!();

    Ok(())
}

async fn validate(config_path: Option<PathBuf>) -> Result<()> {
    println!("Validating configuration...");

    let config = FleetConfig::load_or_default(config_path)
        .context("Failed to load configuration")?;

    config
        .validate()
        .context("Configuration validation failed")?;

    println!("{}", "✓ Configuration is valid".green());

    Ok(())
}

async fn generate(output: &Path, with_examples: bool) -> Result<()> {
    write_template(output, with_examples)?;

    println!(
        "{}",
        format!("✓ Configuration generated: {}", output.display()).green()
    );

    Ok(())
}

/// Write a sample configuration file.
pub fn write_template(output: &Path, with_examples: bool) -> Result<()> {
    let sample = if with_examples {
        EXAMPLES_TEMPLATE
    } else {
        MINIMAL_TEMPLATE
    };

    std::fs::write(output, sample)
        .with_context(|| format!("Failed to write config to {:?}", output))
}
