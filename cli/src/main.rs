// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # Fleet Server CLI
//!
//! The `fleet-server` binary serves the agent check-in API.
//!
//! ## Commands
//!
//! - `fleet-server serve` - Run the check-in server
//! - `fleet-server config show|validate|generate` - Configuration management

use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;

use fleet_server::commands::{self, ConfigCommand, ServeArgs};
use fleet_server::logging;

/// Fleet Server - check-in, action dispatch and acknowledgment for agents
#[derive(Parser)]
#[command(name = "fleet-server")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(
        short,
        long,
        global = true,
        env = "FLEET_CONFIG_PATH",
        value_name = "FILE"
    )]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); defaults to the
    /// configuration's observability.log_level
    #[arg(long, global = true, env = "FLEET_LOG_LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the check-in server
    #[command(name = "serve")]
    Serve(ServeArgs),

    /// Configuration management
    #[command(name = "config")]
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env file is fine
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let level = logging::resolve_log_level(cli.log_level.clone(), cli.config.clone());
    logging::init_logging(&level)?;

    match cli.command {
        Some(Commands::Serve(args)) => commands::serve::execute(args, cli.config).await,
        Some(Commands::Config { command }) => {
            commands::config::handle_command(command, cli.config).await
        }
        None => {
            eprintln!("{}", "No command specified. Use --help for usage.".yellow());
            std::process::exit(1);
        }
    }
}
