//! cultivator CLI
//!
//! ## Usage
//! ```bash
//! # Run every configured check against every installed repository
//! cultivator --config ./config.yaml execute
//!
//! # Keep processing other repositories when one fails
//! cultivator execute --keep-going
//!
//! # List repositories and their mirror paths
//! cultivator targets
//!
//! # Print an installation token
//! CULTIVATOR_CONFIG=./config.yaml cultivator token --installation-id 78901234
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use cultivator::auth::CredentialProvider;
use cultivator::config::{Config, DEFAULT_CONFIG_FILE};
use cultivator::{ExecuteOptions, Executor};

/// Fleet-wide repository maintenance bot for GitHub Apps
#[derive(Parser, Debug)]
#[command(name = "cultivator")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to the YAML config file
    #[arg(long, global = true, env = "CULTIVATOR_CONFIG", default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Log at debug level (ignored when RUST_LOG is set)
    #[arg(long, short, global = true)]
    verbose: bool,

    /// Log line format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run all checks against all targets
    Execute {
        /// Continue past per-repository failures and report them at the end
        #[arg(long)]
        keep_going: bool,
    },
    /// Resolve and print targets without syncing anything
    Targets,
    /// Mint an installation access token
    Token {
        /// GitHub App installation ID
        #[arg(long, env = "GITHUB_INSTALLATION_ID")]
        installation_id: u64,

        /// Output format
        #[arg(long, value_enum, default_value_t = TokenFormat::Token)]
        format: TokenFormat,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum LogFormat {
    Text,
    Json,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum TokenFormat {
    Token,
    Json,
}

#[derive(Serialize)]
struct TokenOutput {
    token: String,
    installation_id: u64,
    expires_at: String,
}

fn init_tracing(verbose: bool, format: LogFormat) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_format);

    if let Err(e) = run(cli).await {
        error!(error = %format!("{e:#}"), "cultivator failed");
        return Err(e);
    }
    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load(&cli.config)
        .with_context(|| format!("Failed to load config {}", cli.config.display()))?;

    match cli.command {
        Command::Execute { keep_going } => {
            let executor = Executor::new(config, ExecuteOptions { keep_going })?;
            let summary = executor.execute().await?;
            for check in &summary.checks {
                info!(summary = %check, "Check summary");
            }
        }
        Command::Targets => {
            let executor = Executor::new(config, ExecuteOptions::default())?;
            let resolution = executor.resolve().await?;
            for target in &resolution.targets {
                println!("{}\t{}", target.repo.full_name, target.local_path.display());
            }
        }
        Command::Token {
            installation_id,
            format,
        } => {
            let credentials = CredentialProvider::from_config(&config)?;
            let access = credentials
                .installation_access(installation_id)
                .await
                .with_context(|| format!("Failed to mint token for installation {installation_id}"))?;

            let output = match format {
                TokenFormat::Json => serde_json::to_string_pretty(&TokenOutput {
                    token: access.token.clone(),
                    installation_id,
                    expires_at: access.expires_at.to_rfc3339(),
                })?,
                TokenFormat::Token => access.token.clone(),
            };
            println!("{output}");
            info!(installation_id, expires_at = %access.expires_at, "Token generated");
        }
    }

    Ok(())
}
