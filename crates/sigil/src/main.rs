//! Sigil - OAuth 2.0 authorization code + PKCE client
//!
//! Main entry point for the Sigil CLI.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;

use commands::{config, fetch, keys, login};

// ─────────────────────────────────────────────────────────────────────────────
// CLI Structure
// ─────────────────────────────────────────────────────────────────────────────

/// Sigil - OAuth 2.0 authorization code + PKCE client
#[derive(Parser)]
#[command(name = "sigil")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output as JSON (for scripting)
    #[arg(long, global = true)]
    pub json: bool,

    /// Load this config file instead of discovering config layers
    #[arg(long, global = true, env = "SIGIL_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Authorize with the authorization server
    Login(login::LoginArgs),

    /// Authorize, then GET a protected resource
    Fetch(fetch::FetchArgs),

    /// List the authorization server's signing keys
    Keys(keys::KeysArgs),

    /// Configuration management
    Config(config::ConfigArgs),
}

// ─────────────────────────────────────────────────────────────────────────────
// Main
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing — console (human-readable) + rotating JSON file
    let filter = if cli.verbose {
        "sigil=debug,sigil_oauth=debug,sigil_config=debug,info"
    } else {
        "sigil=info,sigil_oauth=info,warn"
    };

    let log_dir = sigil_config::user_config_dir()
        .map(|d| d.join("logs"))
        .unwrap_or_else(|| PathBuf::from("logs"));
    let file_appender = tracing_appender::rolling::daily(&log_dir, "sigil.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    use tracing_subscriber::prelude::*;
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_writer(std::io::stderr)
                .with_filter(tracing_subscriber::EnvFilter::new(filter)),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(non_blocking)
                .with_filter(tracing_subscriber::EnvFilter::new(
                    "sigil=trace,sigil_oauth=trace,sigil_config=trace,info",
                )),
        )
        .init();

    let ctx = commands::Context {
        config_file: cli.config,
        json_output: cli.json,
        verbose: cli.verbose,
    };

    match cli.command {
        Commands::Login(args) => login::run(args, &ctx).await,
        Commands::Fetch(args) => fetch::run(args, &ctx).await,
        Commands::Keys(args) => keys::run(args, &ctx).await,
        Commands::Config(args) => config::run(args, &ctx).await,
    }
}
