//! Gated sniper - risk-gated pump.fun entry/exit pipeline
//!
//! # WARNING
//! - This bot trades with real money. Only use funds you can afford to lose.
//! - Most pump.fun tokens go to zero (rug pulls, abandonment).
//! - The fee budget only limits fees; it does not limit trading losses.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::error;
use tracing_subscriber::EnvFilter;

use gated_sniper::cli::commands;
use gated_sniper::config::Config;

/// Risk-gated pump.fun sniper
#[derive(Parser)]
#[command(name = "sniper")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the pipeline
    Start {
        /// Run the filters but submit nothing
        #[arg(long)]
        dry_run: bool,
    },

    /// Show current configuration (secrets masked)
    Config,

    /// Check RPC endpoints, relay and keypair
    Health,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("gated_sniper=info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    if std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json")) {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();

    let config = match Config::load(&cli.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Start { dry_run } => match commands::startup_checks(&config) {
            Ok(()) => commands::start(config, &cli.config, dry_run).await,
            Err(e) => Err(e.context("Startup checks failed")),
        },
        Commands::Config => commands::show_config(&config),
        Commands::Health => commands::health(&config).await,
    };

    if let Err(e) = result {
        error!("Command failed: {:#}", e);
        std::process::exit(1);
    }

    Ok(())
}
