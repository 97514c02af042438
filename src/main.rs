//! Multisig Treasury Governor - governance record-keeper CLI

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::error;

use multisig_governor::cli;
use multisig_governor::config::Config;

/// Multisig treasury governance record-keeper
#[derive(Parser)]
#[command(name = "govern")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the current wallet and record counts
    Status,

    /// Fetch a contract's indexed state from the chain oracle
    CheckContract {
        /// Contract address
        address: String,
    },

    /// Show the effective configuration
    ShowConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let config = Config::load(&cli.config)?;

    let result = match cli.command {
        Commands::Status => cli::status(&config).await,
        Commands::CheckContract { address } => cli::check_contract(&config, &address).await,
        Commands::ShowConfig => {
            cli::show_config(&config);
            Ok(())
        }
    };

    if let Err(e) = &result {
        error!("Command failed: {}", e);
    }
    result
}
