//! # Clipcast Approver — Approval Gateway Process
//!
//! Single-instance consumer of the Telegram decision channel. Exactly
//! one approver may run per bot token; a second instance exits at the
//! lock check, or on the channel's own 409 conflict if it slipped past.
//!
//! Usage:
//!   clipcast-approver                    # Start the gateway
//!   clipcast-approver --config PATH      # Custom config file

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use clipcast_core::config::ClipcastConfig;
use clipcast_core::error::ClipcastError;
use clipcast_gateway::ApprovalGateway;
use clipcast_store::Store;

#[derive(Parser)]
#[command(
    name = "clipcast-approver",
    version,
    about = "🛂 Clipcast Approver — review decision gateway"
)]
struct Cli {
    /// Config file path
    #[arg(short, long, default_value = "~/.clipcast/config.toml")]
    config: String,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "clipcast_approver=debug,clipcast_gateway=debug"
    } else {
        "clipcast_approver=info,clipcast_gateway=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .init();

    let config_path = shellexpand::tilde(&cli.config).into_owned();
    let config = if Path::new(&config_path).exists() {
        ClipcastConfig::load_from(Path::new(&config_path))?
    } else {
        ClipcastConfig::default()
    };

    if config.telegram.bot_token.is_empty() {
        anyhow::bail!("telegram.bot_token is not configured");
    }

    let db_path = shellexpand::tilde(&config.store.db_path).into_owned();
    let store = Arc::new(Store::open(Path::new(&db_path))?);

    let gateway = match ApprovalGateway::start(&config.telegram, store) {
        Ok(gateway) => gateway,
        Err(ClipcastError::LockHeld { pid, started_at }) => {
            eprintln!("❌ Another approver holds the lock (pid {pid}, since {started_at}).");
            eprintln!("   Remove the lock file only if that process is gone.");
            std::process::exit(1);
        }
        Err(e) => return Err(e.into()),
    };

    println!("🛂 Clipcast approver v{}", env!("CARGO_PKG_VERSION"));
    match gateway.run().await {
        Ok(()) => Ok(()),
        Err(ClipcastError::ChannelConflict) => {
            eprintln!("❌ The decision channel is being consumed elsewhere; exiting.");
            std::process::exit(2);
        }
        Err(e) => Err(e.into()),
    }
}
