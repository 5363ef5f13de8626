//! Coordinator binary

use clap::{Parser, Subcommand};
use quorum_auction::common::Config;
use quorum_auction::CoordinatorServer;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "auction-coord")]
#[command(about = "Auction coordinator: fans operations out to replicas and reconciles answers")]
#[command(version)]
struct Cli {
    /// Config file (defaults to AUCTION_CONFIG or ./auction.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start coordinator server
    Serve {
        /// Node ID
        #[arg(long)]
        id: Option<String>,

        /// Bind address for HTTP
        #[arg(long)]
        bind: Option<SocketAddr>,

        /// Round timeout in milliseconds
        #[arg(long)]
        round_timeout_ms: Option<u64>,

        /// Require a session token on auction endpoints
        #[arg(long)]
        require_session: bool,

        /// Audit log file
        #[arg(long)]
        audit_log: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load config from file and environment, then override with CLI arguments
    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match cli.command {
        Commands::Serve {
            id,
            bind,
            round_timeout_ms,
            require_session,
            audit_log,
        } => {
            if let Some(bind) = bind {
                config.coordinator.bind_addr = bind;
            }
            if let Some(timeout) = round_timeout_ms {
                config.coordinator.round_timeout_ms = timeout;
            }
            if require_session {
                config.coordinator.require_session = true;
            }
            if audit_log.is_some() {
                config.coordinator.audit_log = audit_log;
            }
            config.validate()?;

            let node_id = id.unwrap_or(config.node_id);
            let coord = CoordinatorServer::new(config.coordinator, node_id);
            coord.serve().await?;
        }
    }

    Ok(())
}
