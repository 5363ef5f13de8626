//! Replica binary

use clap::{Parser, Subcommand};
use quorum_auction::common::Config;
use quorum_auction::ReplicaServer;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "auction-replica")]
#[command(about = "Auction replica: holds a full copy of the auction map")]
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
    /// Start replica server
    Serve {
        /// Replica ID, unique in the cluster
        #[arg(long)]
        id: Option<String>,

        /// Bind address for the RPC endpoint
        #[arg(long)]
        bind: Option<SocketAddr>,

        /// URL the coordinator and peers should use to reach this replica
        #[arg(long)]
        advertise: Option<String>,

        /// Coordinator URL
        #[arg(long)]
        coordinator: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

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
            advertise,
            coordinator,
        } => {
            if let Some(bind) = bind {
                config.replica.bind_addr = bind;
            }
            if advertise.is_some() {
                config.replica.advertise_url = advertise;
            }
            if let Some(url) = coordinator {
                config.replica.coordinator_url = url;
            }

            let replica_id = id.unwrap_or(config.node_id);
            let replica = ReplicaServer::new(config.replica, replica_id);
            replica.serve().await?;
        }
    }

    Ok(())
}
