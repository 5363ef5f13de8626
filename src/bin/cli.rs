//! CLI for auction operations

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use quorum_auction::common::auth::{
    authenticate_and_login, generate_signing_key, signing_key_from_hex, verifying_key_from_hex,
    ClientCredentials, Session,
};
use quorum_auction::common::{Auction, NewAuction, UserDetails};
use quorum_auction::CoordinatorClient;

#[derive(Parser)]
#[command(name = "auction")]
#[command(about = "Replicated auction store CLI")]
#[command(version)]
struct Cli {
    /// Coordinator URL
    #[arg(long, default_value = "http://localhost:5000")]
    coordinator: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct Identity {
    /// Username registered with the coordinator
    #[arg(long, env = "AUCTION_USERNAME")]
    username: String,

    /// Contact address
    #[arg(long, env = "AUCTION_EMAIL", default_value = "")]
    email: String,

    /// Hex-encoded ed25519 secret key
    #[arg(long, env = "AUCTION_KEY")]
    key: String,

    /// Hex-encoded coordinator public key
    #[arg(long, env = "AUCTION_SERVER_KEY")]
    server_key: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Print a fresh key pair
    Keygen,

    /// List active auctions
    List {
        #[command(flatten)]
        identity: Identity,
    },

    /// Search auctions by name
    Search {
        #[command(flatten)]
        identity: Identity,

        keyword: String,
    },

    /// Create an auction
    Create {
        #[command(flatten)]
        identity: Identity,

        /// Item name
        name: String,

        #[arg(long)]
        start: f64,

        #[arg(long)]
        reserve: f64,

        #[arg(long, default_value = "")]
        description: String,
    },

    /// Bid on an auction
    Bid {
        #[command(flatten)]
        identity: Identity,

        id: String,

        amount: f64,
    },

    /// Close one of your auctions
    Close {
        #[command(flatten)]
        identity: Identity,

        id: String,
    },

    /// Verify that all replicas agree
    Verify {
        #[command(flatten)]
        identity: Identity,

        /// Repair divergent replicas
        #[arg(long)]
        repair: bool,
    },
}

/// Run the handshake and return a client carrying the session, if any.
async fn login(
    coordinator: &str,
    identity: &Identity,
) -> anyhow::Result<(CoordinatorClient, Session)> {
    let credentials = ClientCredentials {
        user: UserDetails::new(identity.username.clone(), identity.email.clone()),
        signing_key: signing_key_from_hex(&identity.key).context("invalid --key")?,
        server_key: verifying_key_from_hex(&identity.server_key)
            .context("invalid --server-key")?,
    };

    let mut client = CoordinatorClient::new(coordinator);
    let session = authenticate_and_login(&credentials, &client)
        .await
        .context("login failed")?;
    client.set_token(session.token.clone());
    Ok((client, session))
}

fn print_auctions(auctions: &[Auction]) {
    if auctions.is_empty() {
        println!("No active auctions");
        return;
    }
    for auction in auctions {
        let bidder = auction
            .top_bidder
            .as_ref()
            .map(|b| b.name.as_str())
            .unwrap_or("-");
        println!(
            "{}  {:<24} top bid {:>10.2}  bidder {:<12} seller {}",
            auction.id, auction.name, auction.top_bid, bidder, auction.seller.name
        );
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Keygen => {
            let key = generate_signing_key();
            println!("Secret key: {}", hex::encode(key.to_bytes()));
            println!("Public key: {}", hex::encode(key.verifying_key().as_bytes()));
        }

        Commands::List { identity } => {
            let (client, _) = login(&cli.coordinator, &identity).await?;
            print_auctions(&client.show_active().await?);
        }

        Commands::Search { identity, keyword } => {
            let (client, _) = login(&cli.coordinator, &identity).await?;
            print_auctions(&client.show_auction(&keyword).await?);
        }

        Commands::Create {
            identity,
            name,
            start,
            reserve,
            description,
        } => {
            let (client, session) = login(&cli.coordinator, &identity).await?;
            let listing = NewAuction {
                name,
                start_price: start,
                reserve,
                description,
                seller: session.user,
            };
            listing.validate()?;
            let id = client.create_auction(&listing).await?;
            println!("Created auction {}", id);
        }

        Commands::Bid {
            identity,
            id,
            amount,
        } => {
            let (client, session) = login(&cli.coordinator, &identity).await?;
            let outcome = client.bid(&id, session.user, amount).await?;
            println!("Bid on {}: {}", id, outcome);
        }

        Commands::Close { identity, id } => {
            let (client, session) = login(&cli.coordinator, &identity).await?;
            match client.close_auction(&id, &session.user.name).await? {
                Some(auction) => {
                    println!("Closed auction {} ({})", auction.id, auction.name);
                    match &auction.top_bidder {
                        Some(bidder) if auction.reserve_met() => println!(
                            "  Sold to {} <{}> for {:.2}",
                            bidder.name, bidder.email, auction.top_bid
                        ),
                        _ => println!(
                            "  Reserve not met: top bid {:.2}, reserve {:.2}",
                            auction.top_bid, auction.reserve
                        ),
                    }
                }
                None => println!("Auction {} not found, or you are not its seller", id),
            }
        }

        Commands::Verify { identity, repair } => {
            let (client, _) = login(&cli.coordinator, &identity).await?;
            let report = client.verify_cluster(repair).await?;
            println!("Verification report:");
            println!("  Replicas: {}", report.replicas);
            println!("  Answered: {}", report.answered);
            println!("  Reference: {} ({})", report.reference, report.fingerprint);
            println!("  Auctions: {}", report.auctions);
            println!("  Divergent: {:?}", report.divergent);
            if let Some(repair) = report.repair {
                println!("  Repaired: {:?}", repair.repaired);
                println!("  Failed: {:?}", repair.failed);
            }
        }
    }

    Ok(())
}
