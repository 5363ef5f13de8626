//! # quorum-auction
//!
//! A replicated auction store with:
//! - A coordinator that fans every operation out to all live replicas
//! - Plurality voting over replica answers, with whole-state repair of outliers
//! - State transfer for replicas joining a running cluster
//! - Mutual ed25519 challenge-response authentication, optional session tokens
//!
//! ## Architecture

#![allow(clippy::result_large_err)]
//!
//! ```text
//!            ┌──────────────┐
//!            │    Client    │
//!            └──────┬───────┘
//!                   │ handshake, then auction calls (HTTP)
//!         ┌─────────▼──────────────────────────┐
//!         │            Coordinator             │
//!         │  resolve → broadcast → vote →      │
//!         │  repair outliers → answer          │
//!         └─────────┬──────────────────────────┘
//!                   │ POST /rpc (JSON)
//!   ┌───────────────┼──────────────────┐
//!   │               │                  │
//! ┌─▼──────────┐ ┌──▼─────────┐ ┌──────▼─────┐
//! │ Replica 1  │ │ Replica 2  │ │ Replica 3  │
//! │ full map   │ │ full map   │ │ full map   │
//! └────────────┘ └────────────┘ └────────────┘
//! ```
//!
//! ## Usage
//!
//! ### Start a coordinator
//! ```bash
//! auction-coord serve --id coord-1 --bind 0.0.0.0:5000
//! ```
//!
//! ### Start replicas
//! ```bash
//! auction-replica serve --id r1 --bind 127.0.0.1:6001 --coordinator http://localhost:5000
//! auction-replica serve --id r2 --bind 127.0.0.1:6002 --coordinator http://localhost:5000
//! ```
//!
//! ### Use the CLI
//! ```bash
//! # Key pair for a new user; register the public half under coordinator.users
//! auction keygen
//!
//! auction --username sally --email sally@example.com --key <hex> --server-key <hex> \
//!   create "brass lamp" --start 10 --reserve 20
//! auction ... bid <id> 15
//! auction ... close <id>
//! auction ... list
//! ```

pub mod client;
pub mod cluster;
pub mod common;
pub mod coordinator;
pub mod ops;
pub mod replica;

// Re-export commonly used types
pub use client::CoordinatorClient;
pub use common::{Config, Error, Result};
pub use coordinator::{Coordinator, CoordinatorServer};
pub use replica::{AuctionBook, ReplicaServer};

/// Current version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build info
pub const BUILD_INFO: &str = concat!(env!("CARGO_PKG_VERSION"), " (", env!("CARGO_PKG_NAME"), ")");
