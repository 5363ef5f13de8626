//! Replica node
//!
//! A replica holds a full copy of the auction map and serves every
//! operation locally. It knows nothing about voting; agreement is the
//! coordinator's job.

pub mod http;
pub mod join;
pub mod server;
pub mod state;

pub use join::{sync_from_peers, JoinReport};
pub use server::ReplicaServer;
pub use state::AuctionBook;
