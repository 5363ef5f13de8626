//! Common utilities and types shared across quorum-auction

pub mod auction;
pub mod audit;
pub mod auth;
pub mod config;
pub mod error;
pub mod fingerprint;
pub mod quorum;
pub mod session;
pub mod utils;

pub use auction::{Auction, AuctionMap, BidOutcome, NewAuction, UserDetails};
pub use audit::{AuditEventType, AUDIT_LOGGER};
pub use config::{Config, CoordinatorConfig, ReplicaConfig};
pub use error::{Error, Result};
pub use fingerprint::{Fingerprint, Fingerprintable};
pub use quorum::{vote, Verdict};
pub use utils::{mint_auction_id, timestamp_now, timestamp_now_millis, NodeState};
