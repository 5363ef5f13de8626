//! Coordinator
//!
//! The coordinator is responsible for:
//! - Accepting client auction operations
//! - Fanning each one out to every live replica
//! - Voting over the answers and repairing outliers
//! - The client handshake and optional session tokens
//! - Tracking replica registrations and heartbeats

pub mod dispatch;
pub mod http;
pub mod server;

pub use dispatch::Coordinator;
pub use server::CoordinatorServer;
