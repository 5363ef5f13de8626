//! Ops commands for cluster management

pub mod repair;
pub mod verify;

pub use repair::{repair_outliers, RepairReport};
pub use verify::{verify_cluster, VerifyReport};
