//! Replica-facing plumbing shared by the coordinator and joining replicas

pub mod broadcast;
pub mod membership;
pub mod rpc;
pub mod transport;

pub use broadcast::{broadcast, call_one, extract_all};
pub use membership::{
    ClusterRegistry, JoinRequest, JoinResponse, Membership, NodeRequest, ReplicaInfo,
    StaticMembership,
};
pub use rpc::{ReplicaRequest, ReplicaResponse};
pub use transport::{HttpReplica, LocalReplica, ReplicaHandle};
