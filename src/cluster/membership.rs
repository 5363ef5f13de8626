//! Cluster membership
//!
//! Membership is resolved fresh at the start of every round; nothing caches
//! a view between rounds. A replica that joins is picked up by the next
//! round, one that stops heartbeating drops out of it.

use crate::cluster::transport::{HttpReplica, ReplicaHandle};
use crate::common::{timestamp_now_millis, NodeState};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

/// Source of the current replica set.
pub trait Membership: Send + Sync {
    /// Replicas that should take part in a round starting now.
    fn members(&self) -> Vec<Arc<dyn ReplicaHandle>>;
}

/// Fixed (but editable) set of handles. Used for embedding and tests.
#[derive(Default)]
pub struct StaticMembership {
    members: RwLock<Vec<Arc<dyn ReplicaHandle>>>,
}

impl StaticMembership {
    pub fn new(members: Vec<Arc<dyn ReplicaHandle>>) -> Self {
        Self {
            members: RwLock::new(members),
        }
    }

    pub fn add(&self, member: Arc<dyn ReplicaHandle>) {
        if let Ok(mut members) = self.members.write() {
            members.push(member);
        }
    }

    pub fn remove(&self, id: &str) -> bool {
        match self.members.write() {
            Ok(mut members) => {
                let before = members.len();
                members.retain(|m| m.id() != id);
                members.len() != before
            }
            Err(_) => false,
        }
    }
}

impl Membership for StaticMembership {
    fn members(&self) -> Vec<Arc<dyn ReplicaHandle>> {
        self.members
            .read()
            .map(|members| members.clone())
            .unwrap_or_default()
    }
}

/// Registry entry for one replica.
#[derive(Debug, Clone)]
struct ReplicaRecord {
    url: String,
    registered_at: u64,
    last_heartbeat: u64,
}

/// Public view of a registered replica.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicaInfo {
    pub id: String,
    pub url: String,
    pub state: NodeState,
    pub registered_at: u64,
    pub last_heartbeat: u64,
}

/// Body of `POST /cluster/join`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinRequest {
    pub id: String,
    pub url: String,
}

/// Answer to a join: the peers the new replica should copy state from.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JoinResponse {
    pub peers: Vec<ReplicaInfo>,
}

/// Body of `POST /cluster/heartbeat` and `POST /cluster/leave`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeRequest {
    pub id: String,
}

/// Replicas registered with the coordinator over HTTP.
///
/// Entries go suspect after one missed TTL (excluded from rounds) and are
/// dropped once dead.
pub struct ClusterRegistry {
    nodes: RwLock<BTreeMap<String, ReplicaRecord>>,
    ttl: Duration,
    client: reqwest::Client,
}

impl ClusterRegistry {
    pub fn new(ttl: Duration) -> Self {
        Self {
            nodes: RwLock::new(BTreeMap::new()),
            ttl,
            client: reqwest::Client::new(),
        }
    }

    /// Register or re-register a replica. Returns true if it was not known.
    pub fn register(&self, id: &str, url: &str) -> bool {
        let now = timestamp_now_millis();
        let Ok(mut nodes) = self.nodes.write() else {
            return false;
        };
        let fresh = !nodes.contains_key(id);
        let registered_at = nodes.get(id).map_or(now, |r| r.registered_at);
        nodes.insert(
            id.to_string(),
            ReplicaRecord {
                url: url.to_string(),
                registered_at,
                last_heartbeat: now,
            },
        );
        fresh
    }

    /// Record a heartbeat. False means the replica must register again.
    pub fn heartbeat(&self, id: &str) -> bool {
        let Ok(mut nodes) = self.nodes.write() else {
            return false;
        };
        match nodes.get_mut(id) {
            Some(record) => {
                record.last_heartbeat = timestamp_now_millis();
                true
            }
            None => false,
        }
    }

    pub fn deregister(&self, id: &str) -> bool {
        self.nodes
            .write()
            .map(|mut nodes| nodes.remove(id).is_some())
            .unwrap_or(false)
    }

    /// All known replicas with their current liveness, dead ones pruned.
    pub fn list(&self) -> Vec<ReplicaInfo> {
        let now = timestamp_now_millis();
        let ttl_ms = self.ttl.as_millis() as u64;
        let Ok(mut nodes) = self.nodes.write() else {
            return Vec::new();
        };

        nodes.retain(|id, record| {
            let state = NodeState::from_heartbeat_age(now.saturating_sub(record.last_heartbeat), ttl_ms);
            if state == NodeState::Dead {
                tracing::warn!(replica = %id, "dropping replica with no heartbeat");
            }
            state != NodeState::Dead
        });

        nodes
            .iter()
            .map(|(id, record)| ReplicaInfo {
                id: id.clone(),
                url: record.url.clone(),
                state: NodeState::from_heartbeat_age(
                    now.saturating_sub(record.last_heartbeat),
                    ttl_ms,
                ),
                registered_at: record.registered_at,
                last_heartbeat: record.last_heartbeat,
            })
            .collect()
    }

    /// Healthy replicas other than `id`.
    pub fn peers_of(&self, id: &str) -> Vec<ReplicaInfo> {
        self.list()
            .into_iter()
            .filter(|info| info.id != id && info.state.is_healthy())
            .collect()
    }
}

impl Membership for ClusterRegistry {
    fn members(&self) -> Vec<Arc<dyn ReplicaHandle>> {
        self.list()
            .into_iter()
            .filter(|info| info.state.is_healthy())
            .map(|info| {
                Arc::new(HttpReplica::new(info.id, info.url, self.client.clone()))
                    as Arc<dyn ReplicaHandle>
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::transport::LocalReplica;
    use crate::replica::AuctionBook;

    #[test]
    fn test_static_membership() {
        let membership = StaticMembership::default();
        membership.add(Arc::new(LocalReplica::new("r1", Arc::new(AuctionBook::new()))));
        membership.add(Arc::new(LocalReplica::new("r2", Arc::new(AuctionBook::new()))));
        assert_eq!(membership.members().len(), 2);

        assert!(membership.remove("r1"));
        assert!(!membership.remove("r1"));
        let ids: Vec<String> = membership.members().iter().map(|m| m.id().to_string()).collect();
        assert_eq!(ids, vec!["r2"]);
    }

    #[test]
    fn test_registry_register_and_heartbeat() {
        let registry = ClusterRegistry::new(Duration::from_secs(5));
        assert!(registry.register("r1", "http://127.0.0.1:6001"));
        assert!(!registry.register("r1", "http://127.0.0.1:6001"));
        assert!(registry.register("r2", "http://127.0.0.1:6002"));

        assert!(registry.heartbeat("r1"));
        assert!(!registry.heartbeat("unknown"));

        assert_eq!(registry.members().len(), 2);
        let peers = registry.peers_of("r1");
        assert_eq!(peers.len(), 1);
        assert_eq!(peers[0].id, "r2");

        assert!(registry.deregister("r2"));
        assert_eq!(registry.members().len(), 1);
    }

    #[tokio::test]
    async fn test_registry_drops_silent_replicas() {
        let registry = ClusterRegistry::new(Duration::from_millis(20));
        registry.register("r1", "http://127.0.0.1:6001");
        assert_eq!(registry.members().len(), 1);

        // Past one TTL: still listed, but no longer in rounds.
        tokio::time::sleep(Duration::from_millis(35)).await;
        assert!(registry.members().is_empty());

        // Past three TTLs: gone.
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(registry.list().is_empty());
    }
}
