//! State transfer for a replica joining a running cluster
//!
//! The joining replica asks every peer for its full state, votes over the
//! answers and adopts the winner. With no peers, or none answering, it
//! starts empty.

use crate::cluster::broadcast::{broadcast, extract_all};
use crate::cluster::rpc::{ReplicaRequest, ReplicaResponse};
use crate::cluster::transport::ReplicaHandle;
use crate::common::{vote, AuditEventType, AUDIT_LOGGER};
use crate::replica::state::AuctionBook;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct JoinReport {
    pub peers: usize,
    pub answered: usize,
    /// Peer whose state was adopted.
    pub source: Option<String>,
    pub auctions: usize,
    /// Peers that disagreed with the adopted state.
    pub divergent: Vec<String>,
}

/// Adopt the cluster's agreed state.
pub async fn sync_from_peers(
    book: &AuctionBook,
    peers: &[Arc<dyn ReplicaHandle>],
    timeout: Duration,
) -> JoinReport {
    let mut report = JoinReport {
        peers: peers.len(),
        ..Default::default()
    };
    if peers.is_empty() {
        tracing::info!("no peers, starting with empty state");
        return report;
    }

    let responses = broadcast(peers, &ReplicaRequest::GetState, timeout).await;
    let states = extract_all(responses, ReplicaResponse::into_state);
    report.answered = states.iter().filter(|(_, state)| state.is_some()).count();

    let Some(verdict) = vote(states) else {
        tracing::warn!(peers = peers.len(), "no peer answered, starting with empty state");
        return report;
    };

    report.auctions = verdict.value.len();
    report.source = Some(verdict.winner.clone());
    report.divergent = verdict.outliers;
    book.set_state(verdict.value);

    tracing::info!(
        source = %verdict.winner,
        auctions = report.auctions,
        "adopted state from peers"
    );
    AUDIT_LOGGER.log_event(
        AuditEventType::StateTransferred,
        verdict.winner,
        None,
        "joining replica adopted peer state",
        Some(serde_json::json!({ "auctions": report.auctions })),
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::transport::LocalReplica;
    use crate::common::{NewAuction, UserDetails};

    fn listing(name: &str) -> NewAuction {
        NewAuction {
            name: name.to_string(),
            start_price: 1.0,
            reserve: 5.0,
            description: String::new(),
            seller: UserDetails::new("sally", "sally@example.com"),
        }
    }

    #[tokio::test]
    async fn test_join_without_peers_starts_empty() {
        let book = AuctionBook::new();
        let report = sync_from_peers(&book, &[], Duration::from_millis(50)).await;
        assert!(book.is_empty());
        assert!(report.source.is_none());
    }

    #[tokio::test]
    async fn test_join_adopts_majority_state() {
        let agreed = AuctionBook::new();
        agreed.create("a1", listing("lamp")).unwrap();

        let peers: Vec<Arc<dyn ReplicaHandle>> = vec![
            Arc::new(LocalReplica::new(
                "r1",
                Arc::new(AuctionBook::with_state(agreed.get_state())),
            )),
            Arc::new(LocalReplica::new("r2", Arc::new(AuctionBook::new()))),
            Arc::new(LocalReplica::new(
                "r3",
                Arc::new(AuctionBook::with_state(agreed.get_state())),
            )),
        ];

        let book = AuctionBook::new();
        let report = sync_from_peers(&book, &peers, Duration::from_millis(50)).await;

        assert_eq!(book.get_state(), agreed.get_state());
        assert_eq!(report.source.as_deref(), Some("r1"));
        assert_eq!(report.divergent, vec!["r2"]);
        assert_eq!(report.answered, 3);
    }
}
