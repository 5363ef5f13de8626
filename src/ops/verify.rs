//! Verify that every replica holds the same auction state

use crate::cluster::broadcast::{broadcast, extract_all};
use crate::cluster::membership::Membership;
use crate::cluster::rpc::{ReplicaRequest, ReplicaResponse};
use crate::common::{vote, Error, Result};
use crate::ops::repair::{repair_outliers, RepairReport};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyReport {
    pub replicas: usize,
    pub answered: usize,
    /// Replica whose state won the vote.
    pub reference: String,
    /// Short fingerprint of the agreed state.
    pub fingerprint: String,
    pub auctions: usize,
    pub divergent: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repair: Option<RepairReport>,
}

impl VerifyReport {
    pub fn is_consistent(&self) -> bool {
        self.divergent.is_empty()
    }
}

/// Compare full state across the cluster, repairing divergent replicas when
/// `repair` is set.
pub async fn verify_cluster(
    membership: &dyn Membership,
    timeout: Duration,
    repair: bool,
) -> Result<VerifyReport> {
    tracing::info!("Starting cluster verification");

    let members = membership.members();
    if members.is_empty() {
        return Err(Error::Unavailable("no replicas registered".into()));
    }

    let responses = broadcast(&members, &ReplicaRequest::GetState, timeout).await;
    let states = extract_all(responses, ReplicaResponse::into_state);
    let answered = states.iter().filter(|(_, state)| state.is_some()).count();

    let verdict = vote(states).ok_or_else(|| Error::Unavailable("no replica answered".into()))?;

    let mut report = VerifyReport {
        replicas: members.len(),
        answered,
        reference: verdict.winner.clone(),
        fingerprint: verdict.fingerprint.to_string(),
        auctions: verdict.value.len(),
        divergent: verdict.outliers.clone(),
        repair: None,
    };

    if repair && !verdict.outliers.is_empty() {
        report.repair =
            Some(repair_outliers(&members, &verdict.winner, &verdict.outliers, timeout).await);
    }

    tracing::info!(
        replicas = report.replicas,
        divergent = report.divergent.len(),
        "Cluster verification complete"
    );
    Ok(report)
}
