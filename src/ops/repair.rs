//! Bring disagreeing replicas back in line with a round's winner
//!
//! Repair is whole-state: the winner's full map is read once and pushed to
//! every outlier, replacing whatever they held. A repair failure is logged
//! and reported, never raised to the client whose request triggered it.

use crate::cluster::broadcast::call_one;
use crate::cluster::rpc::ReplicaRequest;
use crate::cluster::transport::ReplicaHandle;
use crate::common::{AuctionMap, AuditEventType, Error, Result, AUDIT_LOGGER};
use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepairReport {
    /// Replica whose state was copied.
    pub source: Option<String>,
    pub targets: Vec<String>,
    pub repaired: Vec<String>,
    pub failed: Vec<String>,
}

impl RepairReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Copy `winner`'s state onto every replica in `outliers`.
///
/// Outliers that are no longer members are counted as failed.
pub async fn repair_outliers(
    members: &[Arc<dyn ReplicaHandle>],
    winner: &str,
    outliers: &[String],
    timeout: Duration,
) -> RepairReport {
    let mut report = RepairReport {
        source: Some(winner.to_string()),
        targets: outliers.to_vec(),
        ..Default::default()
    };
    if outliers.is_empty() {
        return report;
    }

    let Some(source) = members.iter().find(|m| m.id() == winner) else {
        tracing::warn!(winner, "repair source left the cluster");
        report.failed = outliers.to_vec();
        return report;
    };

    let state = match fetch_state(source.as_ref(), timeout).await {
        Ok(state) => state,
        Err(e) => {
            tracing::warn!(winner, error = %e, "could not read repair source state");
            report.failed = outliers.to_vec();
            return report;
        }
    };

    let pushes = outliers.iter().map(|target| {
        let request = ReplicaRequest::SetState {
            state: state.clone(),
        };
        async move {
            let member = members.iter().find(|m| m.id() == target.as_str());
            let result = match member {
                Some(member) => call_one(member.as_ref(), request, timeout)
                    .await
                    .and_then(|response| response.into_ack()),
                None => Err(Error::NotFound(format!("replica {}", target))),
            };
            (target.clone(), result)
        }
    });

    for (target, result) in join_all(pushes).await {
        match result {
            Ok(()) => {
                tracing::info!(replica = %target, source = winner, "replica repaired");
                AUDIT_LOGGER.log_event(
                    AuditEventType::StateRepaired,
                    "coordinator",
                    Some(target.clone()),
                    format!("state copied from {}", winner),
                    Some(serde_json::json!({ "auctions": state.len() })),
                );
                report.repaired.push(target);
            }
            Err(e) => {
                tracing::warn!(replica = %target, error = %e, "replica repair failed");
                report.failed.push(target);
            }
        }
    }

    report
}

async fn fetch_state(
    source: &dyn ReplicaHandle,
    timeout: Duration,
) -> Result<AuctionMap> {
    call_one(source, ReplicaRequest::GetState, timeout)
        .await?
        .into_state()
}
