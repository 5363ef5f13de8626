//! Coordinated operations
//!
//! Every client operation is one round:
//!
//! 1. resolve membership (fresh, never cached)
//! 2. fail fast with `Unavailable` when there are no replicas
//! 3. broadcast the request with identical arguments, bounded by the round timeout
//! 4. vote over the answers
//! 5. push the winner's full state onto every outlier
//! 6. return the winning answer
//!
//! Rounds are independent. Two concurrent rounds touching the same auction
//! may interleave differently on different replicas; the next round's repair
//! converges them.

use crate::cluster::broadcast::{broadcast, extract_all};
use crate::cluster::membership::Membership;
use crate::cluster::rpc::{ReplicaRequest, ReplicaResponse};
use crate::common::fingerprint::Fingerprintable;
use crate::common::{
    mint_auction_id, vote, Auction, AuditEventType, BidOutcome, Error, NewAuction, Result,
    UserDetails, AUDIT_LOGGER,
};
use crate::ops::repair::repair_outliers;
use std::sync::Arc;
use std::time::Duration;

pub struct Coordinator {
    membership: Arc<dyn Membership>,
    round_timeout: Duration,
}

impl Coordinator {
    pub fn new(membership: Arc<dyn Membership>, round_timeout: Duration) -> Self {
        Self {
            membership,
            round_timeout,
        }
    }

    pub fn membership(&self) -> &Arc<dyn Membership> {
        &self.membership
    }

    pub fn round_timeout(&self) -> Duration {
        self.round_timeout
    }

    /// Mint an id and create the auction on every replica.
    pub async fn create_auction(&self, listing: NewAuction) -> Result<String> {
        listing.validate()?;
        let id = mint_auction_id();
        let seller = listing.seller.name.clone();

        let created = self
            .round(
                ReplicaRequest::Create {
                    id: id.clone(),
                    listing,
                },
                ReplicaResponse::into_created,
            )
            .await?;

        tracing::info!(auction_id = %created, seller = %seller, "auction created");
        AUDIT_LOGGER.log_event(
            AuditEventType::AuctionCreated,
            seller,
            Some(created.clone()),
            "auction created",
            None,
        );
        Ok(created)
    }

    pub async fn bid(&self, id: &str, bidder: UserDetails, amount: f64) -> Result<BidOutcome> {
        if !amount.is_finite() {
            return Err(Error::InvalidRequest(format!("bid amount {} is not a number", amount)));
        }
        self.round(
            ReplicaRequest::Bid {
                id: id.to_string(),
                bidder,
                amount,
            },
            ReplicaResponse::into_bid,
        )
        .await
    }

    /// Close an auction on behalf of `requester`.
    ///
    /// `Ok(None)` covers both an unknown id and a requester who is not the seller.
    pub async fn close_auction(&self, id: &str, requester: &str) -> Result<Option<Auction>> {
        let closed = self
            .round(
                ReplicaRequest::Close {
                    id: id.to_string(),
                    requester: requester.to_string(),
                },
                ReplicaResponse::into_closed,
            )
            .await?;

        if let Some(auction) = &closed {
            tracing::info!(
                auction_id = %auction.id,
                top_bid = auction.top_bid,
                reserve_met = auction.reserve_met(),
                "auction closed"
            );
            AUDIT_LOGGER.log_event(
                AuditEventType::AuctionClosed,
                requester,
                Some(auction.id.clone()),
                "auction closed",
                Some(serde_json::json!({
                    "top_bid": auction.top_bid,
                    "reserve_met": auction.reserve_met(),
                })),
            );
        }
        Ok(closed)
    }

    pub async fn show_active(&self) -> Result<Vec<Auction>> {
        self.round(ReplicaRequest::ListAll, ReplicaResponse::into_auctions)
            .await
    }

    /// Active auctions whose name contains `keyword`.
    pub async fn show_auction(&self, keyword: &str) -> Result<Vec<Auction>> {
        self.round(
            ReplicaRequest::Search {
                keyword: keyword.to_string(),
            },
            ReplicaResponse::into_auctions,
        )
        .await
    }

    async fn round<T: Fingerprintable>(
        &self,
        request: ReplicaRequest,
        extract: fn(ReplicaResponse) -> Result<T>,
    ) -> Result<T> {
        let op = request.name();
        let members = self.membership.members();
        if members.is_empty() {
            tracing::warn!(op, "no replicas available");
            return Err(Error::Unavailable("no replicas available".into()));
        }

        let responses = broadcast(&members, &request, self.round_timeout).await;
        let results = extract_all(responses, extract);

        let Some(verdict) = vote(results) else {
            tracing::warn!(op, members = members.len(), "no replica answered");
            return Err(Error::Unavailable("no replica answered".into()));
        };

        if !verdict.outliers.is_empty() {
            tracing::info!(
                op,
                winner = %verdict.winner,
                fingerprint = %verdict.fingerprint,
                outliers = ?verdict.outliers,
                "repairing outliers"
            );
            let report =
                repair_outliers(&members, &verdict.winner, &verdict.outliers, self.round_timeout)
                    .await;
            if !report.is_complete() {
                tracing::warn!(op, failed = ?report.failed, "repair incomplete");
            }
        }

        tracing::debug!(
            op,
            support = verdict.support,
            participants = verdict.participants,
            "round complete"
        );
        Ok(verdict.value)
    }
}
