//! Inter-replica surface
//!
//! Every operation a replica serves, as one request/response enum pair. The
//! coordinator sends the same request to every replica in a round; joining
//! replicas use `GetState` against their peers.

use crate::common::{Auction, AuctionMap, BidOutcome, Error, NewAuction, Result, UserDetails};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ReplicaRequest {
    Create {
        id: String,
        listing: NewAuction,
    },
    Bid {
        id: String,
        bidder: UserDetails,
        amount: f64,
    },
    Close {
        id: String,
        requester: String,
    },
    ListAll,
    Search {
        keyword: String,
    },
    GetState,
    SetState {
        state: AuctionMap,
    },
}

impl ReplicaRequest {
    pub fn name(&self) -> &'static str {
        match self {
            ReplicaRequest::Create { .. } => "create",
            ReplicaRequest::Bid { .. } => "bid",
            ReplicaRequest::Close { .. } => "close",
            ReplicaRequest::ListAll => "list_all",
            ReplicaRequest::Search { .. } => "search",
            ReplicaRequest::GetState => "get_state",
            ReplicaRequest::SetState { .. } => "set_state",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ReplicaResponse {
    Created(String),
    Bid(BidOutcome),
    Closed(Option<Auction>),
    Auctions(Vec<Auction>),
    State(AuctionMap),
    Ack,
}

impl ReplicaResponse {
    fn kind(&self) -> &'static str {
        match self {
            ReplicaResponse::Created(_) => "created",
            ReplicaResponse::Bid(_) => "bid",
            ReplicaResponse::Closed(_) => "closed",
            ReplicaResponse::Auctions(_) => "auctions",
            ReplicaResponse::State(_) => "state",
            ReplicaResponse::Ack => "ack",
        }
    }

    fn unexpected(self, wanted: &str) -> Error {
        Error::UnexpectedResponse(format!("wanted {}, got {}", wanted, self.kind()))
    }

    pub fn into_created(self) -> Result<String> {
        match self {
            ReplicaResponse::Created(id) => Ok(id),
            other => Err(other.unexpected("created")),
        }
    }

    pub fn into_bid(self) -> Result<BidOutcome> {
        match self {
            ReplicaResponse::Bid(outcome) => Ok(outcome),
            other => Err(other.unexpected("bid")),
        }
    }

    pub fn into_closed(self) -> Result<Option<Auction>> {
        match self {
            ReplicaResponse::Closed(auction) => Ok(auction),
            other => Err(other.unexpected("closed")),
        }
    }

    pub fn into_auctions(self) -> Result<Vec<Auction>> {
        match self {
            ReplicaResponse::Auctions(auctions) => Ok(auctions),
            other => Err(other.unexpected("auctions")),
        }
    }

    pub fn into_state(self) -> Result<AuctionMap> {
        match self {
            ReplicaResponse::State(state) => Ok(state),
            other => Err(other.unexpected("state")),
        }
    }

    pub fn into_ack(self) -> Result<()> {
        match self {
            ReplicaResponse::Ack => Ok(()),
            other => Err(other.unexpected("ack")),
        }
    }
}
