//! In-memory auction state of one replica
//!
//! All operations, reads included, go through one mutex so nothing ever
//! observes a half-applied change. The map never leaves this type except as
//! a cloned snapshot.

use crate::cluster::rpc::{ReplicaRequest, ReplicaResponse};
use crate::common::{Auction, AuctionMap, BidOutcome, Error, NewAuction, Result, UserDetails};
use std::sync::{Mutex, MutexGuard};

#[derive(Default)]
pub struct AuctionBook {
    auctions: Mutex<AuctionMap>,
}

impl AuctionBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a book with existing state.
    pub fn with_state(state: AuctionMap) -> Self {
        Self {
            auctions: Mutex::new(state),
        }
    }

    fn lock(&self) -> MutexGuard<'_, AuctionMap> {
        // Every mutation is a single map operation, so the map is consistent
        // even if a holder panicked.
        self.auctions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Insert a new auction under a coordinator-minted id.
    pub fn create(&self, id: &str, listing: NewAuction) -> Result<String> {
        let mut auctions = self.lock();
        if auctions.contains_key(id) {
            return Err(Error::DuplicateAuction(id.to_string()));
        }
        auctions.insert(id.to_string(), Auction::new(id, listing));
        tracing::info!(
            auction_id = id,
            active = auctions.len(),
            "replica created auction"
        );
        Ok(id.to_string())
    }

    pub fn bid(&self, id: &str, bidder: UserDetails, amount: f64) -> BidOutcome {
        let mut auctions = self.lock();
        let outcome = match auctions.get_mut(id) {
            Some(auction) => auction.place_bid(bidder, amount),
            None => BidOutcome::NotFound,
        };
        tracing::debug!(auction_id = id, amount, ?outcome, "replica handled bid");
        outcome
    }

    /// Remove and return the auction if `requester` is its seller.
    ///
    /// Unknown id and wrong requester both give `None`.
    pub fn close(&self, id: &str, requester: &str) -> Option<Auction> {
        let mut auctions = self.lock();
        let permitted = auctions
            .get(id)
            .is_some_and(|auction| auction.is_seller(requester));
        if !permitted {
            return None;
        }
        let closed = auctions.remove(id);
        tracing::info!(auction_id = id, "replica closed auction");
        closed
    }

    /// Every active auction, ordered by id.
    pub fn list_all(&self) -> Vec<Auction> {
        self.lock().values().cloned().collect()
    }

    /// Active auctions whose name contains `keyword`, ordered by id.
    pub fn search(&self, keyword: &str) -> Vec<Auction> {
        self.lock()
            .values()
            .filter(|auction| auction.name.contains(keyword))
            .cloned()
            .collect()
    }

    pub fn get(&self, id: &str) -> Option<Auction> {
        self.lock().get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn get_state(&self) -> AuctionMap {
        self.lock().clone()
    }

    /// Replace the whole map. Not a merge.
    pub fn set_state(&self, state: AuctionMap) {
        let mut auctions = self.lock();
        *auctions = state;
        tracing::info!(active = auctions.len(), "replica state replaced");
    }

    /// Serve one inter-replica request.
    pub fn handle(&self, request: ReplicaRequest) -> Result<ReplicaResponse> {
        let response = match request {
            ReplicaRequest::Create { id, listing } => ReplicaResponse::Created(self.create(&id, listing)?),
            ReplicaRequest::Bid { id, bidder, amount } => {
                ReplicaResponse::Bid(self.bid(&id, bidder, amount))
            }
            ReplicaRequest::Close { id, requester } => {
                ReplicaResponse::Closed(self.close(&id, &requester))
            }
            ReplicaRequest::ListAll => ReplicaResponse::Auctions(self.list_all()),
            ReplicaRequest::Search { keyword } => ReplicaResponse::Auctions(self.search(&keyword)),
            ReplicaRequest::GetState => ReplicaResponse::State(self.get_state()),
            ReplicaRequest::SetState { state } => {
                self.set_state(state);
                ReplicaResponse::Ack
            }
        };
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listing(name: &str) -> NewAuction {
        NewAuction {
            name: name.to_string(),
            start_price: 10.0,
            reserve: 20.0,
            description: "test item".to_string(),
            seller: UserDetails::new("sally", "sally@example.com"),
        }
    }

    fn bob() -> UserDetails {
        UserDetails::new("bob", "bob@example.com")
    }

    #[test]
    fn test_create_and_duplicate() {
        let book = AuctionBook::new();
        assert_eq!(book.create("a1", listing("lamp")).unwrap(), "a1");
        assert!(matches!(
            book.create("a1", listing("desk")),
            Err(Error::DuplicateAuction(_))
        ));
        assert_eq!(book.get("a1").unwrap().name, "lamp");
    }

    #[test]
    fn test_bid_outcomes() {
        let book = AuctionBook::new();
        book.create("a1", listing("lamp")).unwrap();

        assert_eq!(book.bid("missing", bob(), 50.0), BidOutcome::NotFound);
        assert_eq!(book.bid("a1", bob(), 5.0), BidOutcome::RejectedLow);
        assert_eq!(book.get("a1").unwrap().top_bid, 10.0);
        assert_eq!(book.bid("a1", bob(), 15.0), BidOutcome::Accepted);
        assert_eq!(book.get("a1").unwrap().top_bid, 15.0);
    }

    #[test]
    fn test_top_bid_never_decreases() {
        let book = AuctionBook::new();
        book.create("a1", listing("lamp")).unwrap();

        let amounts = [3.0, 12.0, 11.0, 12.0, 40.0, 0.0, 39.5, 41.0, 10.0];
        let mut previous = book.get("a1").unwrap().top_bid;
        for amount in amounts {
            book.bid("a1", bob(), amount);
            let auction = book.get("a1").unwrap();
            assert!(auction.top_bid >= previous);
            assert!(auction.top_bid >= auction.start_price);
            assert_eq!(auction.top_bidder.is_some(), auction.top_bid > auction.start_price);
            previous = auction.top_bid;
        }
        assert_eq!(previous, 41.0);
    }

    #[test]
    fn test_close_only_by_seller() {
        let book = AuctionBook::new();
        book.create("a1", listing("lamp")).unwrap();

        assert!(book.close("a1", "bob").is_none());
        assert!(book.get("a1").is_some());
        assert!(book.close("missing", "sally").is_none());

        let closed = book.close("a1", "sally").unwrap();
        assert_eq!(closed.id, "a1");
        assert!(book.get("a1").is_none());
    }

    #[test]
    fn test_list_and_search() {
        let book = AuctionBook::new();
        book.create("b", listing("red lamp")).unwrap();
        book.create("a", listing("desk")).unwrap();
        book.create("c", listing("blue lamp")).unwrap();

        let ids: Vec<String> = book.list_all().into_iter().map(|a| a.id).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);

        let ids: Vec<String> = book.search("lamp").into_iter().map(|a| a.id).collect();
        assert_eq!(ids, vec!["b", "c"]);
        assert!(book.search("Lamp").is_empty());
    }

    #[test]
    fn test_set_state_replaces() {
        let book = AuctionBook::new();
        book.create("a", listing("desk")).unwrap();

        let other = AuctionBook::new();
        other.create("z", listing("chair")).unwrap();
        book.set_state(other.get_state());

        assert!(book.get("a").is_none());
        assert!(book.get("z").is_some());
        assert_eq!(book.len(), 1);
    }

    #[test]
    fn test_handle_dispatch() {
        let book = AuctionBook::new();
        let created = book
            .handle(ReplicaRequest::Create {
                id: "a1".to_string(),
                listing: listing("lamp"),
            })
            .unwrap();
        assert_eq!(created, ReplicaResponse::Created("a1".to_string()));

        let bid = book
            .handle(ReplicaRequest::Bid {
                id: "a1".to_string(),
                bidder: bob(),
                amount: 11.0,
            })
            .unwrap();
        assert_eq!(bid, ReplicaResponse::Bid(BidOutcome::Accepted));

        let state = book.handle(ReplicaRequest::GetState).unwrap().into_state().unwrap();
        assert_eq!(state.len(), 1);

        let ack = book
            .handle(ReplicaRequest::SetState {
                state: AuctionMap::new(),
            })
            .unwrap();
        assert_eq!(ack, ReplicaResponse::Ack);
        assert!(book.is_empty());
    }
}
