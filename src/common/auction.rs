//! Auction data model shared by the coordinator, replicas and clients.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Full replica state: auction id → auction.
///
/// Ordered so that listings and state fingerprints come out identical on
/// every replica holding the same data.
pub type AuctionMap = BTreeMap<String, Auction>;

/// A buyer or seller: display name plus contact address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserDetails {
    pub name: String,
    pub email: String,
}

impl UserDetails {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
        }
    }
}

/// Arguments of a create request, before the coordinator mints an id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewAuction {
    pub name: String,
    pub start_price: f64,
    pub reserve: f64,
    #[serde(default)]
    pub description: String,
    pub seller: UserDetails,
}

impl NewAuction {
    /// Client-facing checks. `Auction` itself does not enforce these.
    pub fn validate(&self) -> crate::Result<()> {
        if self.name.trim().is_empty() {
            return Err(crate::Error::InvalidRequest("auction name is empty".into()));
        }
        if !self.start_price.is_finite() || self.start_price < 0.0 {
            return Err(crate::Error::InvalidRequest(
                "start price must be a non-negative number".into(),
            ));
        }
        if !self.reserve.is_finite() || self.reserve <= self.start_price {
            return Err(crate::Error::InvalidRequest(format!(
                "reserve price must be greater than start price {:.2}",
                self.start_price
            )));
        }
        if self.seller.name.trim().is_empty() {
            return Err(crate::Error::InvalidRequest("seller name is empty".into()));
        }
        Ok(())
    }
}

/// Outcome of a bid as acknowledged by a replica.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BidOutcome {
    NotFound,
    Accepted,
    RejectedLow,
}

impl BidOutcome {
    /// Stable wire code, also what bid acknowledgements are fingerprinted over.
    pub fn code(&self) -> &'static str {
        match self {
            BidOutcome::NotFound => "1",
            BidOutcome::Accepted => "2",
            BidOutcome::RejectedLow => "3",
        }
    }
}

impl std::fmt::Display for BidOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BidOutcome::NotFound => write!(f, "auction not found"),
            BidOutcome::Accepted => write!(f, "bid accepted"),
            BidOutcome::RejectedLow => write!(f, "bid rejected: not above current top bid"),
        }
    }
}

/// An active auction held by a replica.
///
/// `top_bid` starts at `start_price` and only ever increases; `top_bidder`
/// is set iff at least one bid was accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Auction {
    pub id: String,
    pub name: String,
    pub description: String,
    pub start_price: f64,
    pub reserve: f64,
    pub top_bid: f64,
    pub top_bidder: Option<UserDetails>,
    pub seller: UserDetails,
}

impl Auction {
    pub fn new(id: impl Into<String>, listing: NewAuction) -> Self {
        Self {
            id: id.into(),
            name: listing.name,
            description: listing.description,
            start_price: listing.start_price,
            reserve: listing.reserve,
            top_bid: listing.start_price,
            top_bidder: None,
            seller: listing.seller,
        }
    }

    /// Apply a bid. Only a strictly higher amount replaces the top bid.
    pub fn place_bid(&mut self, bidder: UserDetails, amount: f64) -> BidOutcome {
        if amount > self.top_bid {
            self.top_bid = amount;
            self.top_bidder = Some(bidder);
            BidOutcome::Accepted
        } else {
            BidOutcome::RejectedLow
        }
    }

    pub fn is_seller(&self, name: &str) -> bool {
        self.seller.name == name
    }

    /// Whether the auction would sell at its current top bid.
    pub fn reserve_met(&self) -> bool {
        self.top_bidder.is_some() && self.top_bid >= self.reserve
    }

    /// Canonical rendering of every field, used for fingerprinting.
    ///
    /// Fields are separated by a unit separator so that adjacent text fields
    /// cannot run into each other.
    pub fn auction_data(&self) -> String {
        let (bidder_name, bidder_email) = match &self.top_bidder {
            Some(bidder) => (bidder.name.as_str(), bidder.email.as_str()),
            None => ("", ""),
        };
        [
            self.start_price.to_string(),
            self.reserve.to_string(),
            self.top_bid.to_string(),
            self.name.clone(),
            self.description.clone(),
            self.id.clone(),
            self.seller.name.clone(),
            self.seller.email.clone(),
            bidder_name.to_string(),
            bidder_email.to_string(),
        ]
        .join("\u{1f}")
    }
}
