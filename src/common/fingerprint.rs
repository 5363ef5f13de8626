//! Response fingerprints for quorum voting
//!
//! A fingerprint is an equality digest over the observable content of a
//! replica response. Two replicas that answered the same thing produce the
//! same fingerprint; nothing else is promised. BLAKE3 is used for the digest
//! because it is already how this codebase hashes content, not because the
//! vote needs collision resistance.

use crate::common::auction::{Auction, AuctionMap, BidOutcome};
use blake3::Hasher;
use serde::{Deserialize, Serialize};

/// Equality digest of one replica response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Fingerprint {
    /// Reserved value for a replica that did not answer (timeout or error).
    Null,
    Digest([u8; 32]),
}

impl Fingerprint {
    pub fn is_null(&self) -> bool {
        matches!(self, Fingerprint::Null)
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Fingerprint::Null => write!(f, "null"),
            // Short prefix is plenty for logs.
            Fingerprint::Digest(bytes) => write!(f, "{}", hex::encode(&bytes[..8])),
        }
    }
}

/// Incremental fingerprint builder.
pub struct FingerprintHasher {
    hasher: Hasher,
}

impl FingerprintHasher {
    pub fn new(domain: &str) -> Self {
        let mut hasher = Hasher::new();
        hasher.update(domain.as_bytes());
        hasher.update(&[0]);
        Self { hasher }
    }

    pub fn update(&mut self, data: &[u8]) {
        self.hasher.update(data);
    }

    pub fn update_str(&mut self, data: &str) {
        self.hasher.update(data.as_bytes());
    }

    pub fn finalize(&self) -> Fingerprint {
        Fingerprint::Digest(*self.hasher.finalize().as_bytes())
    }
}

/// A response that can take part in a vote.
pub trait Fingerprintable {
    fn fingerprint(&self) -> Fingerprint;
}

/// Fingerprint of an optional response: absent maps to [`Fingerprint::Null`].
pub fn fingerprint_of<T: Fingerprintable>(response: Option<&T>) -> Fingerprint {
    response.map_or(Fingerprint::Null, Fingerprintable::fingerprint)
}

/// Create acknowledgements: the minted auction id.
impl Fingerprintable for String {
    fn fingerprint(&self) -> Fingerprint {
        let mut hasher = FingerprintHasher::new("ack");
        hasher.update_str(self);
        hasher.finalize()
    }
}

/// Bid acknowledgements vote on the outcome code only, not on replica state.
impl Fingerprintable for BidOutcome {
    fn fingerprint(&self) -> Fingerprint {
        let mut hasher = FingerprintHasher::new("ack");
        hasher.update_str(self.code());
        hasher.finalize()
    }
}

impl Fingerprintable for Auction {
    fn fingerprint(&self) -> Fingerprint {
        let mut hasher = FingerprintHasher::new("auction");
        hasher.update_str(&self.auction_data());
        hasher.finalize()
    }
}

/// Close results. A replica that answered "absent" did answer, so this is
/// a real digest, distinct from a non-response.
impl Fingerprintable for Option<Auction> {
    fn fingerprint(&self) -> Fingerprint {
        match self {
            Some(auction) => auction.fingerprint(),
            None => FingerprintHasher::new("absent").finalize(),
        }
    }
}

/// Listings hash the concatenated data of every returned auction, in order.
impl Fingerprintable for Vec<Auction> {
    fn fingerprint(&self) -> Fingerprint {
        let mut hasher = FingerprintHasher::new("listing");
        for auction in self {
            hasher.update_str(&auction.auction_data());
            hasher.update(&[0x1e]);
        }
        hasher.finalize()
    }
}

/// Full state: every key, then every auction's data.
impl Fingerprintable for AuctionMap {
    fn fingerprint(&self) -> Fingerprint {
        let mut hasher = FingerprintHasher::new("state");
        for id in self.keys() {
            hasher.update_str(id);
            hasher.update(&[0x1e]);
        }
        for auction in self.values() {
            hasher.update_str(&auction.auction_data());
            hasher.update(&[0x1e]);
        }
        hasher.finalize()
    }
}
