//! Plurality voting over replica responses
//!
//! Pure decision logic: given every participant's response (or its absence),
//! pick a representative of the most common response and list the
//! participants that disagree with it.
//!
//! Tie-breaking: participants are ordered by id before counting, and among
//! equally common fingerprints the one first seen in that order wins. This is
//! deterministic but arbitrary; callers must not read meaning into which of
//! two tied groups is chosen.
//!
//! A non-response never beats a real answer. It still counts as a
//! disagreement, so non-responders always end up in `outliers`.

use crate::common::fingerprint::{fingerprint_of, Fingerprint, Fingerprintable};
use std::collections::BTreeMap;

/// Result of one vote.
#[derive(Debug, Clone, PartialEq)]
pub struct Verdict<T> {
    /// Participant whose response represents the winning group.
    pub winner: String,
    /// The winner's original response.
    pub value: T,
    pub fingerprint: Fingerprint,
    /// Participants whose fingerprint differs from the winner's, in id order.
    pub outliers: Vec<String>,
    /// Number of participants in the winning group.
    pub support: usize,
    /// Total participants, responders or not.
    pub participants: usize,
}

impl<T> Verdict<T> {
    pub fn is_unanimous(&self) -> bool {
        self.outliers.is_empty()
    }

    /// Whether the winning group is a strict majority of all participants.
    pub fn is_majority(&self) -> bool {
        self.support * 2 > self.participants
    }
}

struct Group {
    fingerprint: Fingerprint,
    count: usize,
    first: usize,
}

/// Run a plurality vote.
///
/// Returns `None` when there are no participants or none of them answered.
pub fn vote<T: Fingerprintable>(responses: Vec<(String, Option<T>)>) -> Option<Verdict<T>> {
    let mut responses = responses;
    responses.sort_by(|a, b| a.0.cmp(&b.0));

    let fingerprints: Vec<Fingerprint> = responses
        .iter()
        .map(|(_, response)| fingerprint_of(response.as_ref()))
        .collect();

    let mut groups: Vec<Group> = Vec::new();
    let mut index: BTreeMap<Fingerprint, usize> = BTreeMap::new();
    for (position, fingerprint) in fingerprints.iter().enumerate() {
        match index.get(fingerprint) {
            Some(&slot) => groups[slot].count += 1,
            None => {
                index.insert(*fingerprint, groups.len());
                groups.push(Group {
                    fingerprint: *fingerprint,
                    count: 1,
                    first: position,
                });
            }
        }
    }

    let best = groups
        .iter()
        .filter(|group| !group.fingerprint.is_null())
        .max_by(|a, b| a.count.cmp(&b.count).then(b.first.cmp(&a.first)))?;

    let winning = best.fingerprint;
    let support = best.count;
    let first = best.first;
    let participants = responses.len();

    let outliers = responses
        .iter()
        .zip(&fingerprints)
        .filter(|(_, fingerprint)| **fingerprint != winning)
        .map(|((id, _), _)| id.clone())
        .collect();

    let (winner, value) = responses.swap_remove(first);
    let value = value?;

    Some(Verdict {
        winner,
        value,
        fingerprint: winning,
        outliers,
        support,
        participants,
    })
}
