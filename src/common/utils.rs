//! Utility functions for quorum-auction

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Length of a minted auction id.
pub const AUCTION_ID_LEN: usize = 8;

/// Mint a short, process-wide unique auction id.
pub fn mint_auction_id() -> String {
    let mut id = uuid::Uuid::new_v4().simple().to_string();
    id.truncate(AUCTION_ID_LEN);
    id
}

/// Get current Unix timestamp (seconds)
pub fn timestamp_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

/// Get current Unix timestamp (milliseconds)
pub fn timestamp_now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

/// Replica liveness as seen by the coordinator's registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeState {
    Alive,
    Suspect,
    Dead,
}

impl NodeState {
    /// Derive state from heartbeat age. Missing one TTL makes a node suspect,
    /// missing three makes it dead.
    pub fn from_heartbeat_age(age_ms: u64, ttl_ms: u64) -> Self {
        if age_ms <= ttl_ms {
            NodeState::Alive
        } else if age_ms <= ttl_ms.saturating_mul(3) {
            NodeState::Suspect
        } else {
            NodeState::Dead
        }
    }

    /// Should this node take part in rounds?
    pub fn is_healthy(&self) -> bool {
        matches!(self, NodeState::Alive)
    }
}

impl std::fmt::Display for NodeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeState::Alive => write!(f, "alive"),
            NodeState::Suspect => write!(f, "suspect"),
            NodeState::Dead => write!(f, "dead"),
        }
    }
}

/// Retry with exponential backoff
pub async fn retry_with_backoff<F, Fut, T>(
    mut f: F,
    max_retries: usize,
    initial_delay: std::time::Duration,
) -> crate::Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = crate::Result<T>>,
{
    let mut delay = initial_delay;

    for attempt in 0..max_retries {
        match f().await {
            Ok(result) => return Ok(result),
            Err(e) if e.is_retryable() && attempt < max_retries - 1 => {
                tracing::warn!(
                    "Retry attempt {} failed: {}, retrying in {:?}",
                    attempt + 1,
                    e,
                    delay
                );
                tokio::time::sleep(delay).await;
                delay *= 2;
            }
            Err(e) => return Err(e),
        }
    }

    Err(crate::Error::Internal("Max retries exceeded".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn test_mint_auction_id() {
        let a = mint_auction_id();
        let b = mint_auction_id();
        assert_eq!(a.len(), AUCTION_ID_LEN);
        assert_ne!(a, b);
    }

    #[test]
    fn test_node_state() {
        assert_eq!(NodeState::from_heartbeat_age(100, 1000), NodeState::Alive);
        assert_eq!(NodeState::from_heartbeat_age(2000, 1000), NodeState::Suspect);
        assert_eq!(NodeState::from_heartbeat_age(5000, 1000), NodeState::Dead);

        assert!(NodeState::Alive.is_healthy());
        assert!(!NodeState::Suspect.is_healthy());
        assert!(!NodeState::Dead.is_healthy());
    }

    #[tokio::test]
    async fn test_retry_with_backoff() {
        let attempts = AtomicUsize::new(0);
        let result = retry_with_backoff(
            || {
                let n = attempts.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(crate::Error::ConnectionFailed("refused".into()))
                    } else {
                        Ok(n)
                    }
                }
            },
            5,
            Duration::from_millis(1),
        )
        .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_stops_on_fatal_error() {
        let attempts = AtomicUsize::new(0);
        let result: crate::Result<()> = retry_with_backoff(
            || {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Err(crate::Error::AuthFailed) }
            },
            5,
            Duration::from_millis(1),
        )
        .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
