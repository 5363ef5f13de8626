//! Handles for talking to one replica
//!
//! [`ReplicaHandle`] is the seam between the voting logic and the wire:
//! rounds only ever see handles, never addresses.

use crate::cluster::rpc::{ReplicaRequest, ReplicaResponse};
use crate::common::{Error, Result};
use crate::replica::AuctionBook;
use futures_util::future::BoxFuture;
use serde::Deserialize;
use std::sync::Arc;

/// One cluster member reachable for inter-replica calls.
pub trait ReplicaHandle: Send + Sync {
    /// Stable participant id, also the vote's ordering key.
    fn id(&self) -> &str;

    fn call(&self, request: ReplicaRequest) -> BoxFuture<'_, Result<ReplicaResponse>>;
}

/// In-process replica.
pub struct LocalReplica {
    id: String,
    book: Arc<AuctionBook>,
}

impl LocalReplica {
    pub fn new(id: impl Into<String>, book: Arc<AuctionBook>) -> Self {
        Self {
            id: id.into(),
            book,
        }
    }

    pub fn book(&self) -> &Arc<AuctionBook> {
        &self.book
    }
}

impl ReplicaHandle for LocalReplica {
    fn id(&self) -> &str {
        &self.id
    }

    fn call(&self, request: ReplicaRequest) -> BoxFuture<'_, Result<ReplicaResponse>> {
        Box::pin(async move { self.book.handle(request) })
    }
}

/// Replica served over HTTP (`POST {base_url}/rpc`).
pub struct HttpReplica {
    id: String,
    base_url: String,
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

impl HttpReplica {
    pub fn new(id: impl Into<String>, base_url: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            id: id.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn post(&self, request: ReplicaRequest) -> Result<ReplicaResponse> {
        let response = self
            .client
            .post(format!("{}/rpc", self.base_url))
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response.json::<ReplicaResponse>().await?);
        }

        let message = response
            .json::<ErrorBody>()
            .await
            .map(|body| body.error)
            .unwrap_or_else(|_| status.to_string());
        Err(match status {
            reqwest::StatusCode::CONFLICT => Error::DuplicateAuction(message),
            _ => Error::Http(format!("{} answered {}: {}", self.id, status, message)),
        })
    }
}

impl ReplicaHandle for HttpReplica {
    fn id(&self) -> &str {
        &self.id
    }

    fn call(&self, request: ReplicaRequest) -> BoxFuture<'_, Result<ReplicaResponse>> {
        Box::pin(self.post(request))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{NewAuction, UserDetails};

    #[tokio::test]
    async fn test_local_replica_call() {
        let book = Arc::new(AuctionBook::new());
        let replica = LocalReplica::new("r1", book.clone());

        let response = replica
            .call(ReplicaRequest::Create {
                id: "a1".to_string(),
                listing: NewAuction {
                    name: "lamp".to_string(),
                    start_price: 1.0,
                    reserve: 2.0,
                    description: String::new(),
                    seller: UserDetails::new("sally", "sally@example.com"),
                },
            })
            .await
            .unwrap();

        assert_eq!(response, ReplicaResponse::Created("a1".to_string()));
        assert_eq!(replica.id(), "r1");
        assert_eq!(book.len(), 1);
    }

    #[test]
    fn test_http_replica_trims_base_url() {
        let replica = HttpReplica::new("r1", "http://127.0.0.1:6000/", reqwest::Client::new());
        assert_eq!(replica.base_url(), "http://127.0.0.1:6000");
    }
}
