//! Replica server

use crate::cluster::membership::{JoinRequest, JoinResponse, NodeRequest};
use crate::cluster::transport::{HttpReplica, ReplicaHandle};
use crate::common::utils::retry_with_backoff;
use crate::common::{Error, ReplicaConfig, Result};
use crate::replica::http::{create_router, ReplicaState};
use crate::replica::join::sync_from_peers;
use crate::replica::state::AuctionBook;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

const JOIN_ATTEMPTS: usize = 5;
const JOIN_BACKOFF: Duration = Duration::from_millis(200);

pub struct ReplicaServer {
    config: ReplicaConfig,
    replica_id: String,
    book: Arc<AuctionBook>,
    client: reqwest::Client,
}

impl ReplicaServer {
    pub fn new(config: ReplicaConfig, replica_id: String) -> Self {
        Self {
            config,
            replica_id,
            book: Arc::new(AuctionBook::new()),
            client: reqwest::Client::new(),
        }
    }

    pub fn book(&self) -> Arc<AuctionBook> {
        self.book.clone()
    }

    /// Bind the configured address and serve until ctrl-c.
    pub async fn serve(self) -> Result<()> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        self.serve_on(listener, shutdown_signal()).await
    }

    /// Join the cluster, then serve on `listener` until `shutdown` resolves.
    pub async fn serve_on<S>(self, listener: TcpListener, shutdown: S) -> Result<()>
    where
        S: Future<Output = ()> + Send + 'static,
    {
        let local_addr = listener.local_addr()?;
        let advertise_url = self
            .config
            .advertise_url
            .clone()
            .unwrap_or_else(|| format!("http://{}", local_addr));

        tracing::info!("Starting replica: {}", self.replica_id);
        tracing::info!("  HTTP API: {}", local_addr);
        tracing::info!("  Advertised as: {}", advertise_url);
        tracing::info!("  Coordinator: {}", self.config.coordinator_url);

        let joined = self.register(&advertise_url).await?;
        let peers: Vec<Arc<dyn ReplicaHandle>> = joined
            .peers
            .into_iter()
            .filter(|peer| peer.id != self.replica_id)
            .map(|peer| {
                Arc::new(HttpReplica::new(peer.id, peer.url, self.client.clone()))
                    as Arc<dyn ReplicaHandle>
            })
            .collect();

        let report = sync_from_peers(&self.book, &peers, self.config.join_timeout()).await;
        tracing::info!(
            peers = report.peers,
            auctions = report.auctions,
            "state transfer finished"
        );

        let heartbeat = tokio::spawn(heartbeat_loop(
            self.client.clone(),
            self.config.coordinator_url.clone(),
            self.replica_id.clone(),
            advertise_url,
            self.config.heartbeat_interval(),
        ));

        let router = create_router(ReplicaState {
            book: self.book.clone(),
            replica_id: self.replica_id.clone(),
        });

        tracing::info!("✓ Replica ready");
        let served = axum::serve(listener, router)
            .with_graceful_shutdown(shutdown)
            .await;

        heartbeat.abort();
        if let Err(e) = self.leave().await {
            tracing::warn!("could not deregister from coordinator: {}", e);
        }
        served?;
        Ok(())
    }

    async fn register(&self, advertise_url: &str) -> Result<JoinResponse> {
        let client = &self.client;
        let url = format!("{}/cluster/join", self.config.coordinator_url);
        let url = url.as_str();
        let body = JoinRequest {
            id: self.replica_id.clone(),
            url: advertise_url.to_string(),
        };
        let body = &body;

        retry_with_backoff(
            || async move {
                let response = client.post(url).json(body).send().await?;
                if !response.status().is_success() {
                    return Err(Error::Http(format!(
                        "coordinator rejected join: {}",
                        response.status()
                    )));
                }
                Ok(response.json::<JoinResponse>().await?)
            },
            JOIN_ATTEMPTS,
            JOIN_BACKOFF,
        )
        .await
    }

    async fn leave(&self) -> Result<()> {
        self.client
            .post(format!("{}/cluster/leave", self.config.coordinator_url))
            .json(&NodeRequest {
                id: self.replica_id.clone(),
            })
            .send()
            .await?;
        Ok(())
    }
}

async fn heartbeat_loop(
    client: reqwest::Client,
    coordinator_url: String,
    replica_id: String,
    advertise_url: String,
    interval: Duration,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let heartbeat_url = format!("{}/cluster/heartbeat", coordinator_url);
    let join_url = format!("{}/cluster/join", coordinator_url);

    loop {
        ticker.tick().await;
        let sent = client
            .post(&heartbeat_url)
            .json(&NodeRequest {
                id: replica_id.clone(),
            })
            .send()
            .await;

        match sent {
            Ok(response) if response.status() == reqwest::StatusCode::NOT_FOUND => {
                tracing::warn!("coordinator forgot this replica, registering again");
                let rejoin = client
                    .post(&join_url)
                    .json(&JoinRequest {
                        id: replica_id.clone(),
                        url: advertise_url.clone(),
                    })
                    .send()
                    .await;
                if let Err(e) = rejoin {
                    tracing::warn!("re-registration failed: {}", e);
                }
            }
            Ok(_) => {}
            Err(e) => tracing::debug!("heartbeat failed: {}", e),
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for ctrl-c: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down replica");
}
