//! Full cluster over loopback HTTP: coordinator, replicas and the client

use ed25519_dalek::SigningKey;
use quorum_auction::common::auth::{
    authenticate_and_login, generate_signing_key, ClientCredentials,
};
use quorum_auction::common::{
    BidOutcome, CoordinatorConfig, NewAuction, ReplicaConfig, UserDetails,
};
use quorum_auction::{AuctionBook, CoordinatorClient, CoordinatorServer, ReplicaServer};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

struct Cluster {
    coordinator_url: String,
    server_key: SigningKey,
    sally_key: SigningKey,
    shutdown: Vec<oneshot::Sender<()>>,
}

async fn start_coordinator(require_session: bool) -> Cluster {
    let server_key = generate_signing_key();
    let sally_key = generate_signing_key();

    let mut config = CoordinatorConfig {
        signing_key: Some(hex::encode(server_key.to_bytes())),
        require_session,
        round_timeout_ms: 500,
        ..Default::default()
    };
    config.users.insert(
        "sally".to_string(),
        hex::encode(sally_key.verifying_key().as_bytes()),
    );

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let coordinator_url = format!("http://{}", listener.local_addr().unwrap());
    let (tx, rx) = oneshot::channel::<()>();
    let server = CoordinatorServer::new(config, "coord-test".to_string());
    tokio::spawn(async move {
        server
            .serve_on(listener, async move {
                let _ = rx.await;
            })
            .await
            .unwrap();
    });

    Cluster {
        coordinator_url,
        server_key,
        sally_key,
        shutdown: vec![tx],
    }
}

impl Cluster {
    async fn add_replica(&mut self, id: &str) -> Arc<AuctionBook> {
        let config = ReplicaConfig {
            coordinator_url: self.coordinator_url.clone(),
            heartbeat_interval_ms: 200,
            join_timeout_ms: 500,
            ..Default::default()
        };
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let replica = ReplicaServer::new(config, id.to_string());
        let book = replica.book();
        let (tx, rx) = oneshot::channel::<()>();
        tokio::spawn(async move {
            let _ = replica
                .serve_on(listener, async move {
                    let _ = rx.await;
                })
                .await;
        });
        self.shutdown.push(tx);
        book
    }

    async fn wait_for_members(&self, count: usize) {
        let http = reqwest::Client::new();
        for _ in 0..100 {
            let body: serde_json::Value = http
                .get(format!("{}/cluster/members", self.coordinator_url))
                .send()
                .await
                .unwrap()
                .json()
                .await
                .unwrap();
            if body["replicas"].as_array().map_or(0, |r| r.len()) >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("replicas did not register in time");
    }

    fn sally(&self) -> ClientCredentials {
        ClientCredentials {
            user: UserDetails::new("sally", "sally@example.com"),
            signing_key: self.sally_key.clone(),
            server_key: self.server_key.verifying_key(),
        }
    }

    fn stop(self) {
        for tx in self.shutdown {
            let _ = tx.send(());
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_cluster_over_http() {
    let mut cluster = start_coordinator(false).await;
    let first = cluster.add_replica("r1").await;
    let second = cluster.add_replica("r2").await;
    cluster.wait_for_members(2).await;

    let mut client = CoordinatorClient::new(cluster.coordinator_url.clone());
    let session = authenticate_and_login(&cluster.sally(), &client).await.unwrap();
    client.set_token(session.token.clone());

    let id = client
        .create_auction(&NewAuction {
            name: "brass lamp".to_string(),
            start_price: 10.0,
            reserve: 20.0,
            description: "over the wire".to_string(),
            seller: session.user.clone(),
        })
        .await
        .unwrap();

    let bob = UserDetails::new("bob", "bob@example.com");
    assert_eq!(client.bid(&id, bob.clone(), 5.0).await.unwrap(), BidOutcome::RejectedLow);
    assert_eq!(client.bid(&id, bob, 25.0).await.unwrap(), BidOutcome::Accepted);
    assert_eq!(first.get_state(), second.get_state());

    // A late replica copies the agreed state on join.
    let third = cluster.add_replica("r3").await;
    cluster.wait_for_members(3).await;
    for _ in 0..100 {
        if third.get(&id).is_some() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(third.get(&id).unwrap().top_bid, 25.0);

    let report = client.verify_cluster(false).await.unwrap();
    assert_eq!(report.replicas, 3);
    assert!(report.is_consistent());

    assert!(client.close_auction(&id, "bob").await.unwrap().is_none());
    let closed = client.close_auction(&id, "sally").await.unwrap().unwrap();
    assert!(closed.reserve_met());
    assert!(client.show_active().await.unwrap().is_empty());

    cluster.stop();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_session_required_over_http() {
    let mut cluster = start_coordinator(true).await;
    cluster.add_replica("r1").await;
    cluster.wait_for_members(1).await;

    let mut client = CoordinatorClient::new(cluster.coordinator_url.clone());
    assert!(matches!(
        client.show_active().await,
        Err(quorum_auction::Error::AuthFailed)
    ));

    let session = authenticate_and_login(&cluster.sally(), &client).await.unwrap();
    assert!(session.token.is_some());
    client.set_token(session.token);
    assert!(client.show_active().await.unwrap().is_empty());

    cluster.stop();
}

#[tokio::test]
async fn test_no_replicas_over_http() {
    let cluster = start_coordinator(false).await;
    let client = CoordinatorClient::new(cluster.coordinator_url.clone());

    assert!(matches!(
        client.show_active().await,
        Err(quorum_auction::Error::Unavailable(_))
    ));

    cluster.stop();
}
