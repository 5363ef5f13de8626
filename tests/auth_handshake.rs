//! Mutual challenge-response handshake tests

use futures_util::future::BoxFuture;
use quorum_auction::common::auth::{
    authenticate_and_login, generate_challenge, generate_signing_key, sign, Authenticate,
    ClientCredentials, LoginOutcome, ServerAuthenticator, StaticIdentityStore,
};
use quorum_auction::common::session::SessionIssuer;
use quorum_auction::common::{Error, Result, UserDetails};
use std::sync::Arc;
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};

struct Fixture {
    server: ServerAuthenticator,
    alice: ClientCredentials,
}

fn fixture() -> Fixture {
    let server_key = generate_signing_key();
    let alice_key = generate_signing_key();

    let mut identities = StaticIdentityStore::new();
    identities.register("alice", alice_key.verifying_key());

    let alice = ClientCredentials {
        user: UserDetails::new("alice", "alice@example.com"),
        signing_key: alice_key,
        server_key: server_key.verifying_key(),
    };
    let server = ServerAuthenticator::new(server_key, Arc::new(identities));
    Fixture { server, alice }
}

#[tokio::test]
async fn test_registered_client_logs_in() {
    let Fixture { server, alice } = fixture();

    let session = assert_ok!(authenticate_and_login(&alice, &server).await);
    assert_eq!(session.user.name, "alice");
    assert!(session.token.is_none());
}

#[tokio::test]
async fn test_manual_seven_step_handshake() {
    let Fixture { server, alice } = fixture();

    // 1-3: server proves its key
    let challenge_a = generate_challenge();
    let server_signature = server.verify_server(&challenge_a);
    assert!(quorum_auction::common::auth::verify(
        &alice.server_key,
        &challenge_a,
        &server_signature
    ));

    // 4-7: client proves its key
    let challenge_b = server.verify_client("alice");
    let signature = sign(&alice.signing_key, &challenge_b);
    assert!(server.login(&signature, "alice"));
}

#[tokio::test]
async fn test_signing_wrong_challenge_fails() {
    let Fixture { server, alice } = fixture();

    let challenge_a = generate_challenge();
    let _ = server.verify_server(&challenge_a);
    let _challenge_b = server.verify_client("alice");

    // Sign challenge A instead of B.
    let signature = sign(&alice.signing_key, &challenge_a);
    assert!(!server.login(&signature, "alice"));
}

#[tokio::test]
async fn test_pending_challenge_is_single_use() {
    let Fixture { server, alice } = fixture();

    let challenge_b = server.verify_client("alice");
    let signature = sign(&alice.signing_key, &challenge_b);
    assert!(server.login(&signature, "alice"));
    assert!(!server.login(&signature, "alice"));
}

#[tokio::test]
async fn test_reissued_challenge_replaces_pending() {
    let Fixture { server, alice } = fixture();

    let first = server.verify_client("alice");
    let second = server.verify_client("alice");
    assert_ne!(first, second);

    let stale = sign(&alice.signing_key, &first);
    assert!(!server.login(&stale, "alice"));

    let challenge = server.verify_client("alice");
    let fresh = sign(&alice.signing_key, &challenge);
    assert!(server.login(&fresh, "alice"));
}

#[tokio::test]
async fn test_unknown_user_fails() {
    let Fixture { server, alice } = fixture();
    let mallory = ClientCredentials {
        user: UserDetails::new("mallory", "mallory@example.com"),
        signing_key: generate_signing_key(),
        server_key: alice.server_key,
    };

    let result = authenticate_and_login(&mallory, &server).await;
    assert!(matches!(result, Err(Error::AuthFailed)));
}

#[tokio::test]
async fn test_client_with_wrong_key_fails() {
    let Fixture { server, alice } = fixture();
    let impostor = ClientCredentials {
        user: alice.user.clone(),
        signing_key: generate_signing_key(),
        server_key: alice.server_key,
    };

    let result = authenticate_and_login(&impostor, &server).await;
    assert!(matches!(result, Err(Error::AuthFailed)));
}

#[tokio::test]
async fn test_impostor_server_fails() {
    let Fixture { server, alice } = fixture();
    let expecting_other_server = ClientCredentials {
        user: alice.user.clone(),
        signing_key: alice.signing_key.clone(),
        server_key: generate_signing_key().verifying_key(),
    };

    let result = authenticate_and_login(&expecting_other_server, &server).await;
    assert!(matches!(result, Err(Error::AuthFailed)));
}

#[tokio::test]
async fn test_login_issues_session_when_enabled() {
    let Fixture { server, alice } = fixture();
    let server = server.with_sessions(SessionIssuer::ephemeral(Duration::from_secs(60)));

    let session = assert_ok!(authenticate_and_login(&alice, &server).await);
    let token = session.token.expect("session token");
    let subject = assert_ok!(server.sessions().unwrap().validate(&token));
    assert_eq!(subject, "alice");
}

/// Transport that fails every call.
struct Unreachable;

impl Authenticate for Unreachable {
    fn verify_server(&self, _challenge: Vec<u8>) -> BoxFuture<'_, Result<Vec<u8>>> {
        Box::pin(async { Err(Error::ConnectionFailed("refused".into())) })
    }

    fn verify_client(&self, _username: String) -> BoxFuture<'_, Result<Vec<u8>>> {
        Box::pin(async { Err(Error::ConnectionFailed("refused".into())) })
    }

    fn login(&self, _signature: Vec<u8>, _username: String) -> BoxFuture<'_, Result<LoginOutcome>> {
        Box::pin(async { Err(Error::ConnectionFailed("refused".into())) })
    }
}

#[tokio::test]
async fn test_transport_errors_are_not_auth_failures() {
    let Fixture { alice, .. } = fixture();
    let result = authenticate_and_login(&alice, &Unreachable).await;
    let err = assert_err!(result);
    assert!(matches!(err, Error::ConnectionFailed(_)));
}
