//! Mutual challenge-response authentication
//!
//! The client proves the coordinator holds its private key, then the
//! coordinator proves the client holds the private key registered for the
//! claimed username:
//!
//! 1. client → coordinator: random 20-byte challenge A
//! 2. coordinator signs A and returns the signature
//! 3. client verifies it against the coordinator's known public key
//! 4. client → coordinator: username
//! 5. coordinator stores a fresh 20-byte challenge B for that username and returns it
//! 6. client signs B and sends the signature with its username
//! 7. coordinator verifies against the username's registered public key
//!
//! Either direction failing is reported as one [`Error::AuthFailed`].

use crate::common::audit::{AuditEventType, AUDIT_LOGGER};
use crate::common::auction::UserDetails;
use crate::common::session::SessionIssuer;
use crate::common::{Error, Result};
use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use futures_util::future::BoxFuture;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

/// Challenge length in bytes.
pub const CHALLENGE_LEN: usize = 20;

pub type Challenge = [u8; CHALLENGE_LEN];

/// Draw a fresh challenge from the OS random source.
pub fn generate_challenge() -> Challenge {
    let mut challenge = [0u8; CHALLENGE_LEN];
    OsRng.fill_bytes(&mut challenge);
    challenge
}

pub fn generate_signing_key() -> SigningKey {
    SigningKey::generate(&mut OsRng)
}

pub fn signing_key_from_hex(encoded: &str) -> Result<SigningKey> {
    let bytes: [u8; 32] = decode_fixed(encoded)?;
    Ok(SigningKey::from_bytes(&bytes))
}

pub fn verifying_key_from_hex(encoded: &str) -> Result<VerifyingKey> {
    let bytes: [u8; 32] = decode_fixed(encoded)?;
    VerifyingKey::from_bytes(&bytes).map_err(|e| Error::Crypto(e.to_string()))
}

fn decode_fixed<const N: usize>(encoded: &str) -> Result<[u8; N]> {
    let bytes = hex::decode(encoded.trim()).map_err(|e| Error::Crypto(e.to_string()))?;
    bytes
        .try_into()
        .map_err(|_| Error::Crypto(format!("expected {} bytes of key material", N)))
}

/// Sign arbitrary bytes, returning the raw 64-byte signature.
pub fn sign(key: &SigningKey, message: &[u8]) -> Vec<u8> {
    key.sign(message).to_bytes().to_vec()
}

/// Strict ed25519 verification; malformed signatures simply fail.
pub fn verify(key: &VerifyingKey, message: &[u8], signature: &[u8]) -> bool {
    let Ok(bytes) = <[u8; 64]>::try_from(signature) else {
        return false;
    };
    key.verify_strict(message, &Signature::from_bytes(&bytes))
        .is_ok()
}

/// Lookup of a user's registered public key.
pub trait IdentityStore: Send + Sync {
    fn public_key(&self, username: &str) -> Option<VerifyingKey>;
}

/// Identity store backed by an in-memory table, usually built from config.
#[derive(Default)]
pub struct StaticIdentityStore {
    keys: HashMap<String, VerifyingKey>,
}

impl StaticIdentityStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from `username → hex public key`. Any bad key fails the whole load.
    pub fn from_hex_table(table: &BTreeMap<String, String>) -> Result<Self> {
        let mut store = Self::new();
        for (username, encoded) in table {
            let key = verifying_key_from_hex(encoded).map_err(|e| {
                Error::InvalidConfig(format!("public key for user {}: {}", username, e))
            })?;
            store.register(username.clone(), key);
        }
        Ok(store)
    }

    pub fn register(&mut self, username: impl Into<String>, key: VerifyingKey) {
        self.keys.insert(username.into(), key);
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl IdentityStore for StaticIdentityStore {
    fn public_key(&self, username: &str) -> Option<VerifyingKey> {
        self.keys.get(username).copied()
    }
}

/// Result of the final handshake step.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginOutcome {
    pub authenticated: bool,
    /// Short-lived session token, issued only when sessions are enabled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session: Option<String>,
}

/// Coordinator side of the handshake.
pub struct ServerAuthenticator {
    signing_key: SigningKey,
    identities: Arc<dyn IdentityStore>,
    pending: Mutex<HashMap<String, Challenge>>,
    sessions: Option<SessionIssuer>,
}

impl ServerAuthenticator {
    pub fn new(signing_key: SigningKey, identities: Arc<dyn IdentityStore>) -> Self {
        Self {
            signing_key,
            identities,
            pending: Mutex::new(HashMap::new()),
            sessions: None,
        }
    }

    /// Issue session tokens on successful logins.
    pub fn with_sessions(mut self, sessions: SessionIssuer) -> Self {
        self.sessions = Some(sessions);
        self
    }

    pub fn public_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }

    pub fn sessions(&self) -> Option<&SessionIssuer> {
        self.sessions.as_ref()
    }

    /// Step 2: sign the client's challenge.
    pub fn verify_server(&self, challenge: &[u8]) -> Vec<u8> {
        sign(&self.signing_key, challenge)
    }

    /// Step 5: issue a challenge for `username`, replacing any pending one.
    pub fn verify_client(&self, username: &str) -> Challenge {
        let challenge = generate_challenge();
        self.pending_challenges()
            .insert(username.to_string(), challenge);
        challenge
    }

    /// Step 7: check the client's signature over its pending challenge.
    ///
    /// The pending challenge is consumed whatever the result.
    pub fn login(&self, signature: &[u8], username: &str) -> bool {
        let challenge = self.pending_challenges().remove(username);

        let verified = match (challenge, self.identities.public_key(username)) {
            (Some(challenge), Some(key)) => verify(&key, &challenge, signature),
            (None, _) => {
                tracing::debug!(username, "login without a pending challenge");
                false
            }
            (_, None) => {
                tracing::debug!(username, "login for unregistered user");
                false
            }
        };

        if verified {
            tracing::info!(username, "client authenticated");
            AUDIT_LOGGER.log_event(
                AuditEventType::AuthSuccess,
                username,
                None,
                "challenge-response login succeeded",
                None,
            );
        } else {
            tracing::warn!(username, "client authentication failed");
            AUDIT_LOGGER.log_event(
                AuditEventType::AuthFailure,
                username,
                None,
                "challenge-response login failed",
                None,
            );
        }
        verified
    }

    /// Step 7 plus a session token when sessions are enabled.
    pub fn login_with_session(&self, signature: &[u8], username: &str) -> Result<LoginOutcome> {
        if !self.login(signature, username) {
            return Ok(LoginOutcome::default());
        }
        let session = match &self.sessions {
            Some(issuer) => Some(issuer.issue(username)?),
            None => None,
        };
        Ok(LoginOutcome {
            authenticated: true,
            session,
        })
    }

    fn pending_challenges(&self) -> std::sync::MutexGuard<'_, HashMap<String, Challenge>> {
        // A poisoned map only holds challenges; keep serving.
        self.pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// The coordinator's handshake surface as seen by a client.
pub trait Authenticate: Send + Sync {
    fn verify_server(&self, challenge: Vec<u8>) -> BoxFuture<'_, Result<Vec<u8>>>;
    fn verify_client(&self, username: String) -> BoxFuture<'_, Result<Vec<u8>>>;
    fn login(&self, signature: Vec<u8>, username: String) -> BoxFuture<'_, Result<LoginOutcome>>;
}

impl Authenticate for ServerAuthenticator {
    fn verify_server(&self, challenge: Vec<u8>) -> BoxFuture<'_, Result<Vec<u8>>> {
        Box::pin(async move { Ok(ServerAuthenticator::verify_server(self, &challenge)) })
    }

    fn verify_client(&self, username: String) -> BoxFuture<'_, Result<Vec<u8>>> {
        Box::pin(async move { Ok(ServerAuthenticator::verify_client(self, &username).to_vec()) })
    }

    fn login(&self, signature: Vec<u8>, username: String) -> BoxFuture<'_, Result<LoginOutcome>> {
        Box::pin(async move { self.login_with_session(&signature, &username) })
    }
}

/// Client key material.
pub struct ClientCredentials {
    pub user: UserDetails,
    pub signing_key: SigningKey,
    /// The coordinator's known public key.
    pub server_key: VerifyingKey,
}

/// An authenticated client identity.
#[derive(Debug, Clone)]
pub struct Session {
    pub user: UserDetails,
    pub token: Option<String>,
}

/// Client side of the handshake.
///
/// Transport errors are returned as-is; any failed verification in either
/// direction is [`Error::AuthFailed`].
pub async fn authenticate_and_login(
    credentials: &ClientCredentials,
    server: &dyn Authenticate,
) -> Result<Session> {
    let username = credentials.user.name.clone();

    let challenge = generate_challenge();
    let server_signature = server.verify_server(challenge.to_vec()).await?;
    let server_verified = verify(&credentials.server_key, &challenge, &server_signature);
    if !server_verified {
        tracing::warn!("coordinator failed to prove its identity");
    }

    let client_verified = if server_verified {
        let client_challenge = server.verify_client(username.clone()).await?;
        let signature = sign(&credentials.signing_key, &client_challenge);
        let outcome = server.login(signature, username.clone()).await?;
        if outcome.authenticated {
            Some(outcome.session)
        } else {
            None
        }
    } else {
        None
    };

    match client_verified {
        Some(token) => Ok(Session {
            user: credentials.user.clone(),
            token,
        }),
        None => Err(Error::AuthFailed),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registered(username: &str) -> (ServerAuthenticator, SigningKey) {
        let client_key = generate_signing_key();
        let mut identities = StaticIdentityStore::new();
        identities.register(username, client_key.verifying_key());
        (
            ServerAuthenticator::new(generate_signing_key(), Arc::new(identities)),
            client_key,
        )
    }

    #[test]
    fn test_challenge_length_and_freshness() {
        let a = generate_challenge();
        let b = generate_challenge();
        assert_eq!(a.len(), CHALLENGE_LEN);
        assert_ne!(a, b);
    }

    #[test]
    fn test_server_signature_verifies() {
        let (server, _) = registered("alice");
        let challenge = generate_challenge();
        let signature = server.verify_server(&challenge);

        assert!(verify(&server.public_key(), &challenge, &signature));
        assert!(!verify(&server.public_key(), &generate_challenge(), &signature));
        assert!(!verify(&server.public_key(), &challenge, &signature[..10]));
    }

    #[test]
    fn test_login_with_correct_signature() {
        let (server, client_key) = registered("alice");
        let challenge = server.verify_client("alice");
        assert!(server.login(&sign(&client_key, &challenge), "alice"));
    }

    #[test]
    fn test_challenge_is_single_use() {
        let (server, client_key) = registered("alice");
        let challenge = server.verify_client("alice");
        let signature = sign(&client_key, &challenge);
        assert!(server.login(&signature, "alice"));
        assert!(!server.login(&signature, "alice"));
    }

    #[test]
    fn test_reissued_challenge_replaces_old_one() {
        let (server, client_key) = registered("alice");
        let stale = server.verify_client("alice");
        let _fresh = server.verify_client("alice");
        assert!(!server.login(&sign(&client_key, &stale), "alice"));
    }

    #[test]
    fn test_unknown_user_fails() {
        let (server, client_key) = registered("alice");
        let challenge = server.verify_client("mallory");
        assert!(!server.login(&sign(&client_key, &challenge), "mallory"));
    }

    #[test]
    fn test_wrong_key_fails() {
        let (server, _) = registered("alice");
        let challenge = server.verify_client("alice");
        let impostor = generate_signing_key();
        assert!(!server.login(&sign(&impostor, &challenge), "alice"));
    }

    #[test]
    fn test_identity_store_from_hex() {
        let key = generate_signing_key();
        let mut table = BTreeMap::new();
        table.insert(
            "alice".to_string(),
            hex::encode(key.verifying_key().to_bytes()),
        );
        let store = StaticIdentityStore::from_hex_table(&table).unwrap();
        assert_eq!(store.public_key("alice"), Some(key.verifying_key()));
        assert!(store.public_key("bob").is_none());

        table.insert("bob".to_string(), "not-hex".to_string());
        assert!(StaticIdentityStore::from_hex_table(&table).is_err());
    }

    #[test]
    fn test_signing_key_hex_roundtrip() {
        let key = generate_signing_key();
        let restored = signing_key_from_hex(&hex::encode(key.to_bytes())).unwrap();
        assert_eq!(restored.verifying_key(), key.verifying_key());
        assert!(signing_key_from_hex("abcd").is_err());
    }
}
