//! Short-lived session tokens handed out after a successful handshake
//!
//! Optional: without them every privileged call trusts the bare username it
//! is given. With `require_session` the coordinator insists on a bearer token
//! and checks its subject against the requester.

use crate::common::{Error, Result};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Session token claims
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Authenticated username
    pub sub: String,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
    /// Issued at (Unix timestamp)
    pub iat: u64,
}

pub struct SessionIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    ttl: Duration,
}

impl SessionIssuer {
    pub fn new(secret: &[u8], ttl: Duration) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            ttl,
        }
    }

    /// Issuer with a random per-process secret. Tokens die with the process.
    pub fn ephemeral(ttl: Duration) -> Self {
        let mut secret = [0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut secret);
        Self::new(&secret, ttl)
    }

    pub fn issue(&self, username: &str) -> Result<String> {
        let now = crate::common::utils::timestamp_now();
        let claims = Claims {
            sub: username.to_string(),
            exp: now + self.ttl.as_secs(),
            iat: now,
        };
        encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| Error::Crypto(format!("session encoding failed: {}", e)))
    }

    /// Validate a token and return the username it was issued to.
    pub fn validate(&self, token: &str) -> Result<String> {
        let mut validation = Validation::default();
        validation.leeway = 0;
        let data = decode::<Claims>(token, &self.decoding_key, &validation)
            .map_err(|_| Error::AuthFailed)?;
        Ok(data.claims.sub)
    }

    /// Validate an `Authorization` header value of the form `Bearer <token>`.
    pub fn validate_header(&self, header: &str) -> Result<String> {
        match header.split_once(' ') {
            Some((scheme, token)) if scheme.eq_ignore_ascii_case("bearer") => {
                self.validate(token.trim())
            }
            _ => Err(Error::AuthFailed),
        }
    }
}
