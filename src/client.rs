//! HTTP client for the coordinator's public surface

use crate::common::auth::{Authenticate, LoginOutcome};
use crate::common::{Auction, BidOutcome, Error, NewAuction, Result, UserDetails};
use crate::coordinator::http::{
    BidRequest, ClientChallenge, ClientChallengeRequest, CloseRequest, LoginRequest,
    ServerChallenge, SignatureResponse,
};
use crate::ops::verify::VerifyReport;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use futures_util::future::BoxFuture;
use reqwest::StatusCode;
use serde::Deserialize;

#[derive(Deserialize)]
struct CreatedBody {
    id: String,
}

#[derive(Deserialize)]
struct BidBody {
    outcome: BidOutcome,
}

#[derive(Deserialize)]
struct ClosedBody {
    auction: Auction,
}

#[derive(Deserialize)]
struct AuctionsBody {
    auctions: Vec<Auction>,
}

#[derive(Deserialize)]
struct VerifyBody {
    report: VerifyReport,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

#[derive(Clone)]
pub struct CoordinatorClient {
    base_url: String,
    http: reqwest::Client,
    token: Option<String>,
}

impl CoordinatorClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
            token: None,
        }
    }

    /// Attach a session token to every auction call.
    pub fn set_token(&mut self, token: Option<String>) {
        self.token = token;
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    pub async fn create_auction(&self, listing: &NewAuction) -> Result<String> {
        let response = self
            .authorized(self.http.post(self.url("/auctions")))
            .json(listing)
            .send()
            .await?;
        let body: CreatedBody = check(response).await?.json().await?;
        Ok(body.id)
    }

    pub async fn bid(&self, id: &str, bidder: UserDetails, amount: f64) -> Result<BidOutcome> {
        let response = self
            .authorized(self.http.post(self.url(&format!("/auctions/{}/bids", id))))
            .json(&BidRequest { bidder, amount })
            .send()
            .await?;
        let body: BidBody = check(response).await?.json().await?;
        Ok(body.outcome)
    }

    /// `Ok(None)` when the auction does not exist or `requester` is not its seller.
    pub async fn close_auction(&self, id: &str, requester: &str) -> Result<Option<Auction>> {
        let response = self
            .authorized(self.http.post(self.url(&format!("/auctions/{}/close", id))))
            .json(&CloseRequest {
                requester: requester.to_string(),
            })
            .send()
            .await?;
        match check(response).await {
            Ok(response) => Ok(Some(response.json::<ClosedBody>().await?.auction)),
            Err(Error::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub async fn show_active(&self) -> Result<Vec<Auction>> {
        let response = self
            .authorized(self.http.get(self.url("/auctions")))
            .send()
            .await?;
        Ok(check(response).await?.json::<AuctionsBody>().await?.auctions)
    }

    pub async fn show_auction(&self, keyword: &str) -> Result<Vec<Auction>> {
        let response = self
            .authorized(self.http.get(self.url("/auctions/search")))
            .query(&[("keyword", keyword)])
            .send()
            .await?;
        Ok(check(response).await?.json::<AuctionsBody>().await?.auctions)
    }

    /// Compare replica state, repairing divergent replicas when `repair` is set.
    pub async fn verify_cluster(&self, repair: bool) -> Result<VerifyReport> {
        let path = if repair { "/admin/repair" } else { "/admin/verify" };
        let response = self
            .authorized(self.http.post(self.url(path)))
            .send()
            .await?;
        Ok(check(response).await?.json::<VerifyBody>().await?.report)
    }

    async fn server_signature(&self, challenge: Vec<u8>) -> Result<Vec<u8>> {
        let response = self
            .http
            .post(self.url("/auth/server"))
            .json(&ServerChallenge {
                challenge: BASE64.encode(challenge),
            })
            .send()
            .await?;
        let body: SignatureResponse = check(response).await?.json().await?;
        decode(&body.signature)
    }

    async fn client_challenge(&self, username: String) -> Result<Vec<u8>> {
        let response = self
            .http
            .post(self.url("/auth/client"))
            .json(&ClientChallengeRequest { username })
            .send()
            .await?;
        let body: ClientChallenge = check(response).await?.json().await?;
        decode(&body.challenge)
    }

    async fn login_request(&self, signature: Vec<u8>, username: String) -> Result<LoginOutcome> {
        let response = self
            .http
            .post(self.url("/auth/login"))
            .json(&LoginRequest {
                username,
                signature: BASE64.encode(signature),
            })
            .send()
            .await?;
        if response.status() == StatusCode::UNAUTHORIZED {
            return Ok(LoginOutcome::default());
        }
        Ok(check(response).await?.json().await?)
    }
}

impl Authenticate for CoordinatorClient {
    fn verify_server(&self, challenge: Vec<u8>) -> BoxFuture<'_, Result<Vec<u8>>> {
        Box::pin(self.server_signature(challenge))
    }

    fn verify_client(&self, username: String) -> BoxFuture<'_, Result<Vec<u8>>> {
        Box::pin(self.client_challenge(username))
    }

    fn login(&self, signature: Vec<u8>, username: String) -> BoxFuture<'_, Result<LoginOutcome>> {
        Box::pin(self.login_request(signature, username))
    }
}

fn decode(value: &str) -> Result<Vec<u8>> {
    BASE64
        .decode(value)
        .map_err(|e| Error::UnexpectedResponse(format!("invalid base64 from coordinator: {}", e)))
}

/// Turn an error status into the matching [`Error`].
async fn check(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response
        .json::<ErrorBody>()
        .await
        .map(|body| body.error)
        .unwrap_or_else(|_| status.to_string());
    Err(match status {
        StatusCode::SERVICE_UNAVAILABLE => Error::Unavailable(message),
        StatusCode::NOT_FOUND => Error::NotFound(message),
        StatusCode::UNAUTHORIZED => Error::AuthFailed,
        StatusCode::FORBIDDEN => Error::Forbidden(message),
        StatusCode::BAD_REQUEST => Error::InvalidRequest(message),
        StatusCode::CONFLICT => Error::DuplicateAuction(message),
        _ => Error::Http(format!("{}: {}", status, message)),
    })
}
