//! HTTP API for the coordinator
//!
//! Auctions:
//! - `POST /auctions`, `GET /auctions`, `GET /auctions/search?keyword=`
//! - `POST /auctions/:id/bids`, `POST /auctions/:id/close`
//!
//! Handshake (binary values are base64):
//! - `POST /auth/server`, `POST /auth/client`, `POST /auth/login`
//!
//! Cluster registry, used by replicas:
//! - `POST /cluster/join`, `POST /cluster/heartbeat`, `POST /cluster/leave`, `GET /cluster/members`
//!
//! Health and admin:
//! - `GET /health`, `GET /health/live`, `POST /admin/verify`, `POST /admin/repair`

use crate::cluster::membership::{ClusterRegistry, JoinRequest, JoinResponse, NodeRequest};
use crate::common::auth::ServerAuthenticator;
use crate::common::{
    AuditEventType, Error, NewAuction, Result, UserDetails, AUDIT_LOGGER,
};
use crate::coordinator::dispatch::Coordinator;
use crate::ops::verify::verify_cluster;
use axum::{
    extract::{Path, Query, State},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Router,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};

const MAX_BODY_BYTES: usize = 1024 * 1024;

#[derive(Clone)]
pub struct CoordState {
    pub coordinator: Arc<Coordinator>,
    pub auth: Arc<ServerAuthenticator>,
    /// Present when replicas register over HTTP.
    pub registry: Option<Arc<ClusterRegistry>>,
    /// Require a bearer session token on auction endpoints.
    pub require_session: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BidRequest {
    pub bidder: UserDetails,
    pub amount: f64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CloseRequest {
    pub requester: String,
}

#[derive(Debug, Deserialize)]
struct SearchQuery {
    #[serde(default)]
    keyword: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ServerChallenge {
    pub challenge: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SignatureResponse {
    pub signature: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ClientChallengeRequest {
    pub username: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ClientChallenge {
    pub challenge: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub signature: String,
}

pub fn create_router(state: CoordState) -> Router {
    Router::new()
        // Coordinated auction operations
        .route("/auctions", axum::routing::post(create_auction))
        .route("/auctions", axum::routing::get(show_active))
        .route("/auctions/search", axum::routing::get(show_auction))
        .route("/auctions/:id/bids", axum::routing::post(place_bid))
        .route("/auctions/:id/close", axum::routing::post(close_auction))
        // Handshake
        .route("/auth/server", axum::routing::post(verify_server))
        .route("/auth/client", axum::routing::post(verify_client))
        .route("/auth/login", axum::routing::post(login))
        // Replica registry
        .route("/cluster/join", axum::routing::post(cluster_join))
        .route("/cluster/heartbeat", axum::routing::post(cluster_heartbeat))
        .route("/cluster/leave", axum::routing::post(cluster_leave))
        .route("/cluster/members", axum::routing::get(cluster_members))
        // Health and admin
        .route("/health", axum::routing::get(health))
        .route("/health/live", axum::routing::get(health_live))
        .route("/admin/verify", axum::routing::post(admin_verify))
        .route("/admin/repair", axum::routing::post(admin_repair))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES)),
        )
        .with_state(state)
}

fn error_response(e: Error) -> Response {
    let status = e.to_http_status();
    if status.is_server_error() {
        tracing::warn!("request failed: {}", e);
    }
    let message = match &e {
        Error::Unavailable(_) => "service unavailable, try again later".to_string(),
        Error::NotFound(_) => "auction not found or not permitted".to_string(),
        _ => e.to_string(),
    };
    (status, axum::Json(json!({ "error": message }))).into_response()
}

/// Session subject when sessions are required, `None` otherwise.
fn authorize(state: &CoordState, headers: &HeaderMap) -> Result<Option<String>> {
    if !state.require_session {
        return Ok(None);
    }
    let issuer = state
        .auth
        .sessions()
        .ok_or_else(|| Error::Internal("sessions required but not configured".into()))?;
    let header = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .ok_or(Error::AuthFailed)?;
    issuer.validate_header(header).map(Some)
}

fn decode_base64(field: &str, value: &str) -> Result<Vec<u8>> {
    BASE64
        .decode(value)
        .map_err(|e| Error::InvalidRequest(format!("{} is not valid base64: {}", field, e)))
}

async fn create_auction(
    State(state): State<CoordState>,
    headers: HeaderMap,
    axum::Json(listing): axum::Json<NewAuction>,
) -> Response {
    if let Err(e) = authorize(&state, &headers) {
        return error_response(e);
    }
    match state.coordinator.create_auction(listing).await {
        Ok(id) => (StatusCode::CREATED, axum::Json(json!({ "id": id }))).into_response(),
        Err(e) => error_response(e),
    }
}

async fn place_bid(
    State(state): State<CoordState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    axum::Json(req): axum::Json<BidRequest>,
) -> Response {
    if let Err(e) = authorize(&state, &headers) {
        return error_response(e);
    }
    match state.coordinator.bid(&id, req.bidder, req.amount).await {
        Ok(outcome) => (
            StatusCode::OK,
            axum::Json(json!({ "outcome": outcome, "code": outcome.code() })),
        )
            .into_response(),
        Err(e) => error_response(e),
    }
}

async fn close_auction(
    State(state): State<CoordState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    axum::Json(req): axum::Json<CloseRequest>,
) -> Response {
    match authorize(&state, &headers) {
        Ok(Some(subject)) if subject != req.requester => {
            return error_response(Error::Forbidden(
                "session does not belong to the requester".into(),
            ));
        }
        Ok(_) => {}
        Err(e) => return error_response(e),
    }
    match state.coordinator.close_auction(&id, &req.requester).await {
        Ok(Some(auction)) => {
            let reserve_met = auction.reserve_met();
            (
                StatusCode::OK,
                axum::Json(json!({ "auction": auction, "reserve_met": reserve_met })),
            )
                .into_response()
        }
        Ok(None) => error_response(Error::NotFound(id)),
        Err(e) => error_response(e),
    }
}

async fn show_active(State(state): State<CoordState>, headers: HeaderMap) -> Response {
    if let Err(e) = authorize(&state, &headers) {
        return error_response(e);
    }
    match state.coordinator.show_active().await {
        Ok(auctions) => axum::Json(json!({ "auctions": auctions })).into_response(),
        Err(e) => error_response(e),
    }
}

async fn show_auction(
    State(state): State<CoordState>,
    headers: HeaderMap,
    Query(query): Query<SearchQuery>,
) -> Response {
    if let Err(e) = authorize(&state, &headers) {
        return error_response(e);
    }
    match state.coordinator.show_auction(&query.keyword).await {
        Ok(auctions) => axum::Json(json!({ "auctions": auctions })).into_response(),
        Err(e) => error_response(e),
    }
}

async fn verify_server(
    State(state): State<CoordState>,
    axum::Json(req): axum::Json<ServerChallenge>,
) -> Response {
    let challenge = match decode_base64("challenge", &req.challenge) {
        Ok(challenge) => challenge,
        Err(e) => return error_response(e),
    };
    let signature = state.auth.verify_server(&challenge);
    axum::Json(SignatureResponse {
        signature: BASE64.encode(signature),
    })
    .into_response()
}

async fn verify_client(
    State(state): State<CoordState>,
    axum::Json(req): axum::Json<ClientChallengeRequest>,
) -> Response {
    if req.username.trim().is_empty() {
        return error_response(Error::InvalidRequest("username is empty".into()));
    }
    let challenge = state.auth.verify_client(&req.username);
    axum::Json(ClientChallenge {
        challenge: BASE64.encode(challenge),
    })
    .into_response()
}

async fn login(
    State(state): State<CoordState>,
    axum::Json(req): axum::Json<LoginRequest>,
) -> Response {
    let signature = match decode_base64("signature", &req.signature) {
        Ok(signature) => signature,
        Err(e) => return error_response(e),
    };
    match state.auth.login_with_session(&signature, &req.username) {
        Ok(outcome) if outcome.authenticated => axum::Json(outcome).into_response(),
        Ok(outcome) => (StatusCode::UNAUTHORIZED, axum::Json(outcome)).into_response(),
        Err(e) => error_response(e),
    }
}

fn registry(state: &CoordState) -> Result<&Arc<ClusterRegistry>> {
    state
        .registry
        .as_ref()
        .ok_or_else(|| Error::NotFound("cluster registry is disabled".into()))
}

async fn cluster_join(
    State(state): State<CoordState>,
    axum::Json(req): axum::Json<JoinRequest>,
) -> Response {
    let registry = match registry(&state) {
        Ok(registry) => registry,
        Err(e) => return error_response(e),
    };
    if req.id.trim().is_empty() || req.url.trim().is_empty() {
        return error_response(Error::InvalidRequest("replica id and url are required".into()));
    }

    let peers = registry.peers_of(&req.id);
    if registry.register(&req.id, &req.url) {
        tracing::info!(replica = %req.id, url = %req.url, "replica joined");
        AUDIT_LOGGER.log_event(
            AuditEventType::ReplicaJoined,
            req.id.clone(),
            None,
            format!("replica registered at {}", req.url),
            None,
        );
    }
    axum::Json(JoinResponse { peers }).into_response()
}

async fn cluster_heartbeat(
    State(state): State<CoordState>,
    axum::Json(req): axum::Json<NodeRequest>,
) -> Response {
    let registry = match registry(&state) {
        Ok(registry) => registry,
        Err(e) => return error_response(e),
    };
    if registry.heartbeat(&req.id) {
        StatusCode::OK.into_response()
    } else {
        error_response(Error::NotFound(format!("replica {} is not registered", req.id)))
    }
}

async fn cluster_leave(
    State(state): State<CoordState>,
    axum::Json(req): axum::Json<NodeRequest>,
) -> Response {
    let registry = match registry(&state) {
        Ok(registry) => registry,
        Err(e) => return error_response(e),
    };
    if registry.deregister(&req.id) {
        tracing::info!(replica = %req.id, "replica left");
        AUDIT_LOGGER.log_event(
            AuditEventType::ReplicaLeft,
            req.id.clone(),
            None,
            "replica deregistered",
            None,
        );
    }
    StatusCode::OK.into_response()
}

async fn cluster_members(State(state): State<CoordState>) -> Response {
    match registry(&state) {
        Ok(registry) => axum::Json(json!({ "replicas": registry.list() })).into_response(),
        Err(e) => error_response(e),
    }
}

/// Health check: the coordinator is healthy when at least one replica would
/// take part in a round.
async fn health(State(state): State<CoordState>) -> Response {
    let replicas = state.coordinator.membership().members().len();
    let status = if replicas > 0 {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        status,
        axum::Json(json!({
            "status": if replicas > 0 { "healthy" } else { "unavailable" },
            "replicas": replicas,
            "require_session": state.require_session,
            "version": env!("CARGO_PKG_VERSION"),
        })),
    )
        .into_response()
}

async fn health_live() -> impl IntoResponse {
    axum::Json(json!({
        "alive": true,
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": crate::common::timestamp_now(),
    }))
}

/// Admin endpoint: compare replica state without touching it
async fn admin_verify(State(state): State<CoordState>, headers: HeaderMap) -> Response {
    run_verify(state, headers, false).await
}

/// Admin endpoint: compare replica state and repair divergent replicas
async fn admin_repair(State(state): State<CoordState>, headers: HeaderMap) -> Response {
    run_verify(state, headers, true).await
}

async fn run_verify(state: CoordState, headers: HeaderMap, repair: bool) -> Response {
    if let Err(e) = authorize(&state, &headers) {
        return error_response(e);
    }
    let coordinator = &state.coordinator;
    match verify_cluster(
        coordinator.membership().as_ref(),
        coordinator.round_timeout(),
        repair,
    )
    .await
    {
        Ok(report) => axum::Json(json!({ "status": "ok", "report": report })).into_response(),
        Err(e) => error_response(e),
    }
}
