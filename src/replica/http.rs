//! HTTP surface of a replica
//!
//! - `POST /rpc`: one [`ReplicaRequest`], answered with a [`ReplicaResponse`]
//! - `GET /health`: liveness plus the number of active auctions

use crate::cluster::rpc::ReplicaRequest;
use crate::replica::state::AuctionBook;
use axum::{extract::State, http::StatusCode, response::IntoResponse, Router};
use serde_json::json;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};

/// Full-state transfers carry the whole map, so allow generous bodies.
pub const MAX_BODY_BYTES: usize = 64 * 1024 * 1024;

#[derive(Clone)]
pub struct ReplicaState {
    pub book: Arc<AuctionBook>,
    pub replica_id: String,
}

pub fn create_router(state: ReplicaState) -> Router {
    Router::new()
        .route("/rpc", axum::routing::post(rpc))
        .route("/health", axum::routing::get(health))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES)),
        )
        .with_state(state)
}

async fn rpc(
    State(state): State<ReplicaState>,
    axum::Json(request): axum::Json<ReplicaRequest>,
) -> impl IntoResponse {
    let op = request.name();
    match state.book.handle(request) {
        Ok(response) => (StatusCode::OK, axum::Json(json!(response))).into_response(),
        Err(e) => {
            tracing::warn!(replica = %state.replica_id, op, error = %e, "rpc failed");
            (e.to_http_status(), axum::Json(json!({ "error": e.to_string() }))).into_response()
        }
    }
}

async fn health(State(state): State<ReplicaState>) -> impl IntoResponse {
    axum::Json(json!({
        "status": "healthy",
        "replica_id": state.replica_id,
        "auctions": state.book.len(),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
