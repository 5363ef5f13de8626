//! Fan-out of one request to every member of a round
//!
//! Calls run concurrently, each bounded by the round timeout. A replica that
//! errors or stays silent past the deadline is recorded as a non-response;
//! one bad replica never fails the round.

use crate::cluster::rpc::{ReplicaRequest, ReplicaResponse};
use crate::cluster::transport::ReplicaHandle;
use crate::common::{Error, Result};
use futures_util::future::join_all;
use std::sync::Arc;
use std::time::Duration;

/// Send `request` to one member, bounded by `timeout`.
pub async fn call_one(
    member: &dyn ReplicaHandle,
    request: ReplicaRequest,
    timeout: Duration,
) -> Result<ReplicaResponse> {
    match tokio::time::timeout(timeout, member.call(request)).await {
        Ok(result) => result,
        Err(_) => Err(Error::Timeout(format!(
            "{} did not answer within {:?}",
            member.id(),
            timeout
        ))),
    }
}

/// Send `request` to every member and collect `(id, response)` pairs.
///
/// Order follows `members`; the vote re-sorts by id anyway.
pub async fn broadcast(
    members: &[Arc<dyn ReplicaHandle>],
    request: &ReplicaRequest,
    timeout: Duration,
) -> Vec<(String, Option<ReplicaResponse>)> {
    let calls = members.iter().map(|member| {
        let request = request.clone();
        async move {
            let id = member.id().to_string();
            match call_one(member.as_ref(), request, timeout).await {
                Ok(response) => (id, Some(response)),
                Err(e) => {
                    tracing::warn!(replica = %id, error = %e, "replica gave no usable answer");
                    (id, None)
                }
            }
        }
    });

    let responses = join_all(calls).await;
    tracing::debug!(
        op = request.name(),
        members = members.len(),
        answered = responses.iter().filter(|(_, r)| r.is_some()).count(),
        "broadcast complete"
    );
    responses
}

/// Narrow each response to the variant the operation expects.
///
/// A response of the wrong shape counts as a non-response.
pub fn extract_all<T>(
    responses: Vec<(String, Option<ReplicaResponse>)>,
    extract: fn(ReplicaResponse) -> Result<T>,
) -> Vec<(String, Option<T>)> {
    responses
        .into_iter()
        .map(|(id, response)| {
            let value = response.and_then(|response| match extract(response) {
                Ok(value) => Some(value),
                Err(e) => {
                    tracing::warn!(replica = %id, error = %e, "discarding malformed response");
                    None
                }
            });
            (id, value)
        })
        .collect()
}
