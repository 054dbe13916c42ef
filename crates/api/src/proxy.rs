//! Transparent proxy fallback.
//!
//! Any request the broker does not handle itself is forwarded to the
//! first registered instance: method, path, query, headers, and body
//! go out unchanged, and the instance's status, headers, and body come
//! back unchanged. This keeps the middleware drop-in compatible with
//! clients that speak to a Comfyfile instance directly.

use axum::body::{to_bytes, Body, Bytes};
use axum::extract::{Request, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::error::AppError;
use crate::state::AppState;

/// Upper bound on a buffered proxy body.
const MAX_BODY_BYTES: usize = 64 * 1024 * 1024;

/// Hop-by-hop headers that must not be relayed in either direction.
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

pub async fn forward(State(state): State<AppState>, request: Request) -> Response {
    let Some(target) = state.registry.first().await else {
        return AppError::Broker(comfyfile_core::BrokerError::InstanceUnavailable)
            .into_response();
    };

    match forward_to(&state.http, &target.url, target.token.as_deref(), request).await {
        Ok(response) => response,
        Err(e) => {
            tracing::warn!(url = %target.url, error = %e, "Proxy forward failed");
            AppError::Broker(comfyfile_core::BrokerError::RemoteExecutionFailed(
                e.to_string(),
            ))
            .into_response()
        }
    }
}

async fn forward_to(
    http: &reqwest::Client,
    base_url: &str,
    token: Option<&str>,
    request: Request,
) -> Result<Response, ProxyError> {
    let (parts, body) = request.into_parts();
    let path_and_query = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let target_url = format!("{base_url}{path_and_query}");
    tracing::debug!(method = %parts.method, url = %target_url, "Proxying request");

    let body = to_bytes(body, MAX_BODY_BYTES)
        .await
        .map_err(|_| ProxyError::BodyTooLarge)?;

    let mut headers = parts.headers;
    headers.remove("host");
    strip_hop_by_hop(&mut headers);
    let caller_authenticated = headers.contains_key("authorization");

    let mut outgoing = http
        .request(parts.method, &target_url)
        .headers(headers)
        .body(body);
    // Attach the instance token unless the caller supplied their own.
    if let (Some(token), false) = (token, caller_authenticated) {
        outgoing = outgoing.bearer_auth(token);
    }

    let upstream = outgoing.send().await?;
    let status = upstream.status();
    let mut response_headers = upstream.headers().clone();
    strip_hop_by_hop(&mut response_headers);
    response_headers.remove("content-length");

    let bytes = upstream.bytes().await?;
    Ok(relay(status, response_headers, bytes))
}

fn relay(status: StatusCode, headers: HeaderMap, body: Bytes) -> Response {
    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}

fn strip_hop_by_hop(headers: &mut HeaderMap) {
    for name in HOP_BY_HOP {
        headers.remove(*name);
    }
}

#[derive(Debug, thiserror::Error)]
enum ProxyError {
    #[error("request body exceeds the proxy buffer limit")]
    BodyTooLarge,
    #[error(transparent)]
    Upstream(#[from] reqwest::Error),
}
