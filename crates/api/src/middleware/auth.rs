//! Shared-secret request authentication.
//!
//! When `SECURITY_ENABLED` is on, every request must present the
//! configured secret, either as `Authorization: Bearer <secret>` or as
//! a `?token=<secret>` query parameter. The root index and health
//! endpoints stay open so load balancers can probe the service.

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;

use crate::error::AppError;
use crate::state::AppState;

/// Paths that never require the secret.
const OPEN_PATHS: &[&str] = &["/", "/health"];

pub async fn require_auth(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    if !state.config.security_enabled {
        return Ok(next.run(request).await);
    }
    if OPEN_PATHS.contains(&request.uri().path()) {
        return Ok(next.run(request).await);
    }

    let Some(secret) = state.config.security_secret.as_deref() else {
        // from_env refuses this combination; only reachable with a
        // hand-built config.
        return Err(AppError::Unauthorized("Security misconfigured".into()));
    };

    if bearer_token(&request) == Some(secret) || query_token(&request) == Some(secret) {
        return Ok(next.run(request).await);
    }

    Err(AppError::Unauthorized(
        "Missing or invalid authentication token".into(),
    ))
}

fn bearer_token(request: &Request) -> Option<&str> {
    request
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

fn query_token(request: &Request) -> Option<&str> {
    request
        .uri()
        .query()?
        .split('&')
        .find_map(|pair| pair.strip_prefix("token="))
}
