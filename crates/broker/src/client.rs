//! HTTP client for the Comfyfile endpoints exposed by backend instances.
//!
//! Wraps the two calls the broker makes against an instance: workflow
//! execution (`POST /comfyfile/run`) and the health probe
//! (`GET /comfyfile/healthz`), using [`reqwest`].

use std::time::Duration;

use crate::registry::ClaimedInstance;

/// Errors from the instance HTTP layer.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The HTTP request itself failed (network, DNS, TLS, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The instance returned a non-2xx status code.
    #[error("Instance API error ({status}): {body}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },
}

/// HTTP client shared across all registered instances.
///
/// A single [`reqwest::Client`] underneath, so connection pools are
/// shared and per-request auth is attached from the claimed instance.
#[derive(Clone)]
pub struct ComfyfileClient {
    client: reqwest::Client,
}

impl ComfyfileClient {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    /// Reuse an existing [`reqwest::Client`] (shared pooling with the
    /// proxy layer).
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Execute a workflow on the claimed instance.
    ///
    /// Sends `POST {url}/comfyfile/run` with the raw task parameters as
    /// the JSON body and returns the instance's JSON response verbatim.
    /// The call blocks for the full duration of the remote execution.
    pub async fn run_workflow(
        &self,
        instance: &ClaimedInstance,
        params: &serde_json::Value,
    ) -> Result<serde_json::Value, ClientError> {
        let mut request = self
            .client
            .post(format!("{}/comfyfile/run", instance.url))
            .json(params);
        if let Some(token) = &instance.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response.json().await?)
    }

    /// Probe an instance's health endpoint.
    ///
    /// Healthy means `GET {url}/comfyfile/healthz` answered 200 within
    /// `timeout` with a body whose `success` field is `true`. Every
    /// failure mode (timeout, connection refused, bad status, bad
    /// body) reads as unhealthy rather than an error.
    pub async fn probe(&self, url: &str, token: Option<&str>, timeout: Duration) -> bool {
        let mut request = self
            .client
            .get(format!("{url}/comfyfile/healthz"))
            .timeout(timeout);
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                tracing::debug!(url, error = %e, "Health probe failed to connect");
                return false;
            }
        };
        if !response.status().is_success() {
            tracing::debug!(url, status = %response.status(), "Health probe rejected");
            return false;
        }
        match response.json::<serde_json::Value>().await {
            Ok(body) => body.get("success").and_then(|v| v.as_bool()) == Some(true),
            Err(e) => {
                tracing::debug!(url, error = %e, "Health probe body unreadable");
                false
            }
        }
    }
}

impl Default for ComfyfileClient {
    fn default() -> Self {
        Self::new()
    }
}
