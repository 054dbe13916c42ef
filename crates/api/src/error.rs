use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use comfyfile_core::BrokerError;
use serde_json::json;

/// Application-level error type for HTTP handlers.
///
/// Wraps [`BrokerError`] for domain errors and adds HTTP-specific
/// variants. Implements [`IntoResponse`] to produce consistent
/// `{ "success": false, "error": ..., "code": ... }` JSON.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// A domain-level error from the broker.
    #[error(transparent)]
    Broker(#[from] BrokerError),

    /// An error from the durable store.
    #[error("Store error: {0}")]
    Store(#[from] comfyfile_store::StoreError),

    /// A bad request with a human-readable message.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Missing or incorrect credentials.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::Broker(broker) => match broker {
                BrokerError::TaskNotFound(id) => (
                    StatusCode::NOT_FOUND,
                    "TASK_NOT_FOUND",
                    format!("Task {id} not found"),
                ),
                BrokerError::TaskTimeout => (
                    StatusCode::GATEWAY_TIMEOUT,
                    "TASK_TIMEOUT",
                    "Timed out waiting for the task result".to_string(),
                ),
                BrokerError::Cancelled => (
                    StatusCode::CONFLICT,
                    "TASK_CANCELLED",
                    "The wait for this task was cancelled".to_string(),
                ),
                BrokerError::RemoteExecutionFailed(msg) => (
                    StatusCode::BAD_GATEWAY,
                    "REMOTE_EXECUTION_FAILED",
                    msg.clone(),
                ),
                BrokerError::InstanceUnavailable => (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "INSTANCE_UNAVAILABLE",
                    "No backend instance is available".to_string(),
                ),
                BrokerError::InstanceBusy(url) => (
                    StatusCode::BAD_REQUEST,
                    "INSTANCE_BUSY",
                    format!("Instance {url} is executing a task"),
                ),
                BrokerError::InstanceNotFound(url) => (
                    StatusCode::NOT_FOUND,
                    "INSTANCE_NOT_FOUND",
                    format!("Instance {url} is not registered"),
                ),
                BrokerError::Store(msg) => {
                    tracing::error!(error = %msg, "Store error surfaced to a handler");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "STORE_ERROR",
                        "An internal storage error occurred".to_string(),
                    )
                }
            },

            AppError::Store(err) => {
                tracing::error!(error = %err, "Store error surfaced to a handler");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "STORE_ERROR",
                    "An internal storage error occurred".to_string(),
                )
            }

            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            AppError::Unauthorized(msg) => {
                (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg.clone())
            }
        };

        let body = json!({
            "success": false,
            "error": message,
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}
