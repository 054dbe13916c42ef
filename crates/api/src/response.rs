//! Shared response envelope types for API handlers.
//!
//! All API responses use the `{ "success": true, "data": ... }`
//! envelope, which is the middleware's documented wire contract.
//! Use [`DataResponse`] instead of ad-hoc `serde_json::json!` blocks
//! for compile-time type safety and consistent serialization.

use serde::Serialize;

/// Standard `{ "success": true, "data": T }` response envelope.
#[derive(Debug, Serialize)]
pub struct DataResponse<T: Serialize> {
    pub success: bool,
    pub data: T,
}

impl<T: Serialize> DataResponse<T> {
    pub fn new(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}
