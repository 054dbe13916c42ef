//! HTTP surface of the Comfyfile task broker.
//!
//! Exposes the middleware API (submit-and-wait, async submit, task
//! inspection, instance administration) plus a transparent proxy
//! fallback to the first registered instance for every route the
//! broker does not handle itself.

pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod proxy;
pub mod response;
pub mod router;
pub mod routes;
pub mod state;
