use axum::routing::get;
use axum::Router;

use crate::handlers::root;
use crate::state::AppState;

/// Root-level routes (NOT under `/comfyfile`, never behind auth).
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(root::index))
        .route("/health", get(root::health))
}
