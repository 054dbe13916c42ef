//! Route definitions for the `/instances` resource.

use axum::routing::{delete, get};
use axum::Router;

use crate::handlers::instances;
use crate::state::AppState;

/// Routes mounted at `/comfyfile/instances`.
///
/// ```text
/// GET    /          -> list_instances
/// POST   /          -> add_instance
/// DELETE /{url}     -> remove_instance (percent-encoded URL)
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(instances::list_instances).post(instances::add_instance),
        )
        .route("/{url}", delete(instances::remove_instance))
}
