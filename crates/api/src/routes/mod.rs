pub mod instances;
pub mod root;
pub mod tasks;

use axum::routing::post;
use axum::Router;

use crate::handlers;
use crate::state::AppState;

/// Build the `/comfyfile` route tree.
///
/// ```text
/// /run                     submit and wait for the result
/// /run_async               submit only, poll later
/// /task/{id}               get record, cancel wait
/// /tasks                   list, cancel all waits
/// /instances               list, add
/// /instances/{url}         remove
/// /maintenance/purge       delete old terminal records
/// ```
pub fn comfyfile_routes() -> Router<AppState> {
    Router::new()
        .merge(tasks::router())
        .nest("/instances", instances::router())
        .route("/maintenance/purge", post(handlers::maintenance::purge))
}
