pub mod health;
pub mod jobs;
pub mod sources;
pub mod uploads;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /jobs                          list, submit
/// /jobs/{id}                     status
/// /jobs/{id}/result              completed artifact
/// /jobs/{id}/cancel              cancel (POST)
///
/// /sources                       prior job outputs and uploads
///
/// /uploads                       register a structure file (POST)
/// ```
///
/// Read and cancel endpoints take an optional `?owner_scope=`.
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/jobs", jobs::router())
        .nest("/sources", sources::router())
        .nest("/uploads", uploads::router())
}
