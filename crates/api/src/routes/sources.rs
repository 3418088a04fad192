use axum::routing::get;
use axum::Router;

use crate::handlers::sources;
use crate::state::AppState;

/// Routes mounted at `/sources`.
///
/// ```text
/// GET    /                -> list_available_sources
/// ```
pub fn router() -> Router<AppState> {
    Router::new().route("/", get(sources::list_available_sources))
}
