use axum::routing::post;
use axum::Router;

use crate::handlers::uploads;
use crate::state::AppState;

/// Routes mounted at `/uploads`.
///
/// ```text
/// POST   /                -> register_upload
/// ```
pub fn router() -> Router<AppState> {
    Router::new().route("/", post(uploads::register_upload))
}
