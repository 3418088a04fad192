use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::Json;

use crate::error::AppResult;
use crate::query::ScopeParams;
use crate::response::DataResponse;
use crate::state::AppState;

/// GET /api/v1/sources
///
/// Prior job structure outputs and uploads visible to the owner scope.
pub async fn list_available_sources(
    State(state): State<AppState>,
    Query(params): Query<ScopeParams>,
) -> AppResult<impl IntoResponse> {
    let sources = state
        .orchestrator
        .list_available_sources(params.scope())
        .await?;
    Ok(Json(DataResponse { data: sources }))
}
