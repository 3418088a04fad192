//! Handlers for registering uploaded structure files.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

/// Body of `POST /api/v1/uploads`.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateUpload {
    #[validate(length(min = 1, max = 255))]
    pub filename: String,
    /// Structure file text, at most 20 MiB.
    #[validate(length(min = 1, max = 20971520))]
    pub content: String,
    #[serde(default)]
    pub owner_scope: Option<String>,
}

/// POST /api/v1/uploads
///
/// Store a structure file and return its registry entry. The returned
/// `upload_id` can be named in a job's structure descriptor.
pub async fn register_upload(
    State(state): State<AppState>,
    Json(input): Json<CreateUpload>,
) -> AppResult<impl IntoResponse> {
    input.validate()?;
    if input.content.trim().is_empty() {
        return Err(AppError::BadRequest("Upload content must not be blank".into()));
    }

    let entry = state
        .orchestrator
        .register_upload(
            input.owner_scope.as_deref(),
            &input.filename,
            input.content.as_bytes(),
        )
        .await?;

    Ok((StatusCode::CREATED, Json(DataResponse { data: entry })))
}
