use axum::{
    extract::{Path, State},
    Json,
};
use serde_json::Value;

use crate::api::shape;
use crate::error::ApiError;
use crate::middleware::CurrentUser;
use crate::services::DirectoryService;
use crate::state::AppState;

use super::parse_id;

/// GET /users -- reachable without a credential in the current contract.
pub async fn list(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let users = DirectoryService::new(state.pool.clone()).find_all().await?;
    Ok(Json(users.iter().map(shape::user).collect()))
}

/// GET /users/:id
pub async fn show(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let id = parse_id(&id)?;
    let detail = DirectoryService::new(state.pool.clone()).find_one(id).await?;
    Ok(Json(shape::user_detail(
        &detail.user,
        &detail.enrollments,
        &detail.submissions,
        &detail.grades_given,
        &detail.reflections,
    )))
}

/// GET /users/me -- the sync-on-first-use entry point. The `CurrentUser`
/// extractor already synced the row; serve the detail view for that user.
pub async fn me(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<Value>, ApiError> {
    let detail = DirectoryService::new(state.pool.clone())
        .find_one(user.id)
        .await?;
    Ok(Json(shape::user_detail(
        &detail.user,
        &detail.enrollments,
        &detail.submissions,
        &detail.grades_given,
        &detail.reflections,
    )))
}
