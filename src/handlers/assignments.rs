use axum::{
    extract::{Path, State},
    http::StatusCode,
};
use serde_json::Value;

use crate::api::shape;
use crate::error::ApiError;
use crate::middleware::CurrentUser;
use crate::services::assignments::{AssignmentDetail, CreateAssignmentDto, UpdateAssignmentDto};
use crate::services::AssignmentService;
use crate::state::AppState;

use super::{parse_id, Json};

/// GET /assignments
pub async fn list(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let rows = AssignmentService::new(state.pool.clone()).find_all().await?;
    Ok(Json(
        rows.iter()
            .map(|(a, course, creator)| shape::assignment_item(a, course, creator))
            .collect(),
    ))
}

/// GET /assignments/:id
pub async fn show(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let id = parse_id(&id)?;
    let detail = AssignmentService::new(state.pool.clone()).find_one(id).await?;
    Ok(Json(shape_detail(&detail)))
}

/// POST /assignments -- acting user comes from the synced directory row.
pub async fn create(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(dto): Json<CreateAssignmentDto>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let detail = AssignmentService::new(state.pool.clone())
        .create(dto, &user)
        .await?;
    Ok((StatusCode::CREATED, Json(shape_detail(&detail))))
}

/// PATCH /assignments/:id
pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<String>,
    CurrentUser(user): CurrentUser,
    Json(dto): Json<UpdateAssignmentDto>,
) -> Result<Json<Value>, ApiError> {
    let id = parse_id(&id)?;
    let detail = AssignmentService::new(state.pool.clone())
        .update(id, dto, &user)
        .await?;
    Ok(Json(shape_detail(&detail)))
}

/// DELETE /assignments/:id -- destructive; the store cascades.
pub async fn delete(
    State(state): State<AppState>,
    Path(id): Path<String>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<Value>, ApiError> {
    let id = parse_id(&id)?;
    let message = AssignmentService::new(state.pool.clone())
        .delete(id, &user)
        .await?;
    Ok(Json(shape::delete_confirmation(id, message)))
}

fn shape_detail(detail: &AssignmentDetail) -> Value {
    shape::assignment_detail(
        &detail.assignment,
        &detail.course,
        &detail.creator,
        detail.template.as_ref(),
        &detail.submissions,
    )
}
