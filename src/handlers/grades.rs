use axum::{
    extract::{Path, State},
    http::StatusCode,
};
use serde_json::Value;

use crate::api::shape;
use crate::error::ApiError;
use crate::middleware::CurrentUser;
use crate::services::grades::{CreateGradeDto, GradeDetail, UpdateGradeDto};
use crate::services::GradeService;
use crate::state::AppState;

use super::{parse_id, Json};

/// GET /grades
pub async fn list(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let rows = GradeService::new(state.pool.clone()).find_all().await?;
    Ok(Json(
        rows.iter()
            .map(|(g, submission, grader)| shape::grade_item(g, submission, grader))
            .collect(),
    ))
}

/// GET /grades/:id
pub async fn show(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let id = parse_id(&id)?;
    let detail = GradeService::new(state.pool.clone()).find_one(id).await?;
    Ok(Json(shape_detail(&detail)))
}

/// POST /grades
pub async fn create(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(dto): Json<CreateGradeDto>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let detail = GradeService::new(state.pool.clone())
        .create(dto, &user)
        .await?;
    Ok((StatusCode::CREATED, Json(shape_detail(&detail))))
}

/// PATCH /grades/:id
pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<String>,
    CurrentUser(user): CurrentUser,
    Json(dto): Json<UpdateGradeDto>,
) -> Result<Json<Value>, ApiError> {
    let id = parse_id(&id)?;
    let detail = GradeService::new(state.pool.clone())
        .update(id, dto, &user)
        .await?;
    Ok(Json(shape_detail(&detail)))
}

fn shape_detail(detail: &GradeDetail) -> Value {
    shape::grade_detail(
        &detail.grade,
        &detail.submission,
        &detail.grader,
        &detail.changes,
    )
}
