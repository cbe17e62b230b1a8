use axum::{
    extract::{Path, State},
    http::StatusCode,
};
use serde_json::Value;

use crate::api::shape;
use crate::error::ApiError;
use crate::middleware::CurrentUser;
use crate::services::submissions::{
    CreateCommentDto, CreateReflectionDto, CreateSubmissionDto, SubmissionDetail,
};
use crate::services::SubmissionService;
use crate::state::AppState;

use super::{parse_id, Json};

/// GET /submissions
pub async fn list(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let rows = SubmissionService::new(state.pool.clone()).find_all().await?;
    Ok(Json(
        rows.iter()
            .map(|(s, assignment, student, grade)| {
                shape::submission_item(s, assignment, student, grade.as_ref())
            })
            .collect(),
    ))
}

/// GET /submissions/:id
pub async fn show(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let id = parse_id(&id)?;
    let detail = SubmissionService::new(state.pool.clone()).find_one(id).await?;
    Ok(Json(shape_detail(&detail)))
}

/// POST /submissions
pub async fn create(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(dto): Json<CreateSubmissionDto>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let detail = SubmissionService::new(state.pool.clone())
        .create(dto, &user)
        .await?;
    Ok((StatusCode::CREATED, Json(shape_detail(&detail))))
}

/// POST /submissions/:id/comments
pub async fn add_comment(
    State(state): State<AppState>,
    Path(id): Path<String>,
    CurrentUser(user): CurrentUser,
    Json(dto): Json<CreateCommentDto>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let id = parse_id(&id)?;
    let (comment, author) = SubmissionService::new(state.pool.clone())
        .add_comment(id, dto, &user)
        .await?;
    Ok((StatusCode::CREATED, Json(shape::comment(&comment, &author))))
}

/// POST /submissions/:id/reflection
pub async fn submit_reflection(
    State(state): State<AppState>,
    Path(id): Path<String>,
    CurrentUser(user): CurrentUser,
    Json(dto): Json<CreateReflectionDto>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let id = parse_id(&id)?;
    let (response, tags) = SubmissionService::new(state.pool.clone())
        .submit_reflection(id, dto, &user)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(shape::reflection_response(&response, &tags)),
    ))
}

fn shape_detail(detail: &SubmissionDetail) -> Value {
    shape::submission_detail(
        &detail.submission,
        &detail.assignment,
        &detail.student,
        detail.grade.as_ref(),
        &detail.comments,
        detail.reflection.as_ref(),
    )
}
