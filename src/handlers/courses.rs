use axum::{
    extract::{Path, State},
    Json,
};
use serde_json::Value;

use crate::api::shape;
use crate::error::ApiError;
use crate::services::CourseService;
use crate::state::AppState;

use super::parse_id;

/// GET /courses
pub async fn list(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let rows = CourseService::new(state.pool.clone()).find_all().await?;
    Ok(Json(
        rows.iter()
            .map(|(course, creator)| shape::course_item(course, creator))
            .collect(),
    ))
}

/// GET /courses/:id
pub async fn show(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let id = parse_id(&id)?;
    let detail = CourseService::new(state.pool.clone()).find_one(id).await?;
    Ok(Json(shape::course_detail(
        &detail.course,
        &detail.creator,
        &detail.enrollments,
        &detail.assignments,
    )))
}
