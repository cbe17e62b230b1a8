use axum::{extract::State, http::StatusCode};
use serde_json::Value;

use crate::api::shape;
use crate::error::ApiError;
use crate::middleware::CurrentUser;
use crate::services::enrollments::CreateEnrollmentDto;
use crate::services::EnrollmentService;
use crate::state::AppState;

use super::Json;

/// POST /enrollments
pub async fn create(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(dto): Json<CreateEnrollmentDto>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let enrollment = EnrollmentService::new(state.pool.clone())
        .create(dto, &user)
        .await?;
    Ok((StatusCode::CREATED, Json(shape::enrollment(&enrollment))))
}
