use axum::{extract::State, Json};
use serde_json::Value;

use crate::api::shape;
use crate::error::ApiError;
use crate::services::SkillTagService;
use crate::state::AppState;

/// GET /skill-tags
pub async fn list(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let tags = SkillTagService::new(state.pool.clone()).find_all().await?;
    Ok(Json(tags.iter().map(shape::skill_tag).collect()))
}
