use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::{json, Value};

use crate::state::AppState;

pub async fn root() -> Json<Value> {
    Json(json!({
        "name": "Coursebook API",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Course-management REST API",
        "endpoints": {
            "users": "/users, /users/:id, /users/me",
            "courses": "/courses, /courses/:id",
            "assignments": "/assignments, /assignments/:id",
            "submissions": "/submissions, /submissions/:id",
            "grades": "/grades, /grades/:id",
            "enrollments": "/enrollments",
            "skillTags": "/skill-tags",
        },
    }))
}

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let now = chrono::Utc::now();
    match sqlx::query("SELECT 1").execute(&state.pool).await {
        Ok(_) => (
            StatusCode::OK,
            Json(json!({
                "status": "ok",
                "timestamp": crate::api::shape::iso8601(now),
                "database": "ok",
            })),
        ),
        Err(e) => {
            tracing::warn!("health check database ping failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "status": "degraded",
                    "timestamp": crate::api::shape::iso8601(now),
                    "database": "unavailable",
                })),
            )
        }
    }
}
