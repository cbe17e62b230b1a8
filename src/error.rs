use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::json;

/// Failure raised by the service layer. Services never produce HTTP shapes;
/// the mapping to status codes lives in `ApiError` alone.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("{entity} with id {id} not found")]
    NotFound { entity: &'static str, id: String },

    #[error("{0}")]
    Invalid(String),

    #[error("{0}")]
    Conflict(String),

    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

impl ServiceError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        ServiceError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        ServiceError::Invalid(message.into())
    }
}

/// HTTP-facing error. The wire body is always `{statusCode, message}`.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Unauthorized,
    NotFound(String),
    Conflict(String),
    Internal,
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            ApiError::BadRequest(msg) => msg,
            // Uniform body for every authentication failure; the concrete
            // cause is logged, never sent to the client.
            ApiError::Unauthorized => "Unauthorized",
            ApiError::NotFound(msg) => msg,
            ApiError::Conflict(msg) => msg,
            ApiError::Internal => "Internal server error",
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::BadRequest(message.into())
    }
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::NotFound { .. } => ApiError::NotFound(err.to_string()),
            ServiceError::Invalid(msg) => ApiError::BadRequest(msg),
            ServiceError::Conflict(msg) => ApiError::Conflict(msg),
            ServiceError::Database(e) => {
                if let Some(conflict) = constraint_violation(&e) {
                    return ApiError::Conflict(conflict);
                }
                tracing::error!("database error: {}", e);
                ApiError::Internal
            }
        }
    }
}

/// Recognize store-level constraint violations by SQLSTATE and surface them
/// with a sanitized message. 23505 = unique violation, 23503 = foreign key.
fn constraint_violation(err: &sqlx::Error) -> Option<String> {
    let db_err = err.as_database_error()?;
    match db_err.code().as_deref() {
        Some("23505") => Some("resource already exists".to_string()),
        Some("23503") => Some("referenced resource does not exist".to_string()),
        _ => None,
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status_code();
        let body = json!({
            "statusCode": status.as_u16(),
            "message": self.message(),
        });
        (status, Json(body)).into_response()
    }
}
