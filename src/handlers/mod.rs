pub mod assignments;
pub mod courses;
pub mod enrollments;
pub mod grades;
pub mod meta;
pub mod skill_tags;
pub mod submissions;
pub mod users;

use axum::extract::{FromRequest, Request};
use axum::response::IntoResponse;
use serde::de::DeserializeOwned;
use serde::Serialize;
use uuid::Uuid;

use crate::error::ApiError;

/// Path segments are opaque strings on the wire; a malformed uuid is a
/// structural validation failure, not a 404.
pub(crate) fn parse_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| ApiError::bad_request(format!("invalid id: {}", raw)))
}

/// `axum::Json` with the rejection folded into the wire error contract: an
/// unparseable or mistyped body is a 400 `{statusCode, message}` like every
/// other validation failure, never a plain-text 4xx.
pub(crate) struct Json<T>(pub T);

#[axum::async_trait]
impl<T, S> FromRequest<S> for Json<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match axum::Json::<T>::from_request(req, state).await {
            Ok(axum::Json(value)) => Ok(Json(value)),
            Err(rejection) => Err(ApiError::bad_request(rejection.body_text())),
        }
    }
}

impl<T: Serialize> IntoResponse for Json<T> {
    fn into_response(self) -> axum::response::Response {
        axum::Json(self.0).into_response()
    }
}
