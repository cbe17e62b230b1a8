//! Request-pipeline stages: authenticate (middleware), then sync the
//! directory (extractor) on routes that act as a user. Guards are ordinary
//! composable stages applied by the routing table, not implicit decorators.

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts},
    middleware::Next,
    response::Response,
};

use crate::auth::Claims;
use crate::database::models::User;
use crate::error::ApiError;
use crate::services::DirectoryService;
use crate::state::AppState;

/// Verify the bearer credential and attach the claims to the request.
/// Every failure -- missing header, wrong scheme, malformed token, expired,
/// bad signature, wrong issuer or audience -- yields the same 401.
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = bearer_token(&request).ok_or_else(|| {
        tracing::debug!("rejected request without bearer credential");
        ApiError::Unauthorized
    })?;

    let claims = state.verifier.verify(&token).await.map_err(|e| {
        tracing::debug!("rejected credential: {}", e);
        ApiError::Unauthorized
    })?;

    request.extensions_mut().insert(claims);
    Ok(next.run(request).await)
}

/// The acting user's internal directory row, synced on extraction
/// ("sync-on-first-use"). Handlers must use this -- never a client-supplied
/// user id -- to stamp created-by, student, grader and author fields.
#[derive(Clone, Debug)]
pub struct CurrentUser(pub User);

#[axum::async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, ApiError> {
        // Claims are only present when require_auth ran on this route.
        let claims = parts
            .extensions
            .get::<Claims>()
            .cloned()
            .ok_or(ApiError::Unauthorized)?;

        let user = DirectoryService::new(state.pool.clone())
            .sync_from_identity(&claims)
            .await?;

        Ok(CurrentUser(user))
    }
}

fn bearer_token(request: &Request) -> Option<String> {
    let raw = request
        .headers()
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?;
    let token = raw.strip_prefix("Bearer ")?.trim();
    if token.is_empty() {
        return None;
    }
    Some(token.to_string())
}
