//! The explicit routing table: every route, its handler, and its pipeline
//! (authenticate -> sync-directory -> dispatch) in one place. Reads only
//! need a verified credential; routes that act as a user also run the
//! directory sync via the `CurrentUser` extractor.

use axum::{
    extract::Request,
    http::{header, HeaderValue, Method, StatusCode},
    middleware::{from_fn, from_fn_with_state, Next},
    response::Response,
    routing::{get, post},
    Router,
};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::middleware::require_auth;
use crate::state::AppState;

pub fn app(state: AppState) -> Router {
    Router::new()
        .merge(public_routes())
        .merge(protected_routes(&state))
        .layer(cors_layer(&state))
        .layer(from_fn(preflight_no_content))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// The CORS layer answers preflights with 200; the contract pins 204 No
/// Content. Sits outside the CORS layer so it sees its responses.
async fn preflight_no_content(request: Request, next: Next) -> Response {
    let preflight = request.method() == Method::OPTIONS
        && request
            .headers()
            .contains_key(header::ACCESS_CONTROL_REQUEST_METHOD);
    let mut response = next.run(request).await;
    if preflight && response.status() == StatusCode::OK {
        *response.status_mut() = StatusCode::NO_CONTENT;
    }
    response
}

/// No credential required. The plain user directory reads are public in the
/// current contract (preserved as-is, not silently "fixed").
fn public_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::meta::root))
        .route("/health", get(handlers::meta::health))
        .route("/users", get(handlers::users::list))
        .route("/users/:id", get(handlers::users::show))
}

/// Everything below requires a successful Identity Verifier pass before the
/// resource service executes.
fn protected_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/users/me", get(handlers::users::me))
        .route("/courses", get(handlers::courses::list))
        .route("/courses/:id", get(handlers::courses::show))
        .route(
            "/assignments",
            get(handlers::assignments::list).post(handlers::assignments::create),
        )
        .route(
            "/assignments/:id",
            get(handlers::assignments::show)
                .patch(handlers::assignments::update)
                .delete(handlers::assignments::delete),
        )
        .route(
            "/submissions",
            get(handlers::submissions::list).post(handlers::submissions::create),
        )
        .route("/submissions/:id", get(handlers::submissions::show))
        .route(
            "/submissions/:id/comments",
            post(handlers::submissions::add_comment),
        )
        .route(
            "/submissions/:id/reflection",
            post(handlers::submissions::submit_reflection),
        )
        .route(
            "/grades",
            get(handlers::grades::list).post(handlers::grades::create),
        )
        .route(
            "/grades/:id",
            get(handlers::grades::show).patch(handlers::grades::update),
        )
        .route("/enrollments", post(handlers::enrollments::create))
        .route("/skill-tags", get(handlers::skill_tags::list))
        .route_layer(from_fn_with_state(state.clone(), require_auth))
}

/// Explicit origin allow-list; no wildcard. Credentials allowed, exposed
/// headers limited to Content-Length and Content-Type.
fn cors_layer(state: &AppState) -> CorsLayer {
    let origins: Vec<HeaderValue> = state
        .config
        .cors
        .allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("ignoring unparseable CORS origin {:?}", origin);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_credentials(true)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .expose_headers([header::CONTENT_LENGTH, header::CONTENT_TYPE])
}
