use std::sync::Arc;

use sqlx::PgPool;

use crate::auth::IdentityVerifier;
use crate::config::AppConfig;

/// Shared application state, constructed once in `main` (or a test harness)
/// and injected into every handler. The pool and the verifier's key cache
/// are the only cross-request shared handles.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub pool: PgPool,
    pub verifier: Arc<IdentityVerifier>,
}

impl AppState {
    pub fn new(config: AppConfig, pool: PgPool, verifier: IdentityVerifier) -> Self {
        Self {
            config: Arc::new(config),
            pool,
            verifier: Arc::new(verifier),
        }
    }
}
