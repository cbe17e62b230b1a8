//! Identity verification against the external identity provider.
//!
//! The provider issues RS256 bearer tokens; we verify them against its
//! published JWKS. Every failure collapses to the same externally observable
//! outcome (401 with a uniform body) -- the concrete cause is only logged.

pub mod claims;
pub mod keys;
pub mod verifier;

pub use claims::Claims;
pub use keys::{HttpJwksSource, JwkSet, JwksSource, KeyStore, StaticJwksSource};
pub use verifier::IdentityVerifier;

/// Why a credential was rejected. Variants exist for logging; all of them
/// map to the same 401 response.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("token header carries no kid")]
    MissingKid,

    #[error("token signed with unexpected algorithm")]
    BadAlgorithm,

    #[error("no published key matches kid {0}")]
    UnknownKey(String),

    #[error("failed to fetch key material: {0}")]
    KeyFetch(String),

    #[error(transparent)]
    Jwt(#[from] jsonwebtoken::errors::Error),
}
