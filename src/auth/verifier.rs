use jsonwebtoken::{decode, decode_header, Algorithm, Validation};

use crate::auth::{AuthError, Claims, KeyStore};
use crate::config::AuthConfig;

/// Validates bearer credentials: signature against the provider's published
/// keys, expiry, issuer and audience. Runs before any protected resource
/// service executes.
pub struct IdentityVerifier {
    keys: KeyStore,
    issuer: String,
    audience: String,
}

impl IdentityVerifier {
    pub fn new(keys: KeyStore, config: &AuthConfig) -> Self {
        Self {
            keys,
            issuer: config.issuer.clone(),
            audience: config.audience.clone(),
        }
    }

    pub async fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        let header = decode_header(token)?;
        if header.alg != Algorithm::RS256 {
            return Err(AuthError::BadAlgorithm);
        }
        let kid = header.kid.ok_or(AuthError::MissingKid)?;
        let key = self.keys.key_for(&kid).await?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_issuer(&[&self.issuer]);
        validation.set_audience(&[&self.audience]);
        validation.set_required_spec_claims(&["exp", "iss", "aud", "sub"]);

        let data = decode::<Claims>(token, &key, &validation)?;
        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{JwkSet, StaticJwksSource};

    fn test_config() -> AuthConfig {
        AuthConfig {
            issuer: "https://id.example.com/".into(),
            audience: "coursebook".into(),
            jwks_url: "https://id.example.com/.well-known/jwks.json".into(),
            jwks_max_age_secs: 3600,
            jwks_refresh_cooldown_secs: 30,
        }
    }

    fn verifier() -> IdentityVerifier {
        let config = test_config();
        let store = KeyStore::new(
            Box::new(StaticJwksSource::new(JwkSet { keys: vec![] })),
            &config,
        );
        IdentityVerifier::new(store, &config)
    }

    #[tokio::test]
    async fn rejects_garbage_token() {
        assert!(verifier().verify("not-a-jwt").await.is_err());
    }

    #[tokio::test]
    async fn rejects_non_rs256_token() {
        // HS256-signed token; the verifier only accepts RS256.
        let token = jsonwebtoken::encode(
            &jsonwebtoken::Header::default(),
            &serde_json::json!({"sub": "x", "iss": "i", "aud": "a", "exp": 4102444800i64}),
            &jsonwebtoken::EncodingKey::from_secret(b"secret"),
        )
        .unwrap();
        match verifier().verify(&token).await {
            Err(AuthError::BadAlgorithm) => {}
            other => panic!("expected BadAlgorithm, got {:?}", other.map(|_| ())),
        }
    }
}
