//! JWKS retrieval and caching.
//!
//! Key material changes rarely and an identity-provider outage must not
//! block every request, so decoded keys are cached process-wide. The cache
//! refetches when it exceeds `max_age`, and an unknown kid (key rotation)
//! triggers one refetch per cooldown window at most.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use jsonwebtoken::DecodingKey;
use serde::Deserialize;
use tokio::sync::RwLock;

use crate::auth::AuthError;
use crate::config::AuthConfig;

#[derive(Debug, Clone, Deserialize)]
pub struct Jwk {
    pub kty: String,
    pub kid: String,
    #[serde(default)]
    pub n: String,
    #[serde(default)]
    pub e: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JwkSet {
    pub keys: Vec<Jwk>,
}

/// Where key material comes from. The HTTP fetcher is the production
/// implementation; tests inject a static set.
#[async_trait]
pub trait JwksSource: Send + Sync {
    async fn fetch(&self) -> Result<JwkSet, AuthError>;
}

pub struct HttpJwksSource {
    client: reqwest::Client,
    url: String,
}

impl HttpJwksSource {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }
}

#[async_trait]
impl JwksSource for HttpJwksSource {
    async fn fetch(&self) -> Result<JwkSet, AuthError> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| AuthError::KeyFetch(e.to_string()))?
            .error_for_status()
            .map_err(|e| AuthError::KeyFetch(e.to_string()))?;
        response
            .json::<JwkSet>()
            .await
            .map_err(|e| AuthError::KeyFetch(e.to_string()))
    }
}

/// Fixed key material, for tests and local development.
pub struct StaticJwksSource {
    keys: JwkSet,
}

impl StaticJwksSource {
    pub fn new(keys: JwkSet) -> Self {
        Self { keys }
    }
}

#[async_trait]
impl JwksSource for StaticJwksSource {
    async fn fetch(&self) -> Result<JwkSet, AuthError> {
        Ok(self.keys.clone())
    }
}

struct CacheState {
    keys: HashMap<String, DecodingKey>,
    fetched_at: Option<Instant>,
    last_miss_refresh: Option<Instant>,
}

pub struct KeyStore {
    source: Box<dyn JwksSource>,
    max_age: Duration,
    refresh_cooldown: Duration,
    state: RwLock<CacheState>,
}

impl KeyStore {
    pub fn new(source: Box<dyn JwksSource>, config: &AuthConfig) -> Self {
        Self {
            source,
            max_age: Duration::from_secs(config.jwks_max_age_secs),
            refresh_cooldown: Duration::from_secs(config.jwks_refresh_cooldown_secs),
            state: RwLock::new(CacheState {
                keys: HashMap::new(),
                fetched_at: None,
                last_miss_refresh: None,
            }),
        }
    }

    /// Resolve the decoding key for a kid, refetching when the cache is
    /// stale or the kid is unknown (subject to the cooldown).
    pub async fn key_for(&self, kid: &str) -> Result<DecodingKey, AuthError> {
        {
            let state = self.state.read().await;
            if !self.is_stale(&state) {
                if let Some(key) = state.keys.get(kid) {
                    return Ok(key.clone());
                }
            }
        }

        let mut state = self.state.write().await;
        // Another task may have refreshed while we waited for the lock.
        if let Some(key) = state.keys.get(kid) {
            if !self.is_stale(&state) {
                return Ok(key.clone());
            }
        }

        let stale = self.is_stale(&state);
        let cooldown_over = state
            .last_miss_refresh
            .map(|t| t.elapsed() >= self.refresh_cooldown)
            .unwrap_or(true);

        if stale || cooldown_over {
            self.refresh(&mut state).await?;
            if !stale {
                state.last_miss_refresh = Some(Instant::now());
            }
        }

        state
            .keys
            .get(kid)
            .cloned()
            .ok_or_else(|| AuthError::UnknownKey(kid.to_string()))
    }

    fn is_stale(&self, state: &CacheState) -> bool {
        match state.fetched_at {
            Some(t) => t.elapsed() >= self.max_age,
            None => true,
        }
    }

    async fn refresh(&self, state: &mut CacheState) -> Result<(), AuthError> {
        let set = self.source.fetch().await?;
        let mut keys = HashMap::new();
        for jwk in &set.keys {
            if jwk.kty != "RSA" {
                continue;
            }
            match DecodingKey::from_rsa_components(&jwk.n, &jwk.e) {
                Ok(key) => {
                    keys.insert(jwk.kid.clone(), key);
                }
                Err(e) => {
                    tracing::warn!("skipping malformed jwk {}: {}", jwk.kid, e);
                }
            }
        }
        tracing::debug!("jwks refreshed, {} usable keys", keys.len());
        state.keys = keys;
        state.fetched_at = Some(Instant::now());
        Ok(())
    }
}
