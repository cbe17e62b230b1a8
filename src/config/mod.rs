use std::env;

use url::Url;

/// Application configuration, loaded once in `main` and injected everywhere
/// through `AppState`. No ambient/global access.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub cors: CorsConfig,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub run_migrations: bool,
}

#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Expected `iss` claim, e.g. `https://id.example.com/`.
    pub issuer: String,
    /// Expected `aud` claim.
    pub audience: String,
    /// JWKS endpoint; derived from the issuer when not set explicitly.
    pub jwks_url: String,
    /// Cached key material older than this is refetched.
    pub jwks_max_age_secs: u64,
    /// Minimum interval between refetches triggered by an unknown kid.
    pub jwks_refresh_cooldown_secs: u64,
}

#[derive(Debug, Clone)]
pub struct CorsConfig {
    /// Explicit origin allow-list; no wildcard support.
    pub allowed_origins: Vec<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    MissingVar(&'static str),
    #[error("invalid value for {var}: {reason}")]
    Invalid { var: &'static str, reason: String },
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let port = match env::var("PORT") {
            Ok(v) => v.parse::<u16>().map_err(|e| ConfigError::Invalid {
                var: "PORT",
                reason: e.to_string(),
            })?,
            Err(_) => 3000,
        };

        let database_url =
            env::var("DATABASE_URL").map_err(|_| ConfigError::MissingVar("DATABASE_URL"))?;

        let issuer = env::var("AUTH_ISSUER").map_err(|_| ConfigError::MissingVar("AUTH_ISSUER"))?;
        let audience =
            env::var("AUTH_AUDIENCE").map_err(|_| ConfigError::MissingVar("AUTH_AUDIENCE"))?;
        let jwks_url = match env::var("AUTH_JWKS_URL") {
            Ok(v) => v,
            Err(_) => default_jwks_url(&issuer)?,
        };

        let allowed_origins = env::var("CORS_ORIGINS")
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect();

        Ok(Self {
            port,
            database: DatabaseConfig {
                url: database_url,
                max_connections: env_parse("DATABASE_MAX_CONNECTIONS", 10),
                run_migrations: env_parse("DATABASE_RUN_MIGRATIONS", true),
            },
            auth: AuthConfig {
                issuer,
                audience,
                jwks_url,
                jwks_max_age_secs: env_parse("AUTH_JWKS_MAX_AGE_SECS", 3600),
                jwks_refresh_cooldown_secs: env_parse("AUTH_JWKS_REFRESH_COOLDOWN_SECS", 30),
            },
            cors: CorsConfig { allowed_origins },
        })
    }
}

/// Standard JWKS location relative to the issuer.
fn default_jwks_url(issuer: &str) -> Result<String, ConfigError> {
    let base = Url::parse(issuer).map_err(|e| ConfigError::Invalid {
        var: "AUTH_ISSUER",
        reason: e.to_string(),
    })?;
    let joined = base
        .join(".well-known/jwks.json")
        .map_err(|e| ConfigError::Invalid {
            var: "AUTH_ISSUER",
            reason: e.to_string(),
        })?;
    Ok(joined.to_string())
}

fn env_parse<T: std::str::FromStr + Copy>(var: &str, default: T) -> T {
    env::var(var)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jwks_url_derived_from_issuer() {
        let url = default_jwks_url("https://id.example.com/").unwrap();
        assert_eq!(url, "https://id.example.com/.well-known/jwks.json");
    }

    #[test]
    fn jwks_url_rejects_garbage_issuer() {
        assert!(default_jwks_url("not a url").is_err());
    }
}
