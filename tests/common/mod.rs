pub mod keys;

use anyhow::{Context, Result};
use chrono::Utc;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde_json::json;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tokio::sync::OnceCell;
use uuid::Uuid;

use coursebook_api::auth::keys::{Jwk, JwkSet, StaticJwksSource};
use coursebook_api::auth::{IdentityVerifier, KeyStore};
use coursebook_api::config::{AppConfig, AuthConfig, CorsConfig, DatabaseConfig};
use coursebook_api::state::AppState;
use coursebook_api::{database, routes};

pub const TEST_ISSUER: &str = "https://id.test.local/";
pub const TEST_AUDIENCE: &str = "coursebook-test";
pub const ALLOWED_ORIGIN: &str = "http://allowed.test";

pub struct TestServer {
    pub base_url: String,
    /// Set when TEST_DATABASE_URL (or DATABASE_URL) points at a usable
    /// database; store-backed suites skip otherwise.
    pub pool: Option<PgPool>,
}

static SERVER: OnceCell<TestServer> = OnceCell::const_new();

/// In-process server with a static JWKS; shared by all tests in one binary.
///
/// The server runs on its own thread with its own runtime. Every
/// `#[tokio::test]` gets a fresh runtime that is dropped when the test
/// returns; a server task spawned on the first test's runtime would be
/// aborted with it and leave the rest of the binary with a dead port.
pub async fn ensure_server() -> &'static TestServer {
    SERVER
        .get_or_init(|| async {
            let (tx, rx) = tokio::sync::oneshot::channel();
            std::thread::spawn(move || {
                let rt = tokio::runtime::Runtime::new().expect("server runtime");
                rt.block_on(async move {
                    match build().await {
                        Ok((server, listener, app)) => {
                            tx.send(Ok(server)).ok();
                            axum::serve(listener, app).await.expect("server");
                        }
                        Err(e) => {
                            tx.send(Err(e)).ok();
                        }
                    }
                });
            });
            rx.await
                .expect("server thread died during startup")
                .expect("failed to start test server")
        })
        .await
}

/// Like `ensure_server`, but only when a test database is configured.
pub async fn ensure_db_server() -> Option<&'static TestServer> {
    let server = ensure_server().await;
    if server.pool.is_some() {
        Some(server)
    } else {
        eprintln!("skipping: set TEST_DATABASE_URL to run store-backed tests");
        None
    }
}

async fn build() -> Result<(TestServer, tokio::net::TcpListener, axum::Router)> {
    let db_url = std::env::var("TEST_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
        .ok();

    // Without a database the pool is lazy and never connects; the auth and
    // CORS batteries run fine against it.
    let (url, db_available) = match db_url {
        Some(url) => (url, true),
        None => (
            "postgres://postgres@127.0.0.1:9/coursebook_unreachable".to_string(),
            false,
        ),
    };

    let pool = database::connect_lazy(&url)?;
    if db_available {
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("running migrations on test database")?;
    }

    let config = AppConfig {
        port: 0,
        database: DatabaseConfig {
            url: url.clone(),
            max_connections: 5,
            run_migrations: false,
        },
        auth: AuthConfig {
            issuer: TEST_ISSUER.into(),
            audience: TEST_AUDIENCE.into(),
            jwks_url: format!("{}.well-known/jwks.json", TEST_ISSUER),
            jwks_max_age_secs: 3600,
            jwks_refresh_cooldown_secs: 30,
        },
        cors: CorsConfig {
            allowed_origins: vec![ALLOWED_ORIGIN.into()],
        },
    };

    let jwks = JwkSet {
        keys: vec![Jwk {
            kty: "RSA".into(),
            kid: keys::PRIMARY_KID.into(),
            n: keys::PRIMARY_N.into(),
            e: keys::PRIMARY_E.into(),
        }],
    };
    let store = KeyStore::new(Box::new(StaticJwksSource::new(jwks)), &config.auth);
    let verifier = IdentityVerifier::new(store, &config.auth);

    let state = AppState::new(config, pool.clone(), verifier);
    let app = routes::app(state);

    let port = portpicker::pick_unused_port().context("failed to pick free port")?;
    let listener = tokio::net::TcpListener::bind(("127.0.0.1", port)).await?;
    let base_url = format!("http://127.0.0.1:{}", port);

    Ok((
        TestServer {
            base_url,
            pool: db_available.then_some(pool),
        },
        listener,
        app,
    ))
}

// ---------------------------------------------------------------------------
// Token minting
// ---------------------------------------------------------------------------

fn sign(claims: serde_json::Value, kid: &str, pem: &str) -> String {
    let mut header = Header::new(Algorithm::RS256);
    header.kid = Some(kid.to_string());
    let key = EncodingKey::from_rsa_pem(pem.as_bytes()).expect("test key");
    jsonwebtoken::encode(&header, &claims, &key).expect("sign test token")
}

fn base_claims(sub: &str) -> serde_json::Value {
    json!({
        "sub": sub,
        "iss": TEST_ISSUER,
        "aud": TEST_AUDIENCE,
        "exp": (Utc::now().timestamp() + 3600),
        "iat": Utc::now().timestamp(),
        "name": format!("User {}", &sub[sub.len().saturating_sub(6)..]),
        "email": format!("{}@test.local", sub.replace('|', "-")),
    })
}

/// A valid token for the given external subject id.
pub fn token(sub: &str) -> String {
    sign(base_claims(sub), keys::PRIMARY_KID, keys::PRIMARY_PEM)
}

pub fn expired_token(sub: &str) -> String {
    let mut claims = base_claims(sub);
    claims["exp"] = json!(Utc::now().timestamp() - 7200);
    sign(claims, keys::PRIMARY_KID, keys::PRIMARY_PEM)
}

pub fn wrong_issuer_token(sub: &str) -> String {
    let mut claims = base_claims(sub);
    claims["iss"] = json!("https://evil.test.local/");
    sign(claims, keys::PRIMARY_KID, keys::PRIMARY_PEM)
}

pub fn wrong_audience_token(sub: &str) -> String {
    let mut claims = base_claims(sub);
    claims["aud"] = json!("some-other-api");
    sign(claims, keys::PRIMARY_KID, keys::PRIMARY_PEM)
}

/// Well-formed claims signed by a key the JWKS does not publish.
pub fn bad_signature_token(sub: &str) -> String {
    sign(base_claims(sub), keys::PRIMARY_KID, keys::SECONDARY_PEM)
}

pub fn unknown_kid_token(sub: &str) -> String {
    sign(base_claims(sub), "rotated-away", keys::PRIMARY_PEM)
}

pub fn unique_sub() -> String {
    format!("auth0|{}", Uuid::new_v4().simple())
}

// ---------------------------------------------------------------------------
// Store seeding (only used by db-backed suites; courses have no write
// endpoint in the contract, so tests insert them directly)
// ---------------------------------------------------------------------------

pub async fn seed_user(pool: &PgPool, name: &str) -> Result<Uuid> {
    let id = sqlx::query_scalar::<_, Uuid>(
        "INSERT INTO users (external_id, display_name, email) \
         VALUES ($1, $2, $3) RETURNING id",
    )
    .bind(format!("seed|{}", Uuid::new_v4().simple()))
    .bind(name)
    .bind(format!("{}@test.local", Uuid::new_v4().simple()))
    .fetch_one(pool)
    .await?;
    Ok(id)
}

pub async fn seed_course(pool: &PgPool, title: &str) -> Result<Uuid> {
    let creator = seed_user(pool, "Course Creator").await?;
    let id = sqlx::query_scalar::<_, Uuid>(
        "INSERT INTO courses (code, title, semester, created_by_id) \
         VALUES ($1, $2, $3, $4) RETURNING id",
    )
    .bind(format!("CS-{}", &Uuid::new_v4().simple().to_string()[..8]))
    .bind(title)
    .bind("2025-FALL")
    .bind(creator)
    .fetch_one(pool)
    .await?;
    Ok(id)
}
