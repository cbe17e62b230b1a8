use coursebook_api::auth::{HttpJwksSource, IdentityVerifier, KeyStore};
use coursebook_api::config::AppConfig;
use coursebook_api::state::AppState;
use coursebook_api::{database, routes};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present so cargo run picks up DATABASE_URL, AUTH_ISSUER, etc.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "coursebook_api=info,tower_http=info".into()),
        )
        .init();

    let config = AppConfig::from_env()?;
    let pool = database::connect(&config.database).await?;

    let keys = KeyStore::new(
        Box::new(HttpJwksSource::new(config.auth.jwks_url.as_str())),
        &config.auth,
    );
    let verifier = IdentityVerifier::new(keys, &config.auth);

    let port = config.port;
    let state = AppState::new(config, pool, verifier);
    let app = routes::app(state);

    let bind_addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("Coursebook API listening on http://{}", bind_addr);

    axum::serve(listener, app).await?;
    Ok(())
}
