pub mod models;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::config::DatabaseConfig;

/// Connect eagerly and (optionally) run embedded migrations. Used by the
/// server binary; tests construct a lazy pool themselves.
pub async fn connect(config: &DatabaseConfig) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.url)
        .await?;

    if config.run_migrations {
        sqlx::migrate!("./migrations").run(&pool).await?;
        tracing::info!("database migrations up to date");
    }

    Ok(pool)
}

/// Lazy pool for contexts where the database may be absent (auth/CORS tests).
pub fn connect_lazy(url: &str) -> anyhow::Result<PgPool> {
    Ok(PgPoolOptions::new().max_connections(5).connect_lazy(url)?)
}
