use anyhow::Context;
use sqlx::{postgres::PgPoolOptions, PgPool};

/// Build the connection pool up front; the store receives it whole instead
/// of opening connections lazily.
pub async fn connect(database_url: &str) -> anyhow::Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await
        .context("connect to database")
}

/// Bring the schema up to date. With `reset` set, existing tables are
/// dropped first — a destructive bootstrap that only runs on explicit
/// opt-in (`RESET_SCHEMA=1`).
pub async fn prepare(pool: &PgPool, reset: bool) -> anyhow::Result<()> {
    if reset {
        tracing::warn!("RESET_SCHEMA set, dropping existing schema");
        sqlx::query("DROP TABLE IF EXISTS users")
            .execute(pool)
            .await
            .context("drop users table")?;
        sqlx::query("DROP TABLE IF EXISTS _sqlx_migrations")
            .execute(pool)
            .await
            .context("drop migrations ledger")?;
    }
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("run migrations")?;
    Ok(())
}
