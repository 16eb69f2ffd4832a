use std::time::Duration;

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

use crate::config::AppConfig;

/// Create the PostgreSQL pool shared by the queue, device and loan stores.
///
/// Sized by `DB_MAX_CONNECTIONS`; acquisition gives up after
/// `DB_ACQUIRE_TIMEOUT_SECS` so a database outage surfaces as a store error
/// and the cycle is skipped instead of hanging.
pub async fn create_pool(config: &AppConfig) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .acquire_timeout(Duration::from_secs(config.db_acquire_timeout_secs))
        .connect(&config.database_url)
        .await?;

    tracing::info!(
        max_connections = config.db_max_connections,
        acquire_timeout_secs = config.db_acquire_timeout_secs,
        "Connected to PostgreSQL"
    );
    Ok(pool)
}
