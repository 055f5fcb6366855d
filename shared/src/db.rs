//! Database connection management.

use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::info;

use crate::secrets::{get_database_credentials, DatabaseCredentials};
use crate::{Config, Error, Result};

/// Create a database connection pool.
pub async fn create_pool(config: &Config, credentials: &DatabaseCredentials) -> Result<PgPool> {
    let database_url = credentials.database_url(&config.db_host, &config.db_name);

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .acquire_timeout(Duration::from_secs(3))
        .connect(&database_url)
        .await
        .map_err(Error::Database)?;

    Ok(pool)
}

/// Load config from the environment, fetch credentials and open a pool.
///
/// Called once per cold start by every database-backed Lambda.
pub async fn connect_from_env() -> Result<(Config, PgPool)> {
    let config = Config::from_env()?;
    let aws_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
    let secrets_client = aws_sdk_secretsmanager::Client::new(&aws_config);

    let credentials = get_database_credentials(&secrets_client, &config.db_secret_arn).await?;
    let pool = create_pool(&config, &credentials).await?;

    info!(db_host = %config.db_host, db_name = %config.db_name, "Database pool ready");
    Ok((config, pool))
}
