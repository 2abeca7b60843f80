//! PostgreSQL pool
//!
//! Every `Db*Repository` holds a clone of [`DatabasePool`]. The schema under
//! `migrations/` is compiled into the binary and applied by `Store::connect`.

use mailcrm_common::config::DatabaseConfig;
use mailcrm_common::{Error, Result};
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::info;

const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(30);

/// Shared PostgreSQL connection pool
#[derive(Clone)]
pub struct DatabasePool {
    pool: PgPool,
}

impl DatabasePool {
    /// Open a pool sized by `max_connections`/`min_connections`
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let url = postgres_url(config)?;

        info!(
            max_connections = config.max_connections,
            "Opening PostgreSQL pool"
        );

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(ACQUIRE_TIMEOUT)
            .connect(&url)
            .await
            .map_err(|e| Error::Database(format!("Cannot reach PostgreSQL: {}", e)))?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Apply pending schema migrations
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| Error::Database(format!("Schema migration failed: {}", e)))?;

        info!("Schema is up to date");
        Ok(())
    }

    /// Round-trip a trivial query; used by the readiness endpoint
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| Error::Database(format!("PostgreSQL unreachable: {}", e)))?;
        Ok(())
    }
}

fn postgres_url(config: &DatabaseConfig) -> Result<String> {
    if config.backend != "postgres" {
        return Err(Error::Config(format!(
            "The '{}' backend does not use a connection pool",
            config.backend
        )));
    }
    config
        .url
        .clone()
        .ok_or_else(|| Error::Config("database.url is required for the postgres backend".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_postgres_url_requires_url_and_backend() {
        let mut config = DatabaseConfig {
            backend: "postgres".to_string(),
            ..Default::default()
        };
        assert!(matches!(postgres_url(&config), Err(Error::Config(_))));

        config.url = Some("postgres://localhost/mailcrm".to_string());
        assert_eq!(
            postgres_url(&config).unwrap(),
            "postgres://localhost/mailcrm"
        );

        config.backend = "memory".to_string();
        assert!(matches!(postgres_url(&config), Err(Error::Config(_))));
    }
}
