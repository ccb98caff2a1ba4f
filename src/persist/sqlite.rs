use async_trait::async_trait;
use chrono::Utc;
use sqlx::migrate::Migrator;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use tracing::info;

use super::KeyValueStore;
use crate::config::CacheConfig;
use crate::error::{PersistError, PersistResult};

/// Static migrator that embeds migrations at compile time
static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// SQLite-backed key-value store for snapshots
#[derive(Clone)]
pub struct SqliteKv {
    pool: SqlitePool,
}

impl SqliteKv {
    /// Open (or create) the cache database
    pub async fn new(config: &CacheConfig) -> PersistResult<Self> {
        // Ensure parent directory exists
        if let Some(parent) = config.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| PersistError::Connection {
                message: format!("Failed to create cache directory: {}", e),
            })?;
        }

        let database_url = format!("sqlite://{}?mode=rwc", config.path.display());

        let options = SqliteConnectOptions::from_str(&database_url)
            .map_err(|e| PersistError::Connection {
                message: format!("Invalid cache URL: {}", e),
            })?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await
            .map_err(|e| PersistError::Connection {
                message: format!("Failed to open cache: {}", e),
            })?;

        let kv = Self { pool };
        kv.run_migrations().await?;

        Ok(kv)
    }

    /// In-memory database; a single connection keeps one shared database
    pub async fn new_in_memory() -> PersistResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:").map_err(|e| {
            PersistError::Connection {
                message: format!("Invalid cache URL: {}", e),
            }
        })?;

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(|e| PersistError::Connection {
                message: format!("Failed to open cache: {}", e),
            })?;

        let kv = Self { pool };
        kv.run_migrations().await?;

        Ok(kv)
    }

    /// Run database migrations using embedded sqlx migrations
    async fn run_migrations(&self) -> PersistResult<()> {
        info!("Running cache migrations...");

        MIGRATOR
            .run(&self.pool)
            .await
            .map_err(|e| PersistError::Migration {
                message: format!("Failed to run migrations: {}", e),
            })?;

        info!("Cache migrations completed successfully");
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for SqliteKv {
    async fn get(&self, key: &str) -> PersistResult<Option<String>> {
        let value: Option<(String,)> = sqlx::query_as("SELECT value FROM kv_store WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        Ok(value.map(|(v,)| v))
    }

    async fn put(&self, key: &str, value: &str) -> PersistResult<()> {
        sqlx::query(
            r#"
            INSERT INTO kv_store (key, value, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn remove(&self, key: &str) -> PersistResult<()> {
        sqlx::query("DELETE FROM kv_store WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}
