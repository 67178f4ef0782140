use anyhow::{Context, Result};
use async_trait::async_trait;
use log::{debug, info};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use super::traits::KeyValueStorage;

/// Connections kept open to the counter database. The counter has a single
/// writer; extra connections only serve concurrent reads.
const MAX_CONNECTIONS: u32 = 4;

/// SQLite-backed store for the counter's string values.
///
/// Every value lives in one `key_values` row keyed by its storage key, so
/// settings and the ledger are replaced atomically, one key at a time.
#[derive(Clone)]
pub struct DbConnection {
    pool: Arc<SqlitePool>,
}

impl DbConnection {
    /// Open (creating if needed) the database at `url` and ensure the schema
    pub async fn new(url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .with_context(|| format!("Invalid database URL '{}'", url))?
            .create_if_missing(true)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to open counter database '{}'", url))?;
        Self::setup_schema(&pool).await?;

        info!("Opened counter database at {}", url);
        Ok(Self { pool: Arc::new(pool) })
    }

    /// Initialize a test database with a unique name
    #[cfg(test)]
    pub async fn init_test() -> Result<Self> {
        let test_id = uuid::Uuid::new_v4().simple().to_string();
        Self::new(&format!("file:counter_{}?mode=memory&cache=shared", test_id)).await
    }

    async fn setup_schema(pool: &SqlitePool) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS key_values (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            "#,
        )
        .execute(pool)
        .await?;

        Ok(())
    }

    /// Upsert the value stored under `key`
    pub async fn put_value(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO key_values (key, value) VALUES (?, ?) \
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        )
        .bind(key)
        .bind(value)
        .execute(&*self.pool)
        .await
        .with_context(|| format!("Failed to store '{}'", key))?;

        debug!("Stored {} bytes under '{}'", value.len(), key);
        Ok(())
    }

    pub async fn get_value(&self, key: &str) -> Result<Option<String>> {
        let value = sqlx::query_scalar::<_, String>("SELECT value FROM key_values WHERE key = ?")
            .bind(key)
            .fetch_optional(&*self.pool)
            .await
            .with_context(|| format!("Failed to read '{}'", key))?;

        Ok(value)
    }

    /// Remove `key`; `false` when nothing was stored
    pub async fn delete_value(&self, key: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM key_values WHERE key = ?")
            .bind(key)
            .execute(&*self.pool)
            .await
            .with_context(|| format!("Failed to delete '{}'", key))?;

        Ok(result.rows_affected() > 0)
    }

    /// Close the pool so the database file can be reopened or removed
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl KeyValueStorage for DbConnection {
    async fn get_value(&self, key: &str) -> Result<Option<String>> {
        DbConnection::get_value(self, key).await
    }

    async fn put_value(&self, key: &str, value: &str) -> Result<()> {
        DbConnection::put_value(self, key, value).await
    }

    async fn delete_value(&self, key: &str) -> Result<bool> {
        DbConnection::delete_value(self, key).await
    }
}
