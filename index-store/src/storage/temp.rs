//! SQLite overflow store for spilled update batches.

use super::schema;
use super::TempRepository;
use crate::error::{StorageError, StorageResult};
use async_trait::async_trait;
use index_types::TempKey;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// SQLite-backed [`TempRepository`].
///
/// Entries are kept in insertion order so a restarted node can replay them
/// oldest first.
#[derive(Debug, Clone)]
pub struct SqliteTempRepository {
    pool: SqlitePool,
}

impl SqliteTempRepository {
    /// Open (or create) an overflow database file.
    pub async fn open(path: &Path) -> StorageResult<Self> {
        if path.as_os_str().is_empty() {
            return Err(StorageError::InvalidPath {
                path: path.to_path_buf(),
            });
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(2)
            .connect_with(options)
            .await
            .map_err(StorageError::Database)?;

        schema::migrate_temp(&pool).await?;
        Ok(Self { pool })
    }

    /// Create an in-memory overflow store (for testing).
    pub async fn in_memory() -> StorageResult<Self> {
        let options = SqliteConnectOptions::from_str(":memory:").map_err(StorageError::Database)?;

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(StorageError::Database)?;

        schema::migrate_temp(&pool).await?;
        Ok(Self { pool })
    }

    /// Number of stored entries.
    pub async fn len(&self) -> StorageResult<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM temp_data")
            .fetch_one(&self.pool)
            .await
            .map_err(StorageError::Database)?;
        Ok(count as u64)
    }

    /// Check if the store holds no entries.
    pub async fn is_empty(&self) -> StorageResult<bool> {
        Ok(self.len().await? == 0)
    }

    /// Close all connections.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl TempRepository for SqliteTempRepository {
    async fn push(&self, data: &[u8]) -> StorageResult<TempKey> {
        let key = TempKey::new();

        sqlx::query("INSERT INTO temp_data (key, data) VALUES (?1, ?2)")
            .bind(key.as_bytes())
            .bind(data)
            .execute(&self.pool)
            .await
            .map_err(StorageError::Database)?;

        tracing::trace!("Stored {} bytes under {}", data.len(), key);
        Ok(key)
    }

    async fn peek(&self, key: &TempKey) -> StorageResult<Option<Vec<u8>>> {
        sqlx::query_scalar("SELECT data FROM temp_data WHERE key = ?1")
            .bind(key.as_bytes())
            .fetch_optional(&self.pool)
            .await
            .map_err(StorageError::Database)
    }

    async fn pop(&self, key: &TempKey) -> StorageResult<Option<Vec<u8>>> {
        let data: Option<Vec<u8>> =
            sqlx::query_scalar("DELETE FROM temp_data WHERE key = ?1 RETURNING data")
                .bind(key.as_bytes())
                .fetch_optional(&self.pool)
                .await
                .map_err(StorageError::Database)?;

        Ok(data)
    }

    async fn keys(&self) -> StorageResult<Vec<TempKey>> {
        let raw: Vec<Vec<u8>> = sqlx::query_scalar("SELECT key FROM temp_data ORDER BY seq")
            .fetch_all(&self.pool)
            .await
            .map_err(StorageError::Database)?;

        raw.iter()
            .map(|bytes| {
                TempKey::from_bytes(bytes)
                    .ok_or_else(|| StorageError::constraint("malformed temp_data key"))
            })
            .collect()
    }
}
