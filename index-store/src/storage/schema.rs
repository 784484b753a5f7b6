//! Table definitions.

use crate::error::StorageError;
use index_types::IndexId;
use sqlx::{Sqlite, SqliteConnection, SqlitePool};

const INDEX_TABLES: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS index_sequence (
        index_id INTEGER NOT NULL PRIMARY KEY,
        current_sequence INTEGER NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS folder_index_info (
        folder TEXT NOT NULL,
        device_id TEXT NOT NULL,
        index_id INTEGER NOT NULL,
        local_sequence INTEGER NOT NULL,
        max_sequence INTEGER NOT NULL,
        PRIMARY KEY (folder, device_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS file_info (
        folder TEXT NOT NULL,
        path TEXT NOT NULL,
        file_name TEXT NOT NULL,
        search_name TEXT NOT NULL,
        parent TEXT NOT NULL,
        size INTEGER,
        hash TEXT,
        last_modified INTEGER NOT NULL,
        file_type TEXT NOT NULL,
        version_id INTEGER NOT NULL,
        version_value INTEGER NOT NULL,
        is_deleted INTEGER NOT NULL,
        PRIMARY KEY (folder, path)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS file_blocks (
        folder TEXT NOT NULL,
        path TEXT NOT NULL,
        hash TEXT NOT NULL,
        size INTEGER NOT NULL,
        blocks BLOB NOT NULL,
        PRIMARY KEY (folder, path)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS folder_stats (
        folder TEXT NOT NULL PRIMARY KEY,
        file_count INTEGER NOT NULL,
        dir_count INTEGER NOT NULL,
        size INTEGER NOT NULL,
        last_update INTEGER NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_file_info_parent ON file_info(folder, parent)",
    "CREATE INDEX IF NOT EXISTS idx_file_info_name ON file_info(search_name)",
];

/// Tables wiped by a full index reset.
pub(crate) const RESETTABLE_TABLES: &[&str] = &[
    "index_sequence",
    "folder_index_info",
    "file_info",
    "file_blocks",
    "folder_stats",
];

/// Create index tables and seed the sequence row if missing.
pub(crate) async fn migrate_index(pool: &SqlitePool) -> Result<(), StorageError> {
    for statement in INDEX_TABLES {
        sqlx::query(statement)
            .execute(pool)
            .await
            .map_err(StorageError::Database)?;
    }

    let mut conn = pool.acquire().await.map_err(StorageError::Database)?;
    seed_sequence(&mut conn, IndexId::random()).await
}

/// Insert the sequence row for `index_id` unless one exists.
pub(crate) async fn seed_sequence(
    conn: &mut SqliteConnection,
    index_id: IndexId,
) -> Result<(), StorageError> {
    sqlx::query::<Sqlite>(
        r#"
        INSERT INTO index_sequence (index_id, current_sequence)
        SELECT ?1, 0
        WHERE NOT EXISTS (SELECT 1 FROM index_sequence)
        "#,
    )
    .bind(index_id.value() as i64)
    .execute(&mut *conn)
    .await
    .map_err(StorageError::Database)?;

    Ok(())
}

/// Create the overflow table.
pub(crate) async fn migrate_temp(pool: &SqlitePool) -> Result<(), StorageError> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS temp_data (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            key BLOB NOT NULL UNIQUE,
            data BLOB NOT NULL,
            created_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(StorageError::Database)?;

    Ok(())
}
