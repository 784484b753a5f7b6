//! SQLite index repository.

use super::rows::{encode_blocks, FileBlocksRow, FileInfoRow, FolderStatsRow, IndexInfoRow};
use super::schema::{self, RESETTABLE_TABLES};
use super::Sequencer;
use crate::error::{StorageError, StorageResult};
use crate::events::{FolderStatsUpdated, StatsPublisher};
use async_trait::async_trait;
use index_core::{check_blocks, StatsDelta};
use index_types::{DeviceId, FileBlocks, FileInfo, FolderStats, IndexId, IndexInfo, Version};
use regex::RegexBuilder;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::{Sqlite, SqliteConnection, Transaction};
use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tokio::sync::broadcast;

/// SQLite-based index repository.
///
/// Uses WAL mode for concurrent reads while the applier writes. All access
/// goes through [`IndexTransaction`]s obtained from [`begin`](Self::begin).
#[derive(Clone)]
pub struct SqliteIndexRepository {
    pool: SqlitePool,
    stats: StatsPublisher,
}

impl std::fmt::Debug for SqliteIndexRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteIndexRepository")
            .field("connections", &self.pool.size())
            .field("stats_subscribers", &self.stats.subscriber_count())
            .finish()
    }
}

impl SqliteIndexRepository {
    /// Open (or create) an index database file.
    pub async fn open(path: &Path, max_connections: u32) -> StorageResult<Self> {
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
            .max_connections(max_connections.max(1))
            .connect_with(options)
            .await
            .map_err(StorageError::Database)?;

        Self::with_pool(pool).await
    }

    /// Create an in-memory index (for testing).
    pub async fn in_memory() -> StorageResult<Self> {
        let options = SqliteConnectOptions::from_str(":memory:").map_err(StorageError::Database)?;

        // A single connection that never expires: each connection to
        // ":memory:" is its own database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(StorageError::Database)?;

        Self::with_pool(pool).await
    }

    async fn with_pool(pool: SqlitePool) -> StorageResult<Self> {
        schema::migrate_index(&pool).await?;
        Ok(Self {
            pool,
            stats: StatsPublisher::new(),
        })
    }

    /// Start a transaction.
    ///
    /// Dropping the returned handle without calling
    /// [`IndexTransaction::commit`] rolls back every write made through it.
    pub async fn begin(&self) -> StorageResult<IndexTransaction> {
        let tx = self.pool.begin().await.map_err(StorageError::Database)?;
        Ok(IndexTransaction {
            tx,
            stats_updates: BTreeMap::new(),
            cleared: false,
            publisher: self.stats.clone(),
        })
    }

    /// Subscribe to folder stats changes of committed transactions.
    ///
    /// Drop the receiver to unsubscribe.
    pub fn subscribe_folder_stats(&self) -> broadcast::Receiver<FolderStatsUpdated> {
        self.stats.subscribe()
    }

    /// Close all connections.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// An open index transaction.
///
/// The handle is consumed by [`commit`](Self::commit) or
/// [`rollback`](Self::rollback), so it cannot be used after it is closed.
pub struct IndexTransaction {
    tx: Transaction<'static, Sqlite>,
    /// Latest stats per folder written in this transaction.
    stats_updates: BTreeMap<String, FolderStats>,
    /// Set by `clear_index`.
    cleared: bool,
    publisher: StatsPublisher,
}

impl std::fmt::Debug for IndexTransaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexTransaction")
            .field("changed_folders", &self.stats_updates.keys().collect::<Vec<_>>())
            .field("cleared", &self.cleared)
            .finish_non_exhaustive()
    }
}

impl IndexTransaction {
    fn conn(&mut self) -> &mut SqliteConnection {
        &mut self.tx
    }

    /// Commit and notify stats subscribers of every folder changed.
    pub async fn commit(self) -> StorageResult<()> {
        let Self {
            tx,
            stats_updates,
            cleared,
            publisher,
        } = self;

        tx.commit().await.map_err(StorageError::Database)?;

        if cleared || !stats_updates.is_empty() {
            publisher.publish(FolderStatsUpdated {
                index_cleared: cleared,
                stats: stats_updates.into_values().collect(),
            });
        }
        Ok(())
    }

    /// Discard every write made in this transaction.
    pub async fn rollback(self) -> StorageResult<()> {
        self.tx.rollback().await.map_err(StorageError::Database)
    }

    // --- Index info ---

    /// Get a peer's progress for a folder.
    pub async fn find_index_info(
        &mut self,
        device_id: &DeviceId,
        folder: &str,
    ) -> StorageResult<Option<IndexInfo>> {
        let row = sqlx::query_as::<_, IndexInfoRow>(
            r#"
            SELECT folder, device_id, index_id, local_sequence, max_sequence
            FROM folder_index_info
            WHERE device_id = ?1 AND folder = ?2
            "#,
        )
        .bind(device_id.as_str())
        .bind(folder)
        .fetch_optional(self.conn())
        .await
        .map_err(StorageError::Database)?;

        Ok(row.map(IndexInfo::from))
    }

    /// Get the progress of every peer for every folder.
    pub async fn find_all_index_infos(&mut self) -> StorageResult<Vec<IndexInfo>> {
        let rows = sqlx::query_as::<_, IndexInfoRow>(
            r#"
            SELECT folder, device_id, index_id, local_sequence, max_sequence
            FROM folder_index_info
            ORDER BY folder, device_id
            "#,
        )
        .fetch_all(self.conn())
        .await
        .map_err(StorageError::Database)?;

        Ok(rows.into_iter().map(IndexInfo::from).collect())
    }

    /// Insert or replace a peer's progress for a folder.
    pub async fn update_index_info(&mut self, info: &IndexInfo) -> StorageResult<()> {
        if info.local_sequence > info.max_sequence {
            return Err(StorageError::constraint(format!(
                "local_sequence {} exceeds max_sequence {} for {:?} in {}",
                info.local_sequence, info.max_sequence, info.device_id, info.folder
            )));
        }

        sqlx::query(
            r#"
            INSERT OR REPLACE INTO folder_index_info
                (folder, device_id, index_id, local_sequence, max_sequence)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(&info.folder)
        .bind(info.device_id.as_str())
        .bind(sql_int(info.index_id.value(), "index_id")?)
        .bind(sql_int(info.local_sequence, "local_sequence")?)
        .bind(sql_int(info.max_sequence, "max_sequence")?)
        .execute(self.conn())
        .await
        .map_err(StorageError::Database)?;

        Ok(())
    }

    // --- File info ---

    /// Get the record stored for a path.
    pub async fn find_file_info(
        &mut self,
        folder: &str,
        path: &str,
    ) -> StorageResult<Option<FileInfo>> {
        let row = sqlx::query_as::<_, FileInfoRow>(
            "SELECT * FROM file_info WHERE folder = ?1 AND path = ?2",
        )
        .bind(folder)
        .bind(path)
        .fetch_optional(self.conn())
        .await
        .map_err(StorageError::Database)?;

        row.map(FileInfo::try_from).transpose()
    }

    /// Get the modification time stored for a path.
    pub async fn find_file_info_last_modified(
        &mut self,
        folder: &str,
        path: &str,
    ) -> StorageResult<Option<i64>> {
        sqlx::query_scalar::<_, i64>(
            "SELECT last_modified FROM file_info WHERE folder = ?1 AND path = ?2",
        )
        .bind(folder)
        .bind(path)
        .fetch_optional(self.conn())
        .await
        .map_err(StorageError::Database)
    }

    /// Get the record stored for a path unless it marks a deletion.
    pub async fn find_not_deleted_file_info(
        &mut self,
        folder: &str,
        path: &str,
    ) -> StorageResult<Option<FileInfo>> {
        let row = sqlx::query_as::<_, FileInfoRow>(
            "SELECT * FROM file_info WHERE folder = ?1 AND path = ?2 AND is_deleted = 0",
        )
        .bind(folder)
        .bind(path)
        .fetch_optional(self.conn())
        .await
        .map_err(StorageError::Database)?;

        row.map(FileInfo::try_from).transpose()
    }

    /// List the live entries directly inside `parent` (`""` for the root).
    pub async fn find_not_deleted_files_by_folder_and_parent(
        &mut self,
        folder: &str,
        parent: &str,
    ) -> StorageResult<Vec<FileInfo>> {
        let rows = sqlx::query_as::<_, FileInfoRow>(
            r#"
            SELECT * FROM file_info
            WHERE folder = ?1 AND parent = ?2 AND is_deleted = 0
            ORDER BY path
            "#,
        )
        .bind(folder)
        .bind(parent)
        .fetch_all(self.conn())
        .await
        .map_err(StorageError::Database)?;

        rows.into_iter().map(FileInfo::try_from).collect()
    }

    /// Live entries whose file name contains `query`, case-insensitively.
    ///
    /// A blank query matches nothing.
    pub async fn find_file_info_by_search_term(
        &mut self,
        query: &str,
    ) -> StorageResult<Vec<FileInfo>> {
        let Some(pattern) = like_pattern(query) else {
            return Ok(Vec::new());
        };

        let rows = sqlx::query_as::<_, FileInfoRow>(
            r#"
            SELECT * FROM file_info
            WHERE search_name LIKE ?1 ESCAPE '\' AND is_deleted = 0
            ORDER BY folder, path
            "#,
        )
        .bind(pattern)
        .fetch_all(self.conn())
        .await
        .map_err(StorageError::Database)?;

        rows.into_iter().map(FileInfo::try_from).collect()
    }

    /// Count of [`find_file_info_by_search_term`](Self::find_file_info_by_search_term) results.
    pub async fn count_file_info_by_search_term(&mut self, query: &str) -> StorageResult<u64> {
        let Some(pattern) = like_pattern(query) else {
            return Ok(0);
        };

        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM file_info
            WHERE search_name LIKE ?1 ESCAPE '\' AND is_deleted = 0
            "#,
        )
        .bind(pattern)
        .fetch_one(self.conn())
        .await
        .map_err(StorageError::Database)?;

        Ok(count as u64)
    }

    /// Live entries whose file name matches a regular expression,
    /// case-insensitively.
    pub async fn find_file_info_by_pattern(&mut self, pattern: &str) -> StorageResult<Vec<FileInfo>> {
        let regex = RegexBuilder::new(pattern.trim())
            .case_insensitive(true)
            .build()?;

        let rows = sqlx::query_as::<_, FileInfoRow>(
            "SELECT * FROM file_info WHERE is_deleted = 0 ORDER BY folder, path",
        )
        .fetch_all(self.conn())
        .await
        .map_err(StorageError::Database)?;

        let mut matches = Vec::new();
        for row in rows {
            let info = FileInfo::try_from(row)?;
            if regex.is_match(info.file_name()) {
                matches.push(info);
            }
        }
        Ok(matches)
    }

    /// Store a file record (and its blocks) and update the folder stats.
    ///
    /// Returns the folder's stats after the change.
    ///
    /// # Errors
    ///
    /// - [`StorageError::InvalidBlocks`] if `blocks` does not match `info`
    /// - [`StorageError::ConstraintViolation`] if `info` is malformed or
    ///   the stored stats would go negative
    pub async fn update_file_info(
        &mut self,
        info: &FileInfo,
        blocks: Option<&FileBlocks>,
    ) -> StorageResult<FolderStats> {
        validate_file_info(info)?;

        match blocks {
            Some(blocks) => {
                check_blocks(info, blocks)?;
                self.write_file_blocks(blocks).await?;
            }
            None if info.deleted || info.is_directory() => {
                sqlx::query("DELETE FROM file_blocks WHERE folder = ?1 AND path = ?2")
                    .bind(&info.folder)
                    .bind(&info.path)
                    .execute(self.conn())
                    .await
                    .map_err(StorageError::Database)?;
            }
            None => {}
        }

        let old = self.find_file_info(&info.folder, &info.path).await?;
        let delta = StatsDelta::between(old.as_ref(), info)
            .map_err(|e| StorageError::constraint(e.to_string()))?;
        let version = info.current_version().unwrap_or(Version::new(0, 0));
        let size = info.size.map(|s| sql_int(s, "size")).transpose()?;

        sqlx::query(
            r#"
            INSERT OR REPLACE INTO file_info
                (folder, path, file_name, search_name, parent, size, hash,
                 last_modified, file_type, version_id, version_value, is_deleted)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            "#,
        )
        .bind(&info.folder)
        .bind(&info.path)
        .bind(info.file_name())
        .bind(info.file_name().to_lowercase())
        .bind(info.parent())
        .bind(size)
        .bind(info.hash.as_deref())
        .bind(info.last_modified)
        .bind(info.file_type.as_str())
        .bind(sql_int(version.id, "version_id")?)
        .bind(sql_int(version.value, "version_value")?)
        .bind(info.deleted)
        .execute(self.conn())
        .await
        .map_err(StorageError::Database)?;

        let current = self.find_folder_stats(&info.folder).await?;
        let stats = delta
            .apply(&info.folder, current.as_ref(), info.last_modified)
            .map_err(|e| StorageError::constraint(e.to_string()))?;

        self.write_folder_stats(&stats).await?;
        self.stats_updates.insert(stats.folder.clone(), stats.clone());

        Ok(stats)
    }

    // --- File blocks ---

    /// Get the block list stored for a path.
    pub async fn find_file_blocks(
        &mut self,
        folder: &str,
        path: &str,
    ) -> StorageResult<Option<FileBlocks>> {
        let row = sqlx::query_as::<_, FileBlocksRow>(
            "SELECT folder, path, hash, size, blocks FROM file_blocks WHERE folder = ?1 AND path = ?2",
        )
        .bind(folder)
        .bind(path)
        .fetch_optional(self.conn())
        .await
        .map_err(StorageError::Database)?;

        row.map(FileBlocks::try_from).transpose()
    }

    async fn write_file_blocks(&mut self, blocks: &FileBlocks) -> StorageResult<()> {
        let encoded = encode_blocks(&blocks.blocks)?;

        sqlx::query(
            r#"
            INSERT OR REPLACE INTO file_blocks (folder, path, hash, size, blocks)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(&blocks.folder)
        .bind(&blocks.path)
        .bind(&blocks.hash)
        .bind(sql_int(blocks.size, "size")?)
        .bind(encoded)
        .execute(self.conn())
        .await
        .map_err(StorageError::Database)?;

        Ok(())
    }

    // --- Folder stats ---

    /// Get the stats row of a folder.
    pub async fn find_folder_stats(&mut self, folder: &str) -> StorageResult<Option<FolderStats>> {
        let row = sqlx::query_as::<_, FolderStatsRow>(
            r#"
            SELECT folder, file_count, dir_count, size, last_update
            FROM folder_stats
            WHERE folder = ?1
            "#,
        )
        .bind(folder)
        .fetch_optional(self.conn())
        .await
        .map_err(StorageError::Database)?;

        Ok(row.map(FolderStats::from))
    }

    /// Get the stats rows of all folders.
    pub async fn find_all_folder_stats(&mut self) -> StorageResult<Vec<FolderStats>> {
        let rows = sqlx::query_as::<_, FolderStatsRow>(
            r#"
            SELECT folder, file_count, dir_count, size, last_update
            FROM folder_stats
            ORDER BY folder
            "#,
        )
        .fetch_all(self.conn())
        .await
        .map_err(StorageError::Database)?;

        Ok(rows.into_iter().map(FolderStats::from).collect())
    }

    async fn write_folder_stats(&mut self, stats: &FolderStats) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO folder_stats (folder, file_count, dir_count, size, last_update)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(&stats.folder)
        .bind(sql_int(stats.file_count, "file_count")?)
        .bind(sql_int(stats.dir_count, "dir_count")?)
        .bind(sql_int(stats.size, "size")?)
        .bind(stats.last_update)
        .execute(self.conn())
        .await
        .map_err(StorageError::Database)?;

        Ok(())
    }

    // --- Reset ---

    /// Delete every index row and start a new local index generation.
    ///
    /// Subscribers are told that the index was cleared and that every
    /// previously known folder is now empty.
    pub async fn clear_index(&mut self) -> StorageResult<()> {
        let previous = self.find_all_folder_stats().await?;

        for table in RESETTABLE_TABLES {
            let statement = format!("DELETE FROM {}", table);
            sqlx::query(&statement)
                .execute(self.conn())
                .await
                .map_err(StorageError::Database)?;
        }

        let index_id = IndexId::random();
        schema::seed_sequence(self.conn(), index_id).await?;
        tracing::info!("Index cleared, new index generation {}", index_id);

        self.cleared = true;
        self.stats_updates.clear();
        for stats in previous {
            self.stats_updates
                .insert(stats.folder.clone(), FolderStats::empty(stats.folder));
        }
        Ok(())
    }
}

#[async_trait]
impl Sequencer for IndexTransaction {
    async fn index_id(&mut self) -> StorageResult<IndexId> {
        let id: Option<i64> = sqlx::query_scalar("SELECT index_id FROM index_sequence")
            .fetch_optional(self.conn())
            .await
            .map_err(StorageError::Database)?;

        id.map(|v| IndexId::new(v as u64))
            .ok_or_else(|| StorageError::constraint("index_sequence row missing"))
    }

    async fn current_sequence(&mut self) -> StorageResult<u64> {
        let sequence: Option<i64> = sqlx::query_scalar("SELECT current_sequence FROM index_sequence")
            .fetch_optional(self.conn())
            .await
            .map_err(StorageError::Database)?;

        sequence
            .map(|v| v as u64)
            .ok_or_else(|| StorageError::constraint("index_sequence row missing"))
    }

    async fn next_sequence(&mut self) -> StorageResult<u64> {
        let sequence: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE index_sequence SET current_sequence = current_sequence + 1
            RETURNING current_sequence
            "#,
        )
        .fetch_optional(self.conn())
        .await
        .map_err(StorageError::Database)?;

        sequence
            .map(|v| v as u64)
            .ok_or_else(|| StorageError::constraint("index_sequence row missing"))
    }
}

/// Convert an unsigned value for an SQLite integer column.
fn sql_int(value: u64, column: &str) -> StorageResult<i64> {
    i64::try_from(value)
        .map_err(|_| StorageError::constraint(format!("{} {} is out of range", column, value)))
}

/// Reject records that break the file/directory shape.
fn validate_file_info(info: &FileInfo) -> StorageResult<()> {
    if info.is_directory() && (info.size.is_some() || info.hash.is_some()) {
        return Err(StorageError::constraint(format!(
            "directory {}/{} carries size or hash",
            info.folder, info.path
        )));
    }
    if info.is_file() && !info.deleted && (info.size.is_none() || info.hash.is_none()) {
        return Err(StorageError::constraint(format!(
            "file {}/{} has no size or hash",
            info.folder, info.path
        )));
    }
    Ok(())
}

/// Build a `LIKE` pattern for a case-insensitive substring search.
///
/// SQLite only folds ASCII case, so names are matched against the
/// `search_name` column, lowercased on write the same way as the query.
fn like_pattern(query: &str) -> Option<String> {
    let term = query.trim().to_lowercase();
    if term.is_empty() {
        return None;
    }
    let escaped = term
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    Some(format!("%{}%", escaped))
}

#[cfg(test)]
mod tests {
    use super::*;
    use index_types::BlockInfo;

    fn blocks_for(folder: &str, path: &str, sizes: &[u32]) -> FileBlocks {
        let mut offset = 0u64;
        let blocks = sizes
            .iter()
            .enumerate()
            .map(|(i, size)| {
                let block = BlockInfo {
                    offset,
                    size: *size,
                    hash: format!("{:02x}", i as u8 + 1).repeat(32),
                };
                offset += u64::from(*size);
                block
            })
            .collect();
        FileBlocks::new(folder, path, blocks).unwrap()
    }

    fn file_with_blocks(folder: &str, path: &str, sizes: &[u32], modified: i64) -> (FileInfo, FileBlocks) {
        let blocks = blocks_for(folder, path, sizes);
        let info = FileInfo::file(
            folder,
            path,
            blocks.size,
            blocks.hash.clone(),
            modified,
            vec![Version::new(1, modified as u64)],
        );
        (info, blocks)
    }

    fn progress(folder: &str, device: &str, local: u64, max: u64) -> IndexInfo {
        IndexInfo {
            folder: folder.into(),
            device_id: DeviceId::from(device),
            index_id: IndexId::new(11),
            local_sequence: local,
            max_sequence: max,
        }
    }

    #[tokio::test]
    async fn sequence_starts_at_zero_and_increments() {
        let repo = SqliteIndexRepository::in_memory().await.unwrap();
        let mut tx = repo.begin().await.unwrap();

        assert_eq!(tx.current_sequence().await.unwrap(), 0);
        assert_eq!(tx.next_sequence().await.unwrap(), 1);
        assert_eq!(tx.next_sequence().await.unwrap(), 2);
        assert_eq!(tx.current_sequence().await.unwrap(), 2);
        tx.commit().await.unwrap();
    }

    #[tokio::test]
    async fn index_id_is_stable_until_cleared() {
        let repo = SqliteIndexRepository::in_memory().await.unwrap();

        let mut tx = repo.begin().await.unwrap();
        let first = tx.index_id().await.unwrap();
        tx.next_sequence().await.unwrap();
        tx.commit().await.unwrap();

        let mut tx = repo.begin().await.unwrap();
        assert_eq!(tx.index_id().await.unwrap(), first);
        tx.clear_index().await.unwrap();
        assert_ne!(tx.index_id().await.unwrap(), first);
        assert_eq!(tx.current_sequence().await.unwrap(), 0);
        tx.commit().await.unwrap();
    }

    #[tokio::test]
    async fn file_info_and_blocks_are_stored() {
        let repo = SqliteIndexRepository::in_memory().await.unwrap();
        let (info, blocks) = file_with_blocks("docs", "a/b.txt", &[10, 20], 1_000);

        let mut tx = repo.begin().await.unwrap();
        tx.update_file_info(&info, Some(&blocks)).await.unwrap();
        tx.commit().await.unwrap();

        let mut tx = repo.begin().await.unwrap();
        assert_eq!(tx.find_file_info("docs", "a/b.txt").await.unwrap(), Some(info));
        assert_eq!(tx.find_file_blocks("docs", "a/b.txt").await.unwrap(), Some(blocks));
        assert_eq!(
            tx.find_file_info_last_modified("docs", "a/b.txt").await.unwrap(),
            Some(1_000)
        );
        assert!(tx.find_file_info("docs", "missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn stats_follow_create_and_delete() {
        let repo = SqliteIndexRepository::in_memory().await.unwrap();
        let (info, blocks) = file_with_blocks("docs", "report.pdf", &[100], 10);

        let mut tx = repo.begin().await.unwrap();
        let stats = tx.update_file_info(&info, Some(&blocks)).await.unwrap();
        tx.commit().await.unwrap();
        assert_eq!((stats.file_count, stats.dir_count, stats.size), (1, 0, 100));

        let mut deleted = info.clone().with_deleted(true);
        deleted.last_modified = 20;
        let mut tx = repo.begin().await.unwrap();
        let stats = tx.update_file_info(&deleted, None).await.unwrap();
        tx.commit().await.unwrap();
        assert_eq!((stats.file_count, stats.dir_count, stats.size), (0, 0, 0));
        assert_eq!(stats.last_update, 20);

        let mut tx = repo.begin().await.unwrap();
        assert!(tx.find_file_blocks("docs", "report.pdf").await.unwrap().is_none());
        assert!(tx.find_not_deleted_file_info("docs", "report.pdf").await.unwrap().is_none());
        assert!(tx.find_file_info("docs", "report.pdf").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn rewriting_same_record_keeps_stats() {
        let repo = SqliteIndexRepository::in_memory().await.unwrap();
        let (info, blocks) = file_with_blocks("docs", "a", &[5], 1);

        let mut tx = repo.begin().await.unwrap();
        let first = tx.update_file_info(&info, Some(&blocks)).await.unwrap();
        let second = tx.update_file_info(&info, Some(&blocks)).await.unwrap();
        tx.commit().await.unwrap();

        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn directories_count_separately() {
        let repo = SqliteIndexRepository::in_memory().await.unwrap();
        let mut tx = repo.begin().await.unwrap();
        tx.update_file_info(&FileInfo::directory("docs", "d", 1, vec![]), None)
            .await
            .unwrap();
        let (info, blocks) = file_with_blocks("docs", "d/f", &[7], 2);
        let stats = tx.update_file_info(&info, Some(&blocks)).await.unwrap();
        tx.commit().await.unwrap();

        assert_eq!((stats.file_count, stats.dir_count, stats.size), (1, 1, 7));
    }

    #[tokio::test]
    async fn dropped_transaction_leaves_no_trace() {
        let repo = SqliteIndexRepository::in_memory().await.unwrap();
        let (info, blocks) = file_with_blocks("docs", "a", &[5], 1);

        let mut tx = repo.begin().await.unwrap();
        tx.update_file_info(&info, Some(&blocks)).await.unwrap();
        tx.update_index_info(&progress("docs", "peer", 1, 2)).await.unwrap();
        drop(tx);

        let mut tx = repo.begin().await.unwrap();
        assert!(tx.find_file_info("docs", "a").await.unwrap().is_none());
        assert!(tx.find_folder_stats("docs").await.unwrap().is_none());
        assert!(tx
            .find_index_info(&DeviceId::from("peer"), "docs")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn inconsistent_blocks_are_rejected() {
        let repo = SqliteIndexRepository::in_memory().await.unwrap();
        let (mut info, blocks) = file_with_blocks("docs", "a", &[5], 1);
        info.size = Some(6);

        let mut tx = repo.begin().await.unwrap();
        let err = tx.update_file_info(&info, Some(&blocks)).await.unwrap_err();
        assert!(matches!(err, StorageError::InvalidBlocks(_)));
    }

    #[tokio::test]
    async fn malformed_directory_is_a_constraint_violation() {
        let repo = SqliteIndexRepository::in_memory().await.unwrap();
        let mut dir = FileInfo::directory("docs", "d", 1, vec![]);
        dir.size = Some(3);

        let mut tx = repo.begin().await.unwrap();
        let err = tx.update_file_info(&dir, None).await.unwrap_err();
        assert!(matches!(err, StorageError::ConstraintViolation { .. }));
    }

    #[tokio::test]
    async fn index_info_upsert_per_folder_and_device() {
        let repo = SqliteIndexRepository::in_memory().await.unwrap();
        let mut tx = repo.begin().await.unwrap();
        tx.update_index_info(&progress("docs", "a", 1, 5)).await.unwrap();
        tx.update_index_info(&progress("docs", "b", 2, 5)).await.unwrap();
        tx.update_index_info(&progress("docs", "a", 3, 5)).await.unwrap();
        tx.commit().await.unwrap();

        let mut tx = repo.begin().await.unwrap();
        let a = tx
            .find_index_info(&DeviceId::from("a"), "docs")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(a.local_sequence, 3);
        assert_eq!(tx.find_all_index_infos().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn index_info_cannot_exceed_max_sequence() {
        let repo = SqliteIndexRepository::in_memory().await.unwrap();
        let mut tx = repo.begin().await.unwrap();
        let err = tx
            .update_index_info(&progress("docs", "a", 6, 5))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::ConstraintViolation { .. }));
    }

    #[tokio::test]
    async fn stats_published_only_after_commit() {
        let repo = SqliteIndexRepository::in_memory().await.unwrap();
        let mut events = repo.subscribe_folder_stats();
        let (info, blocks) = file_with_blocks("docs", "a", &[5], 1);

        let mut tx = repo.begin().await.unwrap();
        tx.update_file_info(&info, Some(&blocks)).await.unwrap();
        assert!(events.try_recv().is_err());
        tx.commit().await.unwrap();

        let event = events.recv().await.unwrap();
        assert_eq!(event.stats.len(), 1);
        assert_eq!(event.stats[0].file_count, 1);
    }

    #[tokio::test]
    async fn rolled_back_stats_are_never_published() {
        let repo = SqliteIndexRepository::in_memory().await.unwrap();
        let mut events = repo.subscribe_folder_stats();
        let (info, blocks) = file_with_blocks("docs", "a", &[5], 1);

        let mut tx = repo.begin().await.unwrap();
        tx.update_file_info(&info, Some(&blocks)).await.unwrap();
        tx.rollback().await.unwrap();

        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn search_by_term_is_case_insensitive_substring() {
        let repo = SqliteIndexRepository::in_memory().await.unwrap();
        let mut tx = repo.begin().await.unwrap();
        for (path, modified) in [("Holiday.JPG", 1), ("work/holiday_plan.txt", 2), ("notes.md", 3)] {
            let (info, blocks) = file_with_blocks("docs", path, &[1], modified);
            tx.update_file_info(&info, Some(&blocks)).await.unwrap();
        }
        let (gone, _) = file_with_blocks("docs", "old-holiday.png", &[1], 4);
        tx.update_file_info(&gone.with_deleted(true), None).await.unwrap();
        tx.commit().await.unwrap();

        let mut tx = repo.begin().await.unwrap();
        let found = tx.find_file_info_by_search_term("  HOLIDAY ").await.unwrap();
        let paths: Vec<_> = found.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["Holiday.JPG", "work/holiday_plan.txt"]);
        assert_eq!(tx.count_file_info_by_search_term("holiday").await.unwrap(), 2);
        assert!(tx.find_file_info_by_search_term("   ").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn out_of_range_values_are_rejected() {
        let repo = SqliteIndexRepository::in_memory().await.unwrap();
        let mut tx = repo.begin().await.unwrap();

        let huge = FileInfo::file("docs", "huge.bin", u64::MAX, "00", 1, vec![Version::new(1, 1)]);
        let err = tx.update_file_info(&huge, None).await.unwrap_err();
        assert!(matches!(err, StorageError::ConstraintViolation { .. }));

        let (info, _) = file_with_blocks("docs", "a", &[1], 1);
        let info = FileInfo {
            versions: vec![Version::new(1, u64::MAX)],
            ..info
        };
        let err = tx.update_file_info(&info, None).await.unwrap_err();
        assert!(matches!(err, StorageError::ConstraintViolation { .. }));

        assert!(tx.find_folder_stats("docs").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn search_by_term_folds_non_ascii_case() {
        let repo = SqliteIndexRepository::in_memory().await.unwrap();
        let mut tx = repo.begin().await.unwrap();
        for (path, modified) in [("Ärger.txt", 1), ("ÉTÉ/Straße.md", 2)] {
            let (info, blocks) = file_with_blocks("docs", path, &[1], modified);
            tx.update_file_info(&info, Some(&blocks)).await.unwrap();
        }

        assert_eq!(tx.count_file_info_by_search_term("Ärger").await.unwrap(), 1);
        assert_eq!(tx.count_file_info_by_search_term("ärger").await.unwrap(), 1);
        assert_eq!(tx.count_file_info_by_search_term("STRASSE").await.unwrap(), 0);
        let found = tx.find_file_info_by_search_term("straße").await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].path, "ÉTÉ/Straße.md");
        assert_eq!(
            tx.find_file_info_by_pattern("ärger").await.unwrap().len(),
            tx.count_file_info_by_search_term("ärger").await.unwrap() as usize
        );
    }

    #[tokio::test]
    async fn search_term_wildcards_are_literal() {
        let repo = SqliteIndexRepository::in_memory().await.unwrap();
        let mut tx = repo.begin().await.unwrap();
        for (path, modified) in [("a_b.txt", 1), ("axb.txt", 2)] {
            let (info, blocks) = file_with_blocks("docs", path, &[1], modified);
            tx.update_file_info(&info, Some(&blocks)).await.unwrap();
        }

        assert_eq!(tx.count_file_info_by_search_term("a_b").await.unwrap(), 1);
        assert_eq!(tx.count_file_info_by_search_term("%").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn search_by_pattern_matches_file_names() {
        let repo = SqliteIndexRepository::in_memory().await.unwrap();
        let mut tx = repo.begin().await.unwrap();
        for (path, modified) in [("img/IMG_0001.jpg", 1), ("img/IMG_0002.png", 2), ("jpg/readme", 3)] {
            let (info, blocks) = file_with_blocks("docs", path, &[1], modified);
            tx.update_file_info(&info, Some(&blocks)).await.unwrap();
        }

        let found = tx.find_file_info_by_pattern(r"^img_\d+\.jpg$").await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].path, "img/IMG_0001.jpg");

        let err = tx.find_file_info_by_pattern("(unclosed").await.unwrap_err();
        assert!(matches!(err, StorageError::InvalidPattern(_)));
    }

    #[tokio::test]
    async fn list_directory_contents() {
        let repo = SqliteIndexRepository::in_memory().await.unwrap();
        let mut tx = repo.begin().await.unwrap();
        tx.update_file_info(&FileInfo::directory("docs", "dir", 1, vec![]), None)
            .await
            .unwrap();
        for (path, modified) in [("dir/a", 2), ("dir/b", 3), ("top", 4), ("dir/sub/c", 5)] {
            let (info, blocks) = file_with_blocks("docs", path, &[1], modified);
            tx.update_file_info(&info, Some(&blocks)).await.unwrap();
        }

        let root = tx
            .find_not_deleted_files_by_folder_and_parent("docs", "")
            .await
            .unwrap();
        let root: Vec<_> = root.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(root, vec!["dir", "top"]);

        let dir = tx
            .find_not_deleted_files_by_folder_and_parent("docs", "dir")
            .await
            .unwrap();
        let dir: Vec<_> = dir.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(dir, vec!["dir/a", "dir/b"]);
    }

    #[tokio::test]
    async fn clear_index_wipes_tables_and_reports_empty_stats() {
        let repo = SqliteIndexRepository::in_memory().await.unwrap();
        let (info, blocks) = file_with_blocks("docs", "a", &[5], 1);

        let mut tx = repo.begin().await.unwrap();
        tx.update_file_info(&info, Some(&blocks)).await.unwrap();
        tx.update_index_info(&progress("docs", "peer", 1, 1)).await.unwrap();
        tx.commit().await.unwrap();

        let mut events = repo.subscribe_folder_stats();
        let mut tx = repo.begin().await.unwrap();
        tx.clear_index().await.unwrap();
        tx.commit().await.unwrap();

        let event = events.recv().await.unwrap();
        assert!(event.index_cleared);
        assert_eq!(event.stats, vec![FolderStats::empty("docs")]);

        let mut tx = repo.begin().await.unwrap();
        assert!(tx.find_file_info("docs", "a").await.unwrap().is_none());
        assert!(tx.find_file_blocks("docs", "a").await.unwrap().is_none());
        assert!(tx.find_all_index_infos().await.unwrap().is_empty());
        assert!(tx.find_all_folder_stats().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn clearing_an_empty_index_still_notifies() {
        let repo = SqliteIndexRepository::in_memory().await.unwrap();
        let mut events = repo.subscribe_folder_stats();

        let mut tx = repo.begin().await.unwrap();
        tx.clear_index().await.unwrap();
        tx.commit().await.unwrap();

        let event = events.recv().await.unwrap();
        assert!(event.index_cleared);
        assert!(event.stats.is_empty());
    }

    #[tokio::test]
    async fn on_disk_index_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.db");
        let (info, blocks) = file_with_blocks("docs", "a", &[5], 1);

        let index_id = {
            let repo = SqliteIndexRepository::open(&path, 2).await.unwrap();
            let mut tx = repo.begin().await.unwrap();
            tx.update_file_info(&info, Some(&blocks)).await.unwrap();
            let id = tx.index_id().await.unwrap();
            tx.commit().await.unwrap();
            repo.close().await;
            id
        };

        let repo = SqliteIndexRepository::open(&path, 2).await.unwrap();
        let mut tx = repo.begin().await.unwrap();
        assert_eq!(tx.index_id().await.unwrap(), index_id);
        assert_eq!(tx.find_file_info("docs", "a").await.unwrap(), Some(info));
        assert_eq!(tx.find_folder_stats("docs").await.unwrap().unwrap().size, 5);
    }

    #[test]
    fn like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern(" A%b_ ").as_deref(), Some("%a\\%b\\_%"));
        assert_eq!(like_pattern(""), None);
    }
}
