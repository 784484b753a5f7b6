//! Internal row types for SQLite queries.

use crate::error::StorageError;
use index_types::{
    BlockInfo, DeviceId, FileBlocks, FileInfo, FileType, FolderStats, IndexId, IndexInfo,
    IndexTypesError, Version,
};

#[derive(sqlx::FromRow)]
pub(crate) struct FileInfoRow {
    folder: String,
    path: String,
    size: Option<i64>,
    hash: Option<String>,
    last_modified: i64,
    file_type: String,
    version_id: i64,
    version_value: i64,
    is_deleted: bool,
}

impl TryFrom<FileInfoRow> for FileInfo {
    type Error = StorageError;

    fn try_from(row: FileInfoRow) -> Result<Self, Self::Error> {
        let file_type = FileType::parse(&row.file_type).ok_or_else(|| {
            StorageError::constraint(format!(
                "unknown file_type {:?} for {}/{}",
                row.file_type, row.folder, row.path
            ))
        })?;
        let versions = vec![Version::new(row.version_id as u64, row.version_value as u64)];

        let info = match file_type {
            FileType::Directory => {
                FileInfo::directory(row.folder, row.path, row.last_modified, versions)
            }
            FileType::File => {
                let size = row.size.ok_or_else(|| {
                    StorageError::constraint(format!("file {}/{} has no size", row.folder, row.path))
                })?;
                FileInfo::file(
                    row.folder,
                    row.path,
                    size as u64,
                    row.hash.unwrap_or_default(),
                    row.last_modified,
                    versions,
                )
            }
        };

        Ok(info.with_deleted(row.is_deleted))
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct FileBlocksRow {
    folder: String,
    path: String,
    hash: String,
    size: i64,
    blocks: Vec<u8>,
}

impl TryFrom<FileBlocksRow> for FileBlocks {
    type Error = StorageError;

    fn try_from(row: FileBlocksRow) -> Result<Self, Self::Error> {
        let blocks: Vec<BlockInfo> =
            rmp_serde::from_slice(&row.blocks).map_err(IndexTypesError::Deserialization)?;
        Ok(FileBlocks {
            folder: row.folder,
            path: row.path,
            size: row.size as u64,
            hash: row.hash,
            blocks,
        })
    }
}

/// Encode a block list for the `blocks` column.
pub(crate) fn encode_blocks(blocks: &[BlockInfo]) -> Result<Vec<u8>, StorageError> {
    Ok(rmp_serde::to_vec(blocks).map_err(IndexTypesError::Serialization)?)
}

#[derive(sqlx::FromRow)]
pub(crate) struct IndexInfoRow {
    folder: String,
    device_id: String,
    index_id: i64,
    local_sequence: i64,
    max_sequence: i64,
}

impl From<IndexInfoRow> for IndexInfo {
    fn from(row: IndexInfoRow) -> Self {
        IndexInfo {
            folder: row.folder,
            device_id: DeviceId::new(row.device_id),
            index_id: IndexId::new(row.index_id as u64),
            local_sequence: row.local_sequence as u64,
            max_sequence: row.max_sequence as u64,
        }
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct FolderStatsRow {
    folder: String,
    file_count: i64,
    dir_count: i64,
    size: i64,
    last_update: i64,
}

impl From<FolderStatsRow> for FolderStats {
    fn from(row: FolderStatsRow) -> Self {
        FolderStats {
            folder: row.folder,
            file_count: row.file_count as u64,
            dir_count: row.dir_count as u64,
            size: row.size as u64,
            last_update: row.last_update,
        }
    }
}
