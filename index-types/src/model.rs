//! Index records: files, blocks, per-peer index progress and folder aggregates.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{DeviceId, IndexId, IndexTypesError};

/// Kind of an index entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FileType {
    /// Regular file with content blocks.
    File,
    /// Directory (no size, no hash).
    Directory,
}

impl FileType {
    /// Name used in the `file_type` storage column.
    pub fn as_str(&self) -> &'static str {
        match self {
            FileType::File => "FILE",
            FileType::Directory => "DIRECTORY",
        }
    }

    /// Parse a storage column value.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "FILE" => Some(FileType::File),
            "DIRECTORY" => Some(FileType::Directory),
            _ => None,
        }
    }
}

/// One entry of a version vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Version {
    /// Short id of the device that made the change.
    pub id: u64,
    /// Counter value for that device.
    pub value: u64,
}

impl Version {
    /// Create a version entry.
    pub fn new(id: u64, value: u64) -> Self {
        Self { id, value }
    }
}

/// A file or directory record of a folder index.
///
/// Directories never carry a size or hash; the constructors enforce this.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    /// Folder id.
    pub folder: String,
    /// Path relative to the folder root, `/` separated.
    pub path: String,
    /// File or directory.
    pub file_type: FileType,
    /// Size in bytes (files only).
    pub size: Option<u64>,
    /// Content hash, hex (files only).
    pub hash: Option<String>,
    /// Last modification time, unix milliseconds.
    pub last_modified: i64,
    /// Version vector; the last element is the current version.
    pub versions: Vec<Version>,
    /// Whether this record marks a deletion.
    pub deleted: bool,
}

impl FileInfo {
    /// Create a regular file record.
    pub fn file(
        folder: impl Into<String>,
        path: impl Into<String>,
        size: u64,
        hash: impl Into<String>,
        last_modified: i64,
        versions: Vec<Version>,
    ) -> Self {
        Self {
            folder: folder.into(),
            path: path.into(),
            file_type: FileType::File,
            size: Some(size),
            hash: Some(hash.into()),
            last_modified,
            versions,
            deleted: false,
        }
    }

    /// Create a directory record.
    pub fn directory(
        folder: impl Into<String>,
        path: impl Into<String>,
        last_modified: i64,
        versions: Vec<Version>,
    ) -> Self {
        Self {
            folder: folder.into(),
            path: path.into(),
            file_type: FileType::Directory,
            size: None,
            hash: None,
            last_modified,
            versions,
            deleted: false,
        }
    }

    /// Mark this record as deleted.
    pub fn with_deleted(mut self, deleted: bool) -> Self {
        self.deleted = deleted;
        self
    }

    /// Check if this is a regular file.
    pub fn is_file(&self) -> bool {
        self.file_type == FileType::File
    }

    /// Check if this is a directory.
    pub fn is_directory(&self) -> bool {
        self.file_type == FileType::Directory
    }

    /// Last path component.
    pub fn file_name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }

    /// Path of the containing directory (`""` for the folder root).
    pub fn parent(&self) -> &str {
        self.path.rsplit_once('/').map(|(parent, _)| parent).unwrap_or("")
    }

    /// The current (last) entry of the version vector.
    pub fn current_version(&self) -> Option<Version> {
        self.versions.last().copied()
    }
}

/// One content block of a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockInfo {
    /// Offset of the block within the file.
    pub offset: u64,
    /// Block size in bytes.
    pub size: u32,
    /// Block hash, hex.
    pub hash: String,
}

/// Ordered block list of a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileBlocks {
    /// Folder id.
    pub folder: String,
    /// Path relative to the folder root.
    pub path: String,
    /// Sum of all block sizes.
    pub size: u64,
    /// Hex SHA-256 over the concatenated raw block hashes.
    pub hash: String,
    /// Blocks in file order.
    pub blocks: Vec<BlockInfo>,
}

impl FileBlocks {
    /// Build a block list, deriving its total size and content hash.
    ///
    /// # Errors
    ///
    /// Returns [`IndexTypesError::InvalidData`] if a block hash is not hex.
    pub fn new(
        folder: impl Into<String>,
        path: impl Into<String>,
        blocks: Vec<BlockInfo>,
    ) -> Result<Self, IndexTypesError> {
        let size = blocks.iter().map(|b| u64::from(b.size)).sum();
        let hash = Self::content_hash(&blocks)?;
        Ok(Self {
            folder: folder.into(),
            path: path.into(),
            size,
            hash,
            blocks,
        })
    }

    /// Compute the content hash for a block list.
    pub fn content_hash(blocks: &[BlockInfo]) -> Result<String, IndexTypesError> {
        let mut hasher = Sha256::new();
        for block in blocks {
            let raw = hex::decode(&block.hash).map_err(|e| {
                IndexTypesError::InvalidData(format!(
                    "block hash at offset {} is not hex: {}",
                    block.offset, e
                ))
            })?;
            hasher.update(&raw);
        }
        Ok(hex::encode(hasher.finalize()))
    }
}

/// Replication progress of one peer's index for one folder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexInfo {
    /// Folder id.
    pub folder: String,
    /// The peer.
    pub device_id: DeviceId,
    /// The peer's index generation.
    pub index_id: IndexId,
    /// Highest peer sequence applied locally.
    pub local_sequence: u64,
    /// Highest sequence the peer claims to have.
    pub max_sequence: u64,
}

impl IndexInfo {
    /// Check whether every advertised record has been applied.
    pub fn is_fully_acquired(&self) -> bool {
        self.local_sequence >= self.max_sequence
    }
}

/// Aggregate counters for one folder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderStats {
    /// Folder id.
    pub folder: String,
    /// Number of live (non-deleted) files.
    pub file_count: u64,
    /// Number of live (non-deleted) directories.
    pub dir_count: u64,
    /// Total size of live files.
    pub size: u64,
    /// Latest modification time seen, unix milliseconds.
    pub last_update: i64,
}

impl FolderStats {
    /// Zero-valued stats for a folder with no stored row.
    pub fn empty(folder: impl Into<String>) -> Self {
        Self {
            folder: folder.into(),
            file_count: 0,
            dir_count: 0,
            size: 0,
            last_update: 0,
        }
    }
}

/// A configured folder.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FolderInfo {
    /// Folder id.
    pub folder_id: String,
    /// Human-readable label.
    pub label: String,
}

impl FolderInfo {
    /// Create a folder description.
    pub fn new(folder_id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            folder_id: folder_id.into(),
            label: label.into(),
        }
    }

    /// Folder description for an unconfigured folder (label = id).
    pub fn unlabeled(folder_id: impl Into<String>) -> Self {
        let folder_id = folder_id.into();
        Self {
            label: folder_id.clone(),
            folder_id,
        }
    }
}
