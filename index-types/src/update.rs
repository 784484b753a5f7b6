//! Decoded index update batches and their storage encoding.
//!
//! An [`IndexUpdate`] is what the ingestion pipeline moves around: one batch
//! of records from one peer for one folder, wrapped with the peer's
//! advertised index state. When the pipeline spills a batch to the overflow
//! store it is encoded with MessagePack.

use serde::{Deserialize, Serialize};

use crate::{BlockInfo, DeviceId, FileBlocks, FileInfo, FileType, IndexId, IndexTypesError, Version};

/// A file record as decoded from a peer's index message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteFileRecord {
    /// Path relative to the folder root.
    pub path: String,
    /// File or directory.
    pub file_type: FileType,
    /// Size in bytes (ignored for directories).
    pub size: u64,
    /// Last modification time, unix milliseconds.
    pub last_modified: i64,
    /// Whether the peer deleted this entry.
    pub deleted: bool,
    /// Version vector.
    pub versions: Vec<Version>,
    /// The peer's sequence number for this change.
    pub sequence: u64,
    /// Content blocks (files only).
    pub blocks: Vec<BlockInfo>,
}

impl RemoteFileRecord {
    /// Convert into the stored file record for `folder`.
    ///
    /// The content hash of a file is derived from its block list.
    pub fn to_file_info(&self, folder: &str) -> Result<FileInfo, IndexTypesError> {
        let info = match self.file_type {
            FileType::Directory => FileInfo::directory(
                folder,
                self.path.clone(),
                self.last_modified,
                self.versions.clone(),
            ),
            FileType::File => FileInfo::file(
                folder,
                self.path.clone(),
                self.size,
                FileBlocks::content_hash(&self.blocks)?,
                self.last_modified,
                self.versions.clone(),
            ),
        };
        Ok(info.with_deleted(self.deleted))
    }

    /// Block list to store alongside the record, if any.
    ///
    /// Directories and deleted files carry no blocks.
    pub fn to_file_blocks(&self, folder: &str) -> Result<Option<FileBlocks>, IndexTypesError> {
        if self.file_type != FileType::File || self.deleted {
            return Ok(None);
        }
        FileBlocks::new(folder, self.path.clone(), self.blocks.clone()).map(Some)
    }
}

/// Index state a peer advertised for a folder in its cluster configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerIndexInfo {
    /// The peer's current index generation.
    pub index_id: IndexId,
    /// Highest sequence the peer has for this folder.
    pub max_sequence: u64,
}

/// One decoded batch from one peer for one folder, with its context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexUpdate {
    /// Folder id.
    pub folder: String,
    /// Records in message order.
    pub records: Vec<RemoteFileRecord>,
    /// The sending peer.
    pub peer_device_id: DeviceId,
    /// The peer's advertised index state for `folder`.
    pub peer_index: PeerIndexInfo,
}

impl IndexUpdate {
    /// Serialize to MessagePack bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, IndexTypesError> {
        rmp_serde::to_vec(self).map_err(IndexTypesError::Serialization)
    }

    /// Deserialize from MessagePack bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, IndexTypesError> {
        rmp_serde::from_slice(bytes).map_err(IndexTypesError::Deserialization)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file_record(path: &str, sequence: u64) -> RemoteFileRecord {
        RemoteFileRecord {
            path: path.into(),
            file_type: FileType::File,
            size: 4,
            last_modified: 1_000,
            deleted: false,
            versions: vec![Version::new(7, 1)],
            sequence,
            blocks: vec![BlockInfo {
                offset: 0,
                size: 4,
                hash: hex::encode([9u8; 32]),
            }],
        }
    }

    #[test]
    fn update_survives_encoding() {
        let update = IndexUpdate {
            folder: "docs".into(),
            records: vec![file_record("a.txt", 1), file_record("b/c.txt", 2)],
            peer_device_id: DeviceId::from("peer"),
            peer_index: PeerIndexInfo {
                index_id: IndexId::new(42),
                max_sequence: 2,
            },
        };

        let bytes = update.to_bytes().unwrap();
        assert_eq!(IndexUpdate::from_bytes(&bytes).unwrap(), update);
    }

    #[test]
    fn garbage_bytes_fail_to_decode() {
        let result = IndexUpdate::from_bytes(&[0xc1, 0x00, 0xff]);
        assert!(matches!(result, Err(IndexTypesError::Deserialization(_))));
    }

    #[test]
    fn file_record_hash_comes_from_blocks() {
        let record = file_record("a.txt", 1);
        let info = record.to_file_info("docs").unwrap();
        let blocks = record.to_file_blocks("docs").unwrap().unwrap();
        assert_eq!(info.hash.as_deref(), Some(blocks.hash.as_str()));
        assert_eq!(info.size, Some(blocks.size));
    }

    #[test]
    fn deleted_and_directory_records_have_no_blocks() {
        let mut deleted = file_record("gone.txt", 3);
        deleted.deleted = true;
        assert!(deleted.to_file_blocks("docs").unwrap().is_none());
        assert!(deleted.to_file_info("docs").unwrap().deleted);

        let mut dir = file_record("dir", 4);
        dir.file_type = FileType::Directory;
        assert!(dir.to_file_blocks("docs").unwrap().is_none());
        assert!(dir.to_file_info("docs").unwrap().size.is_none());
    }
}
