//! Consistency check between a file record and its block list.

use index_types::{FileBlocks, FileInfo};
use thiserror::Error;

/// Reasons a block list does not belong to a file record.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BlockCheckError {
    /// Records refer to different paths.
    #[error("blocks for {blocks_path} stored with record {file_path}")]
    PathMismatch {
        /// Path of the file record.
        file_path: String,
        /// Path of the block list.
        blocks_path: String,
    },

    /// Block list attached to a directory.
    #[error("directory {path} cannot have blocks")]
    NotAFile {
        /// Path of the directory.
        path: String,
    },

    /// File size differs from the sum of block sizes.
    #[error("{path}: file size {file_size} does not match block total {blocks_size}")]
    SizeMismatch {
        /// Path of the file.
        path: String,
        /// Size from the file record.
        file_size: u64,
        /// Sum of block sizes.
        blocks_size: u64,
    },

    /// File hash differs from the block list hash.
    #[error("{path}: file hash does not match block list hash")]
    HashMismatch {
        /// Path of the file.
        path: String,
    },
}

/// Verify that `blocks` describes the content of `file`.
pub fn check_blocks(file: &FileInfo, blocks: &FileBlocks) -> Result<(), BlockCheckError> {
    if file.folder != blocks.folder || file.path != blocks.path {
        return Err(BlockCheckError::PathMismatch {
            file_path: format!("{}/{}", file.folder, file.path),
            blocks_path: format!("{}/{}", blocks.folder, blocks.path),
        });
    }

    if !file.is_file() {
        return Err(BlockCheckError::NotAFile {
            path: file.path.clone(),
        });
    }

    let summed: u64 = blocks.blocks.iter().map(|b| u64::from(b.size)).sum();
    let file_size = file.size.unwrap_or(0);
    if file_size != blocks.size || summed != blocks.size {
        return Err(BlockCheckError::SizeMismatch {
            path: file.path.clone(),
            file_size,
            blocks_size: summed,
        });
    }

    if file.hash.as_deref() != Some(blocks.hash.as_str()) {
        return Err(BlockCheckError::HashMismatch {
            path: file.path.clone(),
        });
    }

    Ok(())
}
