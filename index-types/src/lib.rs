//! # index-types
//!
//! Data model for the bep-index synchronization core.
//!
//! This crate provides the foundational types used across all bep-index crates:
//! - [`DeviceId`], [`IndexId`], [`TempKey`] - Identity types
//! - [`FileInfo`], [`FileBlocks`], [`BlockInfo`] - Per-file records
//! - [`IndexInfo`], [`FolderStats`], [`FolderInfo`] - Per-folder bookkeeping
//! - [`IndexUpdate`] - A decoded batch from one peer, with its wire encoding
//! - [`IndexTypesError`] - Error types

#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
mod ids;
mod model;
mod update;

pub use error::IndexTypesError;
pub use ids::{DeviceId, IndexId, TempKey};
pub use model::{
    BlockInfo, FileBlocks, FileInfo, FileType, FolderInfo, FolderStats, IndexInfo, Version,
};
pub use update::{IndexUpdate, PeerIndexInfo, RemoteFileRecord};

/// Current wall-clock time as unix milliseconds.
///
/// All timestamps in the index (`last_modified`, `last_update`) use this unit.
pub fn now_millis() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
