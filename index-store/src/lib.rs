//! # index-store
//!
//! Transactional index store for bep-index.
//!
//! This crate persists everything the synchronization core knows about
//! remote peers' indexes:
//! - File records and their block lists
//! - Per-(folder, device) index progress
//! - Incrementally maintained folder statistics
//! - The local index generation and its sequence counter
//!
//! Every write goes through an [`IndexTransaction`]. Folder statistics
//! changed by a transaction are published to subscribers only after it
//! commits, so partial application is never observable.
//!
//! The crate also provides the overflow store ([`TempRepository`]) the
//! ingestion pipeline spills batches into when its worker is busy.
//!
//! ## Schema
//!
//! ```text
//! index_sequence    (index_id, current_sequence)
//! folder_index_info (folder, device_id, index_id, local_sequence, max_sequence)
//! file_info         (folder, path, file_name, parent, size, hash, last_modified,
//!                    file_type, version_id, version_value, is_deleted)
//! file_blocks       (folder, path, hash, size, blocks)
//! folder_stats      (folder, file_count, dir_count, size, last_update)
//! temp_data         (seq, key, data, created_at)
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod events;
pub mod storage;

pub use error::{StorageError, StorageResult};
pub use events::FolderStatsUpdated;
pub use storage::{
    IndexTransaction, Sequencer, SqliteIndexRepository, SqliteTempRepository, TempRepository,
};
