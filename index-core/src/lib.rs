//! # index-core
//!
//! Pure logic for bep-index (no I/O, instant tests).
//!
//! This crate implements the rules the index store and the update applier
//! rely on, without any database or runtime:
//! - [`stats`]: signed folder-statistics deltas between two file states
//! - [`merge`]: when a remote record replaces the local one, and how a
//!   peer's [`IndexInfo`](index_types::IndexInfo) advances
//! - [`blocks`]: consistency check between a file record and its blocks
//! - [`status`]: the read-only [`FolderStatus`] composite
//!
//! The actual I/O (SQLite, channels) is performed by `index-store` and
//! `index-node`, which call into these functions.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod blocks;
pub mod merge;
pub mod stats;
pub mod status;

pub use blocks::{check_blocks, BlockCheckError};
pub use merge::{advance_index_info, is_newer, is_remote_index_acquired};
pub use stats::{StatsDelta, StatsError};
pub use status::{upsert_index_info, FolderStatus};
