//! Storage layer for index-store.
//!
//! Provides the transactional SQLite index repository and the overflow
//! store for spilled update batches.

mod index;
mod rows;
mod schema;
mod temp;

pub use index::{IndexTransaction, SqliteIndexRepository};
pub use temp::SqliteTempRepository;

use crate::error::StorageError;
use async_trait::async_trait;
use index_types::{IndexId, TempKey};

/// Generator of local sequence numbers for the current index generation.
///
/// Numbers are strictly increasing within one [`IndexId`]; clearing the
/// index starts a new generation at zero.
#[async_trait]
pub trait Sequencer: Send {
    /// The local index generation.
    async fn index_id(&mut self) -> Result<IndexId, StorageError>;

    /// The last sequence number handed out.
    async fn current_sequence(&mut self) -> Result<u64, StorageError>;

    /// Allocate and return the next sequence number.
    async fn next_sequence(&mut self) -> Result<u64, StorageError>;
}

/// Trait for overflow storage backends.
///
/// Entries are opaque byte strings. `pop` is pop-once: retrieving an entry
/// removes it, so concurrent callers never both receive the same entry.
/// `peek` reads an entry in place, so it keeps its position until removed.
#[async_trait]
pub trait TempRepository: Send + Sync {
    /// Store bytes under a fresh key.
    ///
    /// Returns the assigned key.
    async fn push(&self, data: &[u8]) -> Result<TempKey, StorageError>;

    /// Return the bytes stored under `key` without removing them.
    async fn peek(&self, key: &TempKey) -> Result<Option<Vec<u8>>, StorageError>;

    /// Remove and return the bytes stored under `key`.
    ///
    /// Returns `None` if there is no such entry (already popped).
    async fn pop(&self, key: &TempKey) -> Result<Option<Vec<u8>>, StorageError>;

    /// Keys of all stored entries, oldest first.
    async fn keys(&self) -> Result<Vec<TempKey>, StorageError>;
}
