//! Error types for index-store.

use index_core::BlockCheckError;
use index_types::IndexTypesError;
use std::path::PathBuf;

/// Storage layer errors.
///
/// Any of these returned from inside an [`IndexTransaction`] aborts it:
/// the caller drops the transaction without committing and SQLite rolls
/// back every write made so far.
///
/// [`IndexTransaction`]: crate::IndexTransaction
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Database error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A row the store relies on is missing or holds an impossible value.
    #[error("constraint violation: {reason}")]
    ConstraintViolation {
        /// What was violated.
        reason: String,
    },

    /// Stored bytes could not be encoded or decoded.
    #[error("decode error: {0}")]
    Decode(#[from] IndexTypesError),

    /// A block list does not match its file record.
    #[error("inconsistent blocks: {0}")]
    InvalidBlocks(#[from] BlockCheckError),

    /// A file name search pattern is not a valid regular expression.
    #[error("invalid search pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    /// Database path error.
    #[error("invalid database path: {path}")]
    InvalidPath {
        /// The invalid path.
        path: PathBuf,
    },
}

impl StorageError {
    /// Build a [`StorageError::ConstraintViolation`].
    pub fn constraint(reason: impl Into<String>) -> Self {
        Self::ConstraintViolation {
            reason: reason.into(),
        }
    }
}

/// Result type alias for storage operations.
pub type StorageResult<T> = std::result::Result<T, StorageError>;
