//! Error types for bep-index-node.

use crate::config::ConfigError;
use index_store::StorageError;
use index_types::IndexTypesError;

/// Errors from submitting or applying an index update.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Storage error, including constraint violations that aborted the
    /// update's transaction.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// An update could not be encoded for, or decoded from, the overflow
    /// store.
    #[error("decode error: {0}")]
    Decode(#[from] IndexTypesError),

    /// The pipeline stopped before the update was applied.
    #[error("pipeline is shut down")]
    Shutdown,
}

/// Top-level error type for the node binary.
#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Storage error.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Pipeline error.
    #[error("pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
