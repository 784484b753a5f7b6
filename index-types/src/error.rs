//! Error types for bep-index data handling.

use thiserror::Error;

/// Errors that can occur while building or decoding index records.
#[derive(Debug, Error)]
pub enum IndexTypesError {
    /// MessagePack serialization failed
    #[error("serialization failed: {0}")]
    Serialization(#[source] rmp_serde::encode::Error),

    /// MessagePack deserialization failed (malformed update record)
    #[error("deserialization failed: {0}")]
    Deserialization(#[source] rmp_serde::decode::Error),

    /// Invalid data format
    #[error("invalid data: {0}")]
    InvalidData(String),
}
