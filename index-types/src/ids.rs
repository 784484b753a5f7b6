//! Identity types for bep-index.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a peer device in the replication cluster.
///
/// Device ids are produced and verified by the transport layer; here they
/// are opaque strings (typically the dashed base32 form).
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DeviceId(String);

impl DeviceId {
    /// Create a DeviceId from its string form.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the string form of this DeviceId.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let short: String = self.0.chars().take(7).collect();
        write!(f, "DeviceId({})", short)
    }
}

impl From<&str> for DeviceId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Identifier of an index generation.
///
/// Sequence numbers are only comparable within the same generation. A peer
/// that resets its database advertises a fresh IndexId.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub struct IndexId(u64);

impl IndexId {
    /// Create an IndexId with the given value.
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    /// Create a new random IndexId.
    ///
    /// The top bit is cleared so the value survives a round trip through
    /// SQLite's signed 64-bit integers.
    pub fn random() -> Self {
        let mut bytes = [0u8; 8];
        getrandom::getrandom(&mut bytes).expect("getrandom failed");
        Self(u64::from_be_bytes(bytes) >> 1)
    }

    /// Get the numeric value of this IndexId.
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for IndexId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

impl fmt::Debug for IndexId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IndexId({:016x})", self.0)
    }
}

/// Opaque key of an entry in the overflow (temp) store.
///
/// UUID v4 format (16 bytes).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TempKey(uuid::Uuid);

impl TempKey {
    /// Create a new random TempKey.
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    /// Create a TempKey from raw bytes.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        uuid::Uuid::from_slice(bytes).ok().map(Self)
    }

    /// Get the raw bytes of this TempKey.
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl Default for TempKey {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TempKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for TempKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TempKey({})", self.0)
    }
}
