//! Incremental folder statistics.
//!
//! Folder stats are never recomputed from a table scan. Each file record
//! write produces a [`StatsDelta`] from the old and new state of that one
//! path, which is then merged into the folder's current [`FolderStats`].
//!
//! A record counts towards the stats only while it is present and not
//! deleted; only live regular files contribute to `size`.

use index_types::{FileInfo, FolderStats};
use thiserror::Error;

/// Errors from merging a delta into folder stats.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StatsError {
    /// A counter would drop below zero.
    #[error("folder {folder}: {counter} would become negative ({current} {delta:+})")]
    Negative {
        /// Folder id.
        folder: String,
        /// Name of the counter.
        counter: &'static str,
        /// Value before the merge.
        current: u64,
        /// Delta that was applied.
        delta: i64,
    },

    /// A size or counter does not fit a signed 64-bit delta.
    #[error("folder {folder}: {counter} value {value} is out of range")]
    OutOfRange {
        /// Folder id.
        folder: String,
        /// Name of the counter.
        counter: &'static str,
        /// Offending value.
        value: u64,
    },
}

/// Signed change to a folder's counters caused by one record write.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsDelta {
    /// Change in live file count.
    pub file_count: i64,
    /// Change in live directory count.
    pub dir_count: i64,
    /// Change in total live file size.
    pub size: i64,
}

impl StatsDelta {
    /// Compute the delta for replacing `old` (absent if `None`) with `new`.
    ///
    /// # Errors
    ///
    /// Returns [`StatsError::OutOfRange`] if a file size does not fit the
    /// signed delta.
    pub fn between(old: Option<&FileInfo>, new: &FileInfo) -> Result<Self, StatsError> {
        let mut delta = Self::default();

        if let Some(old) = old.filter(|o| !o.deleted) {
            delta.count(old, -1)?;
        }
        if !new.deleted {
            delta.count(new, 1)?;
        }

        Ok(delta)
    }

    fn count(&mut self, info: &FileInfo, sign: i64) -> Result<(), StatsError> {
        if !info.is_file() {
            self.dir_count += sign;
            return Ok(());
        }

        let raw = info.size.unwrap_or(0);
        let out_of_range = || StatsError::OutOfRange {
            folder: info.folder.clone(),
            counter: "size",
            value: raw,
        };
        let size = i64::try_from(raw).map_err(|_| out_of_range())?;
        self.file_count += sign;
        self.size = self
            .size
            .checked_add(sign * size)
            .ok_or_else(out_of_range)?;
        Ok(())
    }

    /// Check if the delta changes nothing.
    pub fn is_zero(&self) -> bool {
        *self == Self::default()
    }

    /// Merge this delta into `current` (or zero stats if `None`).
    ///
    /// `last_update` becomes the later of the stored value and
    /// `modified_at`.
    ///
    /// # Errors
    ///
    /// Returns [`StatsError::Negative`] if any counter would go below zero,
    /// which means the stored stats and file rows disagree.
    pub fn apply(
        &self,
        folder: &str,
        current: Option<&FolderStats>,
        modified_at: i64,
    ) -> Result<FolderStats, StatsError> {
        let base = current
            .cloned()
            .unwrap_or_else(|| FolderStats::empty(folder));

        Ok(FolderStats {
            file_count: add_signed(folder, "file_count", base.file_count, self.file_count)?,
            dir_count: add_signed(folder, "dir_count", base.dir_count, self.dir_count)?,
            size: add_signed(folder, "size", base.size, self.size)?,
            last_update: base.last_update.max(modified_at),
            folder: base.folder,
        })
    }
}

fn add_signed(
    folder: &str,
    counter: &'static str,
    current: u64,
    delta: i64,
) -> Result<u64, StatsError> {
    current
        .checked_add_signed(delta)
        .ok_or_else(|| StatsError::Negative {
            folder: folder.to_string(),
            counter,
            current,
            delta,
        })
}
