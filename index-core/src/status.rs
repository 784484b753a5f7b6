//! Read-only folder status composite.
//!
//! A [`FolderStatus`] is rebuilt from the current stats and per-peer index
//! progress whenever either changes; it is never persisted.

use std::collections::{BTreeMap, HashMap};

use index_types::{FolderInfo, FolderStats, IndexInfo};
use serde::Serialize;

/// Merged view of one folder for presentation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FolderStatus {
    /// The configured folder.
    pub info: FolderInfo,
    /// Current aggregate counters.
    pub stats: FolderStats,
    /// Index progress of every known peer, one entry per device.
    pub index_info: Vec<IndexInfo>,
}

impl FolderStatus {
    /// Zero-valued status for a folder nothing is known about.
    pub fn dummy(folder: &str) -> Self {
        Self {
            info: FolderInfo::unlabeled(folder),
            stats: FolderStats::empty(folder),
            index_info: Vec::new(),
        }
    }

    /// Number of advertised peer records not applied yet, over all peers.
    pub fn missing_index_updates(&self) -> u64 {
        self.index_info
            .iter()
            .map(|info| info.max_sequence.saturating_sub(info.local_sequence))
            .sum()
    }

    /// Build the status map for all configured folders.
    ///
    /// Folders without a stats row get zero stats; folders without known
    /// peers get an empty progress list.
    pub fn build_all(
        folders: &[FolderInfo],
        stats: &HashMap<String, FolderStats>,
        index_info: &HashMap<String, Vec<IndexInfo>>,
    ) -> BTreeMap<String, FolderStatus> {
        folders
            .iter()
            .map(|info| {
                let status = FolderStatus {
                    info: info.clone(),
                    stats: stats
                        .get(&info.folder_id)
                        .cloned()
                        .unwrap_or_else(|| FolderStats::empty(info.folder_id.as_str())),
                    index_info: index_info.get(&info.folder_id).cloned().unwrap_or_default(),
                };
                (info.folder_id.clone(), status)
            })
            .collect()
    }

    /// Statuses ordered by folder label.
    pub fn sorted_by_label<'a>(
        statuses: impl IntoIterator<Item = &'a FolderStatus>,
    ) -> Vec<FolderStatus> {
        let mut list: Vec<FolderStatus> = statuses.into_iter().cloned().collect();
        list.sort_by(|a, b| a.info.label.cmp(&b.info.label));
        list
    }
}

/// Replace the entry for `updated.device_id` in `list`, or append it.
///
/// Keeps the list unique per device; the latest write wins.
pub fn upsert_index_info(list: &mut Vec<IndexInfo>, updated: IndexInfo) {
    list.retain(|info| info.device_id != updated.device_id);
    list.push(updated);
}
