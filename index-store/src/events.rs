//! Folder statistics change notifications.
//!
//! The repository owns a broadcast channel; every subscriber gets its own
//! receiver and unsubscribes by dropping it.

use index_types::FolderStats;
use tokio::sync::broadcast;

/// Capacity of the stats broadcast buffer.
///
/// A subscriber that falls further behind than this receives
/// `RecvError::Lagged` and should re-read stats from storage.
pub const STATS_EVENT_CAPACITY: usize = 1024;

/// Stats of every folder a committed transaction changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderStatsUpdated {
    /// The transaction cleared the whole index, including every peer's
    /// progress. `stats` then also lists the emptied folders.
    pub index_cleared: bool,
    /// Final stats per changed folder.
    pub stats: Vec<FolderStats>,
}

/// Publisher side of the stats subscription registry.
#[derive(Debug, Clone)]
pub(crate) struct StatsPublisher {
    sender: broadcast::Sender<FolderStatsUpdated>,
}

impl StatsPublisher {
    pub(crate) fn new() -> Self {
        let (sender, _) = broadcast::channel(STATS_EVENT_CAPACITY);
        Self { sender }
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<FolderStatsUpdated> {
        self.sender.subscribe()
    }

    pub(crate) fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Publish to current subscribers. Having none is not an error.
    pub(crate) fn publish(&self, event: FolderStatsUpdated) {
        let folders = event.stats.len();
        match self.sender.send(event) {
            Ok(count) => {
                tracing::debug!("Published stats for {} folders to {} subscribers", folders, count)
            }
            Err(_) => tracing::trace!("No stats subscribers"),
        }
    }
}
