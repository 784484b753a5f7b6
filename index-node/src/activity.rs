//! Liveness signal for an external supervisor.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Records when the pipeline last did any work.
///
/// Cheap to clone; all clones share the same timestamp.
#[derive(Debug, Clone)]
pub struct Activity {
    origin: Instant,
    last_millis: Arc<AtomicU64>,
}

impl Activity {
    /// Create a monitor that counts as active right now.
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            last_millis: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Mark the system active.
    pub fn mark(&self) {
        let elapsed = self.origin.elapsed().as_millis() as u64;
        self.last_millis.fetch_max(elapsed, Ordering::Relaxed);
    }

    /// Time since the last [`mark`](Self::mark).
    pub fn idle_for(&self) -> Duration {
        let last = Duration::from_millis(self.last_millis.load(Ordering::Relaxed));
        self.origin.elapsed().saturating_sub(last)
    }
}

impl Default for Activity {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn idle_time_resets_on_mark() {
        let activity = Activity::new();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(activity.idle_for() >= Duration::from_millis(50));

        activity.mark();
        assert!(activity.idle_for() < Duration::from_millis(50));
    }

    #[test]
    fn clones_share_state() {
        let activity = Activity::new();
        let clone = activity.clone();
        std::thread::sleep(Duration::from_millis(20));
        clone.mark();
        assert!(activity.idle_for() < Duration::from_millis(20));
    }
}
