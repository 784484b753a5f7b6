//! Active outbound handle of a peer connection across reconnects.

use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

/// An outbound message handle that can tell whether it still works.
pub trait OutboundHandle: Send + Sync + 'static {
    /// Check if the other end has gone away.
    fn is_closed(&self) -> bool;
}

impl<T: Send + 'static> OutboundHandle for mpsc::Sender<T> {
    fn is_closed(&self) -> bool {
        mpsc::Sender::is_closed(self)
    }
}

impl<T: Send + 'static> OutboundHandle for mpsc::UnboundedSender<T> {
    fn is_closed(&self) -> bool {
        mpsc::UnboundedSender::is_closed(self)
    }
}

/// Tracks the latest outbound handle announced for one peer.
///
/// A background task swaps in each new handle as it arrives; the latest
/// one wins.
pub struct ConnectionHandleTracker<H: OutboundHandle> {
    current: Arc<Mutex<Option<H>>>,
    task: Option<JoinHandle<()>>,
}

impl<H: OutboundHandle> std::fmt::Debug for ConnectionHandleTracker<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionHandleTracker")
            .field(
                "tracking",
                &self.task.as_ref().is_some_and(|task| !task.is_finished()),
            )
            .finish()
    }
}

impl<H: OutboundHandle> ConnectionHandleTracker<H> {
    /// Start tracking handles from `handles`.
    pub fn spawn(mut handles: mpsc::Receiver<H>) -> Self {
        let current = Arc::new(Mutex::new(None));
        let slot = current.clone();

        let task = tokio::spawn(async move {
            while let Some(handle) = handles.recv().await {
                *slot.lock().await = Some(handle);
                tracing::debug!("Outbound connection handle replaced");
            }
        });

        Self {
            current,
            task: Some(task),
        }
    }

    /// Check if a handle is set and still open.
    pub async fn is_connected(&self) -> bool {
        self.current
            .lock()
            .await
            .as_ref()
            .is_some_and(|handle| !handle.is_closed())
    }

    /// The current handle, if it is still open.
    pub async fn current(&self) -> Option<H>
    where
        H: Clone,
    {
        self.current
            .lock()
            .await
            .as_ref()
            .filter(|handle| !handle.is_closed())
            .cloned()
    }

    /// Stop tracking and release the current handle.
    ///
    /// Handles announced after this returns are never picked up.
    pub async fn shutdown(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            // Wait for the task to exit so it cannot store a handle after
            // the slot is cleared.
            let _ = task.await;
        }
        self.current.lock().await.take();
    }
}

impl<H: OutboundHandle> Drop for ConnectionHandleTracker<H> {
    fn drop(&mut self) {
        if let Some(task) = &self.task {
            task.abort();
        }
    }
}
