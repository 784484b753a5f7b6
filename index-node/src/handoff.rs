//! Zero-capacity handoff between submitters and the single applier.
//!
//! The applier offers a one-shot slot each time it is ready for work. A
//! submitter that finds a slot waiting hands its item over directly; one
//! that does not gets the item back. Nothing is ever buffered.

use tokio::sync::{mpsc, oneshot, Mutex};

/// Create a connected giver/taker pair.
pub(crate) fn rendezvous<T>() -> (Giver<T>, Taker<T>) {
    let (slots_tx, slots_rx) = mpsc::channel(1);
    (
        Giver {
            slots: Mutex::new(slots_rx),
        },
        Taker { slots: slots_tx },
    )
}

/// Submitting side.
#[derive(Debug)]
pub(crate) struct Giver<T> {
    slots: Mutex<mpsc::Receiver<oneshot::Sender<T>>>,
}

impl<T> Giver<T> {
    /// Hand `item` over if the taker is waiting right now.
    ///
    /// Returns the item if nobody is ready, or if another giver is blocked
    /// in [`give`](Self::give).
    pub(crate) fn try_give(&self, item: T) -> Result<(), T> {
        let Ok(mut slots) = self.slots.try_lock() else {
            return Err(item);
        };

        let mut item = item;
        while let Ok(slot) = slots.try_recv() {
            match slot.send(item) {
                Ok(()) => return Ok(()),
                // Stale slot from a cancelled offer.
                Err(back) => item = back,
            }
        }
        Err(item)
    }

    /// Wait for the taker and hand `item` over.
    ///
    /// Returns the item if the taker is gone. Cancelling this future before
    /// it completes never loses the item to the taker.
    pub(crate) async fn give(&self, item: T) -> Result<(), T> {
        let mut slots = self.slots.lock().await;

        let mut item = item;
        while let Some(slot) = slots.recv().await {
            match slot.send(item) {
                Ok(()) => return Ok(()),
                Err(back) => item = back,
            }
        }
        Err(item)
    }
}

/// Receiving side.
#[derive(Debug)]
pub(crate) struct Taker<T> {
    slots: mpsc::Sender<oneshot::Sender<T>>,
}

impl<T> Taker<T> {
    /// Announce readiness for one item.
    ///
    /// Returns `None` if every giver is gone. To stop waiting without losing
    /// an item that arrived concurrently, `close` the returned receiver and
    /// then `try_recv` it.
    pub(crate) async fn offer(&self) -> Option<oneshot::Receiver<T>> {
        let (slot, receiver) = oneshot::channel();
        self.slots.send(slot).await.ok()?;
        Some(receiver)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn try_give_fails_without_waiting_taker() {
        let (giver, _taker) = rendezvous::<u32>();
        assert_eq!(giver.try_give(1), Err(1));
    }

    #[tokio::test]
    async fn try_give_succeeds_when_taker_offered() {
        let (giver, taker) = rendezvous::<u32>();
        let slot = taker.offer().await.unwrap();

        assert_eq!(giver.try_give(7), Ok(()));
        assert_eq!(slot.await.unwrap(), 7);
    }

    #[tokio::test]
    async fn give_waits_for_taker() {
        let (giver, taker) = rendezvous::<u32>();

        let handle = tokio::spawn(async move {
            let result = giver.give(5).await;
            (giver, result)
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!handle.is_finished());

        let slot = taker.offer().await.unwrap();
        assert_eq!(slot.await.unwrap(), 5);
        let (_giver, result) = handle.await.unwrap();
        assert_eq!(result, Ok(()));
    }

    #[tokio::test]
    async fn closed_offer_returns_item_to_giver() {
        let (giver, taker) = rendezvous::<u32>();
        let mut slot = taker.offer().await.unwrap();
        slot.close();

        assert_eq!(giver.try_give(3), Err(3));
    }

    #[tokio::test]
    async fn give_fails_once_taker_is_gone() {
        let (giver, taker) = rendezvous::<u32>();
        drop(taker);
        assert_eq!(giver.give(9).await, Err(9));
    }

    #[tokio::test]
    async fn item_sent_before_close_is_recoverable() {
        let (giver, taker) = rendezvous::<u32>();
        let mut slot = taker.offer().await.unwrap();
        giver.try_give(4).unwrap();

        slot.close();
        assert_eq!(slot.try_recv().unwrap(), 4);
    }
}
