//! In-process channel implementations backed by `tokio::sync`.
//!
//! - Reliable channel: unbounded `mpsc` (ordered, exactly-once)
//! - State sync: `watch` (latest value wins, one change edge per value)
//!
//! Both are usable without a runtime; only the non-blocking halves of the
//! tokio primitives are touched.

use crate::error::EnvError;
use crate::network::{ReliableReceiver, ReliableSender, StateSyncPublisher, StateSyncSubscriber};
use crate::types::VehicleId;
use tokio::sync::{mpsc, watch};

/// Creates a reliable, ordered in-process channel.
pub fn reliable_channel<M>() -> (LocalReliableSender<M>, LocalReliableReceiver<M>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (LocalReliableSender { tx }, LocalReliableReceiver { rx })
}

/// Creates a latest-value-wins in-process channel with no initial value.
pub fn state_sync_channel<M>() -> (LocalStatePublisher<M>, LocalStateSubscriber<M>) {
    let (tx, rx) = watch::channel(None);
    (LocalStatePublisher { tx }, LocalStateSubscriber { rx })
}

/// Sending half of [`reliable_channel`].
pub struct LocalReliableSender<M> {
    tx: mpsc::UnboundedSender<(VehicleId, M)>,
}

impl<M> Clone for LocalReliableSender<M> {
    fn clone(&self) -> Self {
        Self { tx: self.tx.clone() }
    }
}

impl<M: Send> ReliableSender<M> for LocalReliableSender<M> {
    fn send(&self, vehicle: VehicleId, message: M) -> Result<(), EnvError> {
        self.tx
            .send((vehicle, message))
            .map_err(|_| EnvError::closed("reliable channel"))
    }
}

/// Receiving half of [`reliable_channel`].
pub struct LocalReliableReceiver<M> {
    rx: mpsc::UnboundedReceiver<(VehicleId, M)>,
}

impl<M> ReliableReceiver<M> for LocalReliableReceiver<M> {
    fn try_recv(&mut self) -> Option<(VehicleId, M)> {
        self.rx.try_recv().ok()
    }
}

/// Publishing half of [`state_sync_channel`].
pub struct LocalStatePublisher<M> {
    tx: watch::Sender<Option<M>>,
}

impl<M> LocalStatePublisher<M> {
    /// Adds another subscriber. It starts out having seen the current value.
    pub fn subscribe(&self) -> LocalStateSubscriber<M> {
        LocalStateSubscriber { rx: self.tx.subscribe() }
    }
}

impl<M: Send + Sync> StateSyncPublisher<M> for LocalStatePublisher<M> {
    fn publish(&self, value: M) -> Result<(), EnvError> {
        // send_replace succeeds even with no live subscribers
        self.tx.send_replace(Some(value));
        Ok(())
    }
}

/// Subscribing half of [`state_sync_channel`].
pub struct LocalStateSubscriber<M> {
    rx: watch::Receiver<Option<M>>,
}

impl<M: Clone> StateSyncSubscriber<M> for LocalStateSubscriber<M> {
    fn poll_changed(&mut self) -> Option<M> {
        match self.rx.has_changed() {
            Ok(true) => self.rx.borrow_and_update().clone(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reliable_channel_preserves_order() {
        let (tx, mut rx) = reliable_channel();
        let id = VehicleId::from_seed(1);

        for i in 0..5 {
            tx.send(id, i).unwrap();
        }

        let received: Vec<i32> = std::iter::from_fn(|| rx.try_recv().map(|(_, m)| m)).collect();
        assert_eq!(received, vec![0, 1, 2, 3, 4]);
        assert!(rx.try_recv().is_none());
    }

    #[test]
    fn test_reliable_channel_closed() {
        let (tx, rx) = reliable_channel::<u32>();
        drop(rx);

        let result = tx.send(VehicleId::from_seed(1), 7);
        assert!(matches!(result, Err(EnvError::ChannelClosed(_))));
    }

    #[test]
    fn test_state_sync_latest_value_wins() {
        let (tx, mut rx) = state_sync_channel();

        assert_eq!(rx.poll_changed(), None);

        tx.publish(1).unwrap();
        tx.publish(2).unwrap();
        tx.publish(3).unwrap();

        // Only the latest value is visible, exactly once
        assert_eq!(rx.poll_changed(), Some(3));
        assert_eq!(rx.poll_changed(), None);

        tx.publish(4).unwrap();
        assert_eq!(rx.poll_changed(), Some(4));
    }

    #[test]
    fn test_state_sync_fan_out() {
        let (tx, mut first) = state_sync_channel();
        let mut second = tx.subscribe();

        tx.publish("snapshot").unwrap();

        assert_eq!(first.poll_changed(), Some("snapshot"));
        assert_eq!(second.poll_changed(), Some("snapshot"));
        assert_eq!(second.poll_changed(), None);
    }
}
