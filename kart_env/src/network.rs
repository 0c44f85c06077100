//! Transport abstractions for the two KartNet channels.

use crate::error::EnvError;
use crate::types::VehicleId;

/// Sending half of the reliable channel (controller → authority).
///
/// # Guarantees
///
/// Implementations deliver every message exactly once and in send order.
/// Delivery may be delayed arbitrarily; the sender never waits for an
/// acknowledgment.
///
/// ```text
/// Controller                 Channel                  Authority
///   |                           |                          |
///   |-- send(id, sample) ------>|                          |
///   |                           |-- [latency] ------------>|
///   |                           |                          |-- try_recv() -> sample
/// ```
pub trait ReliableSender<M>: Send + Sync {
    /// Queues `message` for delivery on behalf of `vehicle`.
    ///
    /// # Returns
    /// * `Ok(())` - Message queued for delivery
    /// * `Err(EnvError::ChannelClosed)` - The receiver is gone
    fn send(&self, vehicle: VehicleId, message: M) -> Result<(), EnvError>;
}

/// Receiving half of the reliable channel.
pub trait ReliableReceiver<M> {
    /// Returns the next delivered message, or `None` when nothing is pending.
    fn try_recv(&mut self) -> Option<(VehicleId, M)>;
}

/// Publishing half of the state-sync channel (authority → everyone).
///
/// Each publish replaces the previous value wholesale; intermediate values
/// may never be observed by a subscriber.
pub trait StateSyncPublisher<M>: Send + Sync {
    /// Replaces the replicated value.
    fn publish(&self, value: M) -> Result<(), EnvError>;
}

/// Subscribing half of the state-sync channel.
pub trait StateSyncSubscriber<M> {
    /// Returns the latest value if it changed since the previous call.
    ///
    /// Yields each distinct visible value at most once; stale values that
    /// were superseded before the poll are never returned.
    fn poll_changed(&mut self) -> Option<M>;
}
