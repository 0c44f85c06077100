//! Simulated links with latency and loss injection.
//!
//! Both links hold messages in flight against the shared virtual clock. The
//! reliable link is lossless and ordered. The state-sync link models a net
//! update rate: the world calls [`SimStateLink::replicate`] every few ticks,
//! which ships the newest published value (if it changed) and may drop it.

use crate::context::SimContext;
use kart_env::{
    state_sync_channel, EnvError, LocalStatePublisher, LocalStateSubscriber, ReliableReceiver,
    ReliableSender, StateSyncPublisher, VehicleId,
};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// Conditions applied to one direction of traffic.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinkConditions {
    /// One-way delay
    pub latency: Duration,

    /// Drop probability per replicated packet (0.0 - 1.0); ignored by reliable links
    pub loss_rate: f64,
}

impl LinkConditions {
    pub fn new(latency: Duration, loss_rate: f64) -> Self {
        Self {
            latency,
            loss_rate: loss_rate.clamp(0.0, 1.0),
        }
    }

    pub fn with_latency_ms(latency_ms: u64) -> Self {
        Self::new(Duration::from_millis(latency_ms), 0.0)
    }

    pub fn with_loss(mut self, loss_rate: f64) -> Self {
        self.loss_rate = loss_rate.clamp(0.0, 1.0);
        self
    }
}

impl Default for LinkConditions {
    fn default() -> Self {
        Self::with_latency_ms(50)
    }
}

/// Traffic counters for one link.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LinkStats {
    pub packets_sent: u64,
    pub packets_dropped: u64,
    pub packets_delivered: u64,
}

struct InFlight<M> {
    deliver_at_ns: u64,
    vehicle: VehicleId,
    message: M,
}

/// Latent, lossless, in-order link carrying samples to the authority.
pub struct SimReliableLink<M> {
    context: Arc<SimContext>,
    conditions: LinkConditions,
    in_flight: Mutex<VecDeque<InFlight<M>>>,
    stats: Mutex<LinkStats>,
}

impl<M> SimReliableLink<M> {
    pub fn new(context: Arc<SimContext>, conditions: LinkConditions) -> Self {
        Self {
            context,
            conditions,
            in_flight: Mutex::new(VecDeque::new()),
            stats: Mutex::new(LinkStats::default()),
        }
    }

    /// Messages sent but not yet delivered.
    pub fn in_flight(&self) -> usize {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn stats(&self) -> LinkStats {
        *self.stats.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<M: Send> ReliableSender<M> for SimReliableLink<M> {
    fn send(&self, vehicle: VehicleId, message: M) -> Result<(), EnvError> {
        let deliver_at_ns = self.context.time_ns() + self.conditions.latency.as_nanos() as u64;

        self.in_flight
            .lock()
            .map_err(|_| EnvError::context("reliable link poisoned"))?
            .push_back(InFlight {
                deliver_at_ns,
                vehicle,
                message,
            });
        self.stats
            .lock()
            .map_err(|_| EnvError::context("reliable link poisoned"))?
            .packets_sent += 1;
        Ok(())
    }
}

impl<M> ReliableReceiver<M> for SimReliableLink<M> {
    fn try_recv(&mut self) -> Option<(VehicleId, M)> {
        let now = self.context.time_ns();
        let queue = self
            .in_flight
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);

        // Fixed latency keeps the queue sorted by delivery time
        if queue.front()?.deliver_at_ns > now {
            return None;
        }
        let InFlight {
            vehicle, message, ..
        } = queue.pop_front()?;

        self.stats
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .packets_delivered += 1;
        Some((vehicle, message))
    }
}

struct StateLinkInner<M> {
    latest: Option<M>,
    dirty: bool,
    in_flight: VecDeque<(u64, M)>,
    rng: ChaCha8Rng,
    stats: LinkStats,
}

/// Latent, lossy state-sync link to one subscriber.
///
/// Published values are held until the next [`replicate`](Self::replicate);
/// values superseded in between are never sent, like a property that changed
/// twice within one net update.
pub struct SimStateLink<M> {
    context: Arc<SimContext>,
    conditions: LinkConditions,
    inner: Mutex<StateLinkInner<M>>,
    delivered: LocalStatePublisher<M>,
}

impl<M: Clone + Send + Sync> SimStateLink<M> {
    /// Creates a link and the subscription its deliveries land in.
    pub fn new(
        context: Arc<SimContext>,
        conditions: LinkConditions,
        loss_seed: u64,
    ) -> (Self, LocalStateSubscriber<M>) {
        let (delivered, subscription) = state_sync_channel();
        let link = Self {
            context,
            conditions,
            inner: Mutex::new(StateLinkInner {
                latest: None,
                dirty: false,
                in_flight: VecDeque::new(),
                rng: ChaCha8Rng::seed_from_u64(loss_seed),
                stats: LinkStats::default(),
            }),
            delivered,
        };
        (link, subscription)
    }

    /// Ships the newest unsent value, subject to loss.
    ///
    /// Returns true if a packet was put in flight.
    pub fn replicate(&self) -> bool {
        let now = self.context.time_ns();
        let latency_ns = self.conditions.latency.as_nanos() as u64;
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);

        if !inner.dirty {
            return false;
        }
        inner.dirty = false;
        let Some(value) = inner.latest.clone() else {
            return false;
        };

        inner.stats.packets_sent += 1;
        if inner.rng.gen::<f64>() < self.conditions.loss_rate {
            inner.stats.packets_dropped += 1;
            return false;
        }

        inner.in_flight.push_back((now + latency_ns, value));
        true
    }

    /// Hands every due packet to the subscription; the last one wins.
    pub fn deliver_due(&self) -> usize {
        let now = self.context.time_ns();
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);

        let mut delivered = 0;
        while inner
            .in_flight
            .front()
            .is_some_and(|(deliver_at, _)| *deliver_at <= now)
        {
            if let Some((_, value)) = inner.in_flight.pop_front() {
                if self.delivered.publish(value).is_ok() {
                    delivered += 1;
                }
            }
        }
        inner.stats.packets_delivered += delivered as u64;
        delivered
    }

    pub fn stats(&self) -> LinkStats {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .stats
    }
}

impl<M: Clone + Send + Sync> StateSyncPublisher<M> for SimStateLink<M> {
    fn publish(&self, value: M) -> Result<(), EnvError> {
        let mut inner = self
            .inner
            .lock()
            .map_err(|_| EnvError::context("state link poisoned"))?;
        inner.latest = Some(value);
        inner.dirty = true;
        Ok(())
    }
}

/// Fans one authority's snapshots out to every client link.
pub struct SimBroadcast<M> {
    links: Vec<SimStateLink<M>>,
}

impl<M: Clone + Send + Sync> SimBroadcast<M> {
    pub fn new() -> Self {
        Self { links: Vec::new() }
    }

    /// Adds a link and returns its index.
    pub fn add_link(&mut self, link: SimStateLink<M>) -> usize {
        self.links.push(link);
        self.links.len() - 1
    }

    pub fn replicate(&self) {
        for link in &self.links {
            link.replicate();
        }
    }

    pub fn deliver_due(&self) {
        for link in &self.links {
            link.deliver_due();
        }
    }

    pub fn link(&self, index: usize) -> Option<&SimStateLink<M>> {
        self.links.get(index)
    }

    /// Counters summed over every link.
    pub fn stats(&self) -> LinkStats {
        self.links
            .iter()
            .map(SimStateLink::stats)
            .fold(LinkStats::default(), |acc, s| LinkStats {
                packets_sent: acc.packets_sent + s.packets_sent,
                packets_dropped: acc.packets_dropped + s.packets_dropped,
                packets_delivered: acc.packets_delivered + s.packets_delivered,
            })
    }
}

impl<M: Clone + Send + Sync> Default for SimBroadcast<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: Clone + Send + Sync> StateSyncPublisher<M> for SimBroadcast<M> {
    fn publish(&self, value: M) -> Result<(), EnvError> {
        for link in &self.links {
            link.publish(value.clone())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kart_env::StateSyncSubscriber;

    fn context() -> Arc<SimContext> {
        SimContext::shared(42)
    }

    #[test]
    fn test_reliable_link_holds_until_latency_elapses() {
        let ctx = context();
        let mut link = SimReliableLink::new(ctx.clone(), LinkConditions::with_latency_ms(100));
        let vehicle = VehicleId::from_seed(1);

        link.send(vehicle, 1u32).unwrap();
        assert!(link.try_recv().is_none());

        ctx.advance_time(Duration::from_millis(99));
        assert!(link.try_recv().is_none());

        ctx.advance_time(Duration::from_millis(1));
        assert_eq!(link.try_recv(), Some((vehicle, 1)));
        assert_eq!(link.stats().packets_delivered, 1);
    }

    #[test]
    fn test_reliable_link_preserves_order() {
        let ctx = context();
        let mut link = SimReliableLink::new(ctx.clone(), LinkConditions::with_latency_ms(10));
        let vehicle = VehicleId::from_seed(1);

        for i in 0..5u32 {
            link.send(vehicle, i).unwrap();
            ctx.advance_time(Duration::from_millis(1));
        }
        ctx.advance_time(Duration::from_millis(20));

        let received: Vec<u32> = std::iter::from_fn(|| link.try_recv().map(|(_, m)| m)).collect();
        assert_eq!(received, vec![0, 1, 2, 3, 4]);
        assert_eq!(link.in_flight(), 0);
    }

    #[test]
    fn test_state_link_sends_only_on_replicate() {
        let ctx = context();
        let (link, mut sub) = SimStateLink::new(ctx.clone(), LinkConditions::with_latency_ms(0), 7);

        link.publish(1u32).unwrap();
        link.publish(2u32).unwrap();
        link.deliver_due();
        assert_eq!(sub.poll_changed(), None);

        assert!(link.replicate());
        link.deliver_due();
        assert_eq!(sub.poll_changed(), Some(2));

        // Nothing new published since the last net update
        assert!(!link.replicate());
        assert_eq!(link.stats().packets_sent, 1);
    }

    #[test]
    fn test_state_link_applies_latency() {
        let ctx = context();
        let (link, mut sub) = SimStateLink::new(ctx.clone(), LinkConditions::with_latency_ms(50), 7);

        link.publish(9u32).unwrap();
        link.replicate();

        ctx.advance_time(Duration::from_millis(40));
        link.deliver_due();
        assert_eq!(sub.poll_changed(), None);

        ctx.advance_time(Duration::from_millis(10));
        link.deliver_due();
        assert_eq!(sub.poll_changed(), Some(9));
    }

    #[test]
    fn test_total_loss_drops_everything() {
        let ctx = context();
        let conditions = LinkConditions::with_latency_ms(0).with_loss(1.0);
        let (link, mut sub) = SimStateLink::new(ctx, conditions, 7);

        for i in 0..10u32 {
            link.publish(i).unwrap();
            link.replicate();
        }
        link.deliver_due();

        assert_eq!(sub.poll_changed(), None);
        assert_eq!(link.stats().packets_dropped, 10);
    }

    #[test]
    fn test_loss_is_seed_deterministic() {
        let run = |seed| {
            let ctx = context();
            let conditions = LinkConditions::with_latency_ms(0).with_loss(0.3);
            let (link, _sub) = SimStateLink::new(ctx, conditions, seed);
            for i in 0..200u32 {
                link.publish(i).unwrap();
                link.replicate();
            }
            link.stats().packets_dropped
        };

        assert_eq!(run(11), run(11));
        let dropped = run(11);
        assert!(dropped > 20 && dropped < 100, "dropped {}", dropped);
    }

    #[test]
    fn test_broadcast_reaches_every_link() {
        let ctx = context();
        let mut broadcast = SimBroadcast::new();
        let (a, mut sub_a) = SimStateLink::new(ctx.clone(), LinkConditions::with_latency_ms(0), 1);
        let (b, mut sub_b) = SimStateLink::new(ctx.clone(), LinkConditions::with_latency_ms(0), 2);
        broadcast.add_link(a);
        broadcast.add_link(b);

        broadcast.publish(5u32).unwrap();
        broadcast.replicate();
        broadcast.deliver_due();

        assert_eq!(sub_a.poll_changed(), Some(5));
        assert_eq!(sub_b.poll_changed(), Some(5));
        assert_eq!(broadcast.stats().packets_sent, 2);
    }
}
