//! Virtual clock implementing KartContext for deterministic runs.

use kart_env::KartContext;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Simulation context backed by a manually advanced virtual clock.
///
/// Every role in a [`SimWorld`](crate::SimWorld) reads the same clock, so the
/// authority's notion of elapsed time and the controller's timestamps only
/// diverge if a controller lies about them. Clones share the clock.
#[derive(Debug, Clone)]
pub struct SimContext {
    seed: u64,

    /// Nanoseconds since the run started
    elapsed_ns: Arc<AtomicU64>,
}

impl SimContext {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            elapsed_ns: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Creates an Arc-wrapped context for sharing.
    pub fn shared(seed: u64) -> Arc<Self> {
        Arc::new(Self::new(seed))
    }

    /// Moves the clock forward. The only way simulated time passes.
    pub fn advance_time(&self, duration: Duration) {
        self.elapsed_ns
            .fetch_add(duration.as_nanos() as u64, Ordering::SeqCst);
    }

    /// Jumps the clock to an absolute reading.
    pub fn set_time(&self, time_ns: u64) {
        self.elapsed_ns.store(time_ns, Ordering::SeqCst);
    }

    pub fn time_ns(&self) -> u64 {
        self.elapsed_ns.load(Ordering::SeqCst)
    }
}

impl KartContext for SimContext {
    fn now(&self) -> Duration {
        Duration::from_nanos(self.time_ns())
    }

    fn seed(&self) -> u64 {
        self.seed
    }
}
