//! Production implementation of KartContext using the system clock.

use crate::KartContext;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Production context backed by the monotonic system clock.
///
/// This is the "real" implementation used outside of simulation.
pub struct SystemContext {
    /// Start time for monotonic duration calculations
    start: Instant,
}

impl SystemContext {
    /// Creates a new SystemContext.
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Creates an Arc-wrapped context for sharing across roles.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

impl Default for SystemContext {
    fn default() -> Self {
        Self::new()
    }
}

impl KartContext for SystemContext {
    fn now(&self) -> Duration {
        self.start.elapsed()
    }

    fn seed(&self) -> u64 {
        // Production is not seeded
        0
    }
}
