//! Clock context trait for KartNet roles.

use std::time::Duration;

/// The central interface for reading time.
///
/// Every role (controller, authority, observer) stamps and validates input
/// samples against this clock, so swapping the implementation is all it takes
/// to move from real time to the deterministic simulation.
///
/// # Implementations
///
/// - **Production**: `SystemContext` - wraps `std::time::Instant`
/// - **Simulation**: `SimContext` - manually advanced virtual clock
pub trait KartContext: Send + Sync + 'static {
    /// Returns the current monotonic time since context creation.
    ///
    /// In simulation, this is the virtual clock time.
    fn now(&self) -> Duration;

    /// Returns `now()` as floating-point seconds, the unit used by
    /// input sample timestamps.
    fn now_secs(&self) -> f64 {
        self.now().as_secs_f64()
    }

    /// Returns the context's seed (for logging/debugging).
    ///
    /// In production, returns 0 (not seeded).
    fn seed(&self) -> u64;
}
