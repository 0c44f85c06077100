//! The Observer - Remote Smoother for vehicles this instance does not control.
//!
//! Snapshots arrive at a coarse, irregular rate. Between arrivals the
//! observer plays a cubic Hermite segment from where it was last *showing*
//! the vehicle to the newest snapshot, so the presented motion stays C1
//! continuous instead of teleporting.
//!
//! ```text
//!   arrival k-1          arrival k                    arrival k+1
//!       |<---- span ---->|<------ elapsed ------>|
//!                        start = presented frame
//!                        target = snapshot k
//!                        ratio = clamp(elapsed / span, 0, 1)
//! ```
//!
//! The measured span is the time between the last two arrivals; it converts
//! velocities into spline derivatives and back.

use crate::metrics::ReplicationMetrics;
use crate::spline::HermiteSpline;
use crate::types::{AuthoritativeSnapshot, KinematicState, PresentationFrame};
use kart_env::{StateSyncSubscriber, VehicleId};
use tracing::{debug, trace};

/// Spans shorter than this are treated as degenerate: no interpolation.
pub const MIN_SMOOTHING_SPAN: f64 = 1.0e-4;

/// Observer role for one remote vehicle.
pub struct Observer {
    vehicle: VehicleId,

    /// Seconds since the latest snapshot arrived
    time_since_update: f64,

    /// Seconds between the two most recent arrivals
    time_between_updates: f64,

    /// Presented frame at the moment the latest snapshot arrived
    start: PresentationFrame,

    /// Latest snapshot; the underlying actor is pinned here
    target: Option<AuthoritativeSnapshot>,

    presented: PresentationFrame,
    metrics: ReplicationMetrics,
}

impl Observer {
    /// Creates an observer presenting `initial` until the first snapshot.
    pub fn new(vehicle: VehicleId, initial: KinematicState) -> Self {
        let frame = PresentationFrame::from(initial);
        Self {
            vehicle,
            time_since_update: 0.0,
            time_between_updates: 0.0,
            start: frame,
            target: None,
            presented: frame,
            metrics: ReplicationMetrics::new(),
        }
    }

    /// Rebases the smoothing segment on a newly arrived snapshot.
    ///
    /// Returns `false` without touching the segment when the snapshot is not
    /// newer than the current target.
    pub fn on_snapshot(&mut self, snapshot: AuthoritativeSnapshot) -> bool {
        if let Some(target) = &self.target {
            let latest = target.last_applied.timestamp;
            // Negated so a NaN timestamp counts as stale
            if !(snapshot.last_applied.timestamp > latest) {
                self.metrics.stale_snapshots += 1;
                debug!(
                    vehicle = %self.vehicle,
                    timestamp = snapshot.last_applied.timestamp,
                    latest,
                    "Ignored stale snapshot"
                );
                return false;
            }
        }

        if self.target.is_some() {
            self.time_between_updates = self.time_since_update;
        } else {
            // First arrival: no predecessor to measure a span against, and
            // nothing was being shown yet
            self.time_between_updates = 0.0;
            self.presented = PresentationFrame::from(snapshot.state());
        }
        self.time_since_update = 0.0;

        self.start = self.presented;
        self.target = Some(snapshot);
        self.metrics.smoother_rebases += 1;

        trace!(
            vehicle = %self.vehicle,
            span = self.time_between_updates,
            timestamp = snapshot.last_applied.timestamp,
            "Observer rebased on snapshot"
        );
        true
    }

    /// Rebases once if the subscription carries a snapshot newer than the target.
    pub fn poll_snapshots<S>(&mut self, subscription: &mut S) -> bool
    where
        S: StateSyncSubscriber<AuthoritativeSnapshot> + ?Sized,
    {
        subscription
            .poll_changed()
            .is_some_and(|snapshot| self.on_snapshot(snapshot))
    }

    /// Advances the smoothing clock by one frame and returns what to show.
    pub fn advance(&mut self, delta_time: f64) -> PresentationFrame {
        self.time_since_update += delta_time;

        let Some(target) = self.target else {
            return self.presented;
        };

        let next = if self.time_between_updates < MIN_SMOOTHING_SPAN {
            // Degenerate span: pin to the latest snapshot
            self.metrics.smoother_pins += 1;
            PresentationFrame::from(target.state())
        } else {
            self.interpolate(&target)
        };

        self.metrics
            .record_presentation_step((next.position - self.presented.position).norm());
        self.presented = next;
        next
    }

    fn interpolate(&self, target: &AuthoritativeSnapshot) -> PresentationFrame {
        let span = self.time_between_updates;
        let ratio = (self.time_since_update / span).clamp(0.0, 1.0);
        let spline = self.spline(target);

        let target_orientation = target.transform.orientation;
        let orientation = self
            .start
            .orientation
            .try_slerp(&target_orientation, ratio, 1.0e-9)
            .unwrap_or(target_orientation);

        PresentationFrame {
            position: spline.position(ratio),
            orientation,
            velocity: spline.derivative(ratio) / span,
        }
    }

    /// Segment from the presented start frame to `target` over the measured span.
    pub fn spline(&self, target: &AuthoritativeSnapshot) -> HermiteSpline {
        HermiteSpline::from_velocities(
            self.start.position,
            self.start.velocity,
            target.transform.position,
            target.velocity,
            self.time_between_updates,
        )
    }

    pub fn vehicle(&self) -> VehicleId {
        self.vehicle
    }

    /// Frame produced by the most recent [`advance`](Self::advance).
    pub fn presentation(&self) -> PresentationFrame {
        self.presented
    }

    /// State of the underlying actor, pinned to the latest snapshot.
    pub fn actor_state(&self) -> Option<KinematicState> {
        self.target.map(|s| s.state())
    }

    pub fn latest_snapshot(&self) -> Option<&AuthoritativeSnapshot> {
        self.target.as_ref()
    }

    pub fn time_between_updates(&self) -> f64 {
        self.time_between_updates
    }

    pub fn metrics(&self) -> &ReplicationMetrics {
        &self.metrics
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{InputSample, Transform};
    use approx::assert_relative_eq;
    use nalgebra::Vector3;

    fn snapshot(timestamp: f64, x: f64, vx: f64, heading: f64) -> AuthoritativeSnapshot {
        let state = KinematicState::new(
            Vector3::new(vx, 0.0, 0.0),
            Transform::from_heading(Vector3::new(x, 0.0, 0.0), heading),
        );
        AuthoritativeSnapshot::new(InputSample::new(1.0, 0.0, 0.1, timestamp), &state)
    }

    fn observer() -> Observer {
        Observer::new(VehicleId::from_seed(2), KinematicState::default())
    }

    #[test]
    fn test_presents_initial_state_before_any_snapshot() {
        let mut observer = observer();
        let frame = observer.advance(0.1);
        assert_eq!(frame.position, Vector3::zeros());
        assert!(observer.latest_snapshot().is_none());
    }

    #[test]
    fn test_first_snapshot_is_pinned() {
        let mut observer = observer();
        observer.advance(0.5);

        observer.on_snapshot(snapshot(1.0, 10.0, 5.0, 0.0));
        let frame = observer.advance(0.05);

        assert_eq!(frame.position, Vector3::new(10.0, 0.0, 0.0));
        assert_eq!(observer.metrics().smoother_pins, 1);
        // Acquiring the vehicle is not a presentation step
        assert_eq!(observer.metrics().max_presentation_step, 0.0);
    }

    #[test]
    fn test_same_frame_arrivals_pin_to_latest() {
        let mut observer = observer();
        observer.on_snapshot(snapshot(1.0, 10.0, 5.0, 0.0));
        observer.advance(0.1);

        // Two arrivals with no frame in between: zero span
        observer.on_snapshot(snapshot(1.1, 10.5, 5.0, 0.0));
        observer.on_snapshot(snapshot(1.2, 11.0, 5.0, 0.0));
        let frame = observer.advance(0.05);

        assert_eq!(observer.time_between_updates(), 0.0);
        assert_eq!(frame.position, Vector3::new(11.0, 0.0, 0.0));
    }

    #[test]
    fn test_interpolates_between_snapshots() {
        let mut observer = observer();
        observer.on_snapshot(snapshot(1.0, 0.0, 10.0, 0.0));
        let pinned = observer.advance(0.1);
        assert_eq!(pinned.position.x, 0.0);

        // Next snapshot 0.1s later, 1m further on at constant 10 m/s
        observer.on_snapshot(snapshot(1.1, 1.0, 10.0, 0.0));
        let mid = observer.advance(0.05);

        assert_relative_eq!(observer.time_between_updates(), 0.1, epsilon = 1e-12);
        assert_relative_eq!(mid.position.x, 0.5, epsilon = 1e-9);
        assert_relative_eq!(mid.velocity.x, 10.0, epsilon = 1e-9);

        let end = observer.advance(0.05);
        assert_relative_eq!(end.position.x, 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_ratio_clamps_when_snapshots_are_late() {
        let mut observer = observer();
        observer.on_snapshot(snapshot(1.0, 0.0, 10.0, 0.0));
        observer.advance(0.1);
        observer.on_snapshot(snapshot(1.1, 1.0, 10.0, 0.0));

        // Far past the expected arrival: hold at the target, never overshoot
        for _ in 0..10 {
            observer.advance(0.1);
        }

        assert_relative_eq!(observer.presentation().position.x, 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_orientation_slerps() {
        let mut observer = observer();
        observer.on_snapshot(snapshot(1.0, 0.0, 0.0, 0.0));
        observer.advance(0.2);

        observer.on_snapshot(snapshot(1.2, 0.0, 0.0, 1.0));
        let frame = observer.advance(0.1);

        let heading = frame.orientation.euler_angles().2;
        assert_relative_eq!(heading, 0.5, epsilon = 1e-9);
    }

    #[test]
    fn test_rebase_starts_from_presented_frame() {
        let mut observer = observer();
        observer.on_snapshot(snapshot(1.0, 0.0, 10.0, 0.0));
        observer.advance(0.1);
        observer.on_snapshot(snapshot(1.1, 1.0, 10.0, 0.0));
        let shown = observer.advance(0.05);

        // Arrives mid-segment: the new curve must start where we are showing
        observer.on_snapshot(snapshot(1.2, 2.0, 10.0, 0.0));
        let spline = observer.spline(observer.latest_snapshot().unwrap());

        assert_eq!(spline.start_position, shown.position);
        assert_relative_eq!(observer.time_between_updates(), 0.05, epsilon = 1e-12);
    }

    #[test]
    fn test_actor_is_pinned_while_presentation_smooths() {
        let mut observer = observer();
        assert!(observer.actor_state().is_none());

        observer.on_snapshot(snapshot(1.0, 0.0, 10.0, 0.0));
        observer.advance(0.1);
        let latest = snapshot(1.1, 1.0, 10.0, 0.0);
        observer.on_snapshot(latest);
        observer.advance(0.04);

        assert_eq!(observer.actor_state(), Some(latest.state()));
        let shown = observer.presentation().position.x;
        assert!(shown > 0.0 && shown < 1.0, "presented x = {}", shown);
    }

    #[test]
    fn test_stale_snapshot_does_not_rebase() {
        let mut observer = observer();
        observer.on_snapshot(snapshot(1.0, 0.0, 10.0, 0.0));
        observer.advance(0.1);
        assert!(observer.on_snapshot(snapshot(1.2, 2.0, 10.0, 0.0)));
        let shown = observer.advance(0.05);

        // Late delivery of an older snapshot, then a duplicate of the newest
        assert!(!observer.on_snapshot(snapshot(1.1, 1.0, 10.0, 0.0)));
        assert!(!observer.on_snapshot(snapshot(1.2, 2.0, 10.0, 0.0)));

        assert_eq!(observer.latest_snapshot().unwrap().last_applied.timestamp, 1.2);
        assert_eq!(observer.metrics().smoother_rebases, 2);
        assert_eq!(observer.metrics().stale_snapshots, 2);
        // Segment timing is unaffected: the curve keeps moving forward
        let next = observer.advance(0.025);
        assert!(next.position.x > shown.position.x);
    }
}
