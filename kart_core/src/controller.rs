//! The Controller - Local Predictor and Reconciler for the owning client.
//!
//! ```text
//!  tick():      controls -> InputSample -> advance() -> pending log -> reliable channel
//!  reconcile(): snapshot -> snap state -> prune log -> replay pending samples
//! ```
//!
//! The controller never waits for the authority. Reconciliation is the
//! acknowledgment mechanism: every snapshot names the last sample it applied,
//! everything up to it leaves the log and everything after it is replayed on
//! top of the authoritative state. A snapshot that acknowledges nothing newer
//! than the last one applied is ignored: the samples it would need for replay
//! have already been pruned.

use crate::config::VehicleConstants;
use crate::kinematics::{advance, CollisionQuery, OpenGround};
use crate::metrics::ReplicationMetrics;
use crate::sample_log::PendingSampleLog;
use crate::types::{AuthoritativeSnapshot, ControlInput, InputSample, KinematicState, PresentationFrame};
use kart_env::{EnvError, ReliableSender, StateSyncSubscriber, VehicleId};
use tracing::{debug, warn};

/// Outcome of one reconciliation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reconciliation {
    /// Samples dropped because the snapshot already covers them
    pub pruned: usize,
    /// Samples re-simulated on top of the snapshot
    pub replayed: usize,
    /// Distance between the predicted position before and after (m)
    pub correction: f64,
}

/// Controller role for one vehicle.
pub struct Controller<Q: CollisionQuery = OpenGround> {
    vehicle: VehicleId,
    constants: VehicleConstants,
    collision: Q,

    /// Predicted state, written only by tick() and reconcile()
    state: KinematicState,

    pending: PendingSampleLog,

    /// Timestamp acknowledged by the last snapshot reconciled against
    last_acked: Option<f64>,

    metrics: ReplicationMetrics,
}

impl<Q: CollisionQuery> Controller<Q> {
    pub fn new(
        vehicle: VehicleId,
        constants: VehicleConstants,
        collision: Q,
        initial: KinematicState,
    ) -> Self {
        Self {
            vehicle,
            constants,
            collision,
            state: initial,
            pending: PendingSampleLog::new(),
            last_acked: None,
            metrics: ReplicationMetrics::new(),
        }
    }

    /// Runs one local prediction tick.
    ///
    /// # Arguments
    /// * `controls` - Current input, saturated to [-1, 1]
    /// * `delta_time` - Simulated seconds this tick covers
    /// * `now` - Simulation clock, used as the sample timestamp
    ///
    /// # Returns
    /// The sample that was applied. It is logged for replay unless its
    /// timestamp is not after the newest pending one.
    pub fn tick(&mut self, controls: ControlInput, delta_time: f64, now: f64) -> InputSample {
        self.predict(controls, delta_time, now).0
    }

    /// [`tick`](Self::tick) and ship the sample over the reliable channel.
    ///
    /// A sample the log refused (timestamp not after the newest pending one)
    /// is applied locally but never sent: the authority must not apply a
    /// sample the controller cannot replay. The next snapshot removes the
    /// local drift.
    ///
    /// # Returns
    /// * `Ok(Some(sample))` - Sample logged and sent
    /// * `Ok(None)` - Sample applied locally only
    /// * `Err(EnvError)` - The reliable channel failed
    pub fn tick_and_send<S>(
        &mut self,
        controls: ControlInput,
        delta_time: f64,
        now: f64,
        link: &S,
    ) -> Result<Option<InputSample>, EnvError>
    where
        S: ReliableSender<InputSample> + ?Sized,
    {
        let (sample, logged) = self.predict(controls, delta_time, now);
        if !logged {
            return Ok(None);
        }
        link.send(self.vehicle, sample)?;
        self.metrics.samples_sent += 1;
        Ok(Some(sample))
    }

    fn predict(&mut self, controls: ControlInput, delta_time: f64, now: f64) -> (InputSample, bool) {
        let sample = InputSample::from_controls(controls.clamped(), delta_time, now);
        self.state = advance(&self.state, &self.constants, &sample, &self.collision);

        match self.pending.push(sample) {
            Ok(()) => (sample, true),
            Err(err) => {
                warn!(vehicle = %self.vehicle, "Sample not logged for replay: {}", err);
                (sample, false)
            }
        }
    }

    /// Re-derives the predicted state from an authoritative snapshot.
    ///
    /// Cost is linear in the number of pending samples. Returns `None`, and
    /// leaves the prediction untouched, when the snapshot acknowledges a
    /// sample no newer than the last reconciled one.
    pub fn reconcile(&mut self, snapshot: &AuthoritativeSnapshot) -> Option<Reconciliation> {
        let acked = snapshot.last_applied.timestamp;
        if let Some(last) = self.last_acked {
            // Negated so a NaN timestamp counts as stale
            if !(acked > last) {
                self.metrics.stale_snapshots += 1;
                debug!(vehicle = %self.vehicle, acked, last, "Ignored stale snapshot");
                return None;
            }
        }
        self.last_acked = Some(acked);

        let predicted = self.state.position();

        self.state = snapshot.state();
        let pruned = self.pending.clear_acknowledged(&snapshot.last_applied);

        for sample in self.pending.iter() {
            self.state = advance(&self.state, &self.constants, sample, &self.collision);
        }

        let replayed = self.pending.len();
        let correction = (self.state.position() - predicted).norm();
        self.metrics.record_reconciliation(replayed, correction);

        debug!(
            vehicle = %self.vehicle,
            acked,
            pruned,
            replayed,
            correction,
            "Reconciled with authority"
        );

        Some(Reconciliation {
            pruned,
            replayed,
            correction,
        })
    }

    /// Reconciles once if the subscription carries a snapshot not seen before.
    pub fn poll_snapshots<S>(&mut self, subscription: &mut S) -> Option<Reconciliation>
    where
        S: StateSyncSubscriber<AuthoritativeSnapshot> + ?Sized,
    {
        subscription
            .poll_changed()
            .and_then(|snapshot| self.reconcile(&snapshot))
    }

    /// Position, orientation and velocity for the presentation layer.
    pub fn presentation(&self) -> PresentationFrame {
        PresentationFrame::from(self.state)
    }

    pub fn vehicle(&self) -> VehicleId {
        self.vehicle
    }

    pub fn state(&self) -> &KinematicState {
        &self.state
    }

    pub fn pending(&self) -> &PendingSampleLog {
        &self.pending
    }

    pub fn constants(&self) -> &VehicleConstants {
        &self.constants
    }

    pub fn metrics(&self) -> &ReplicationMetrics {
        &self.metrics
    }
}
