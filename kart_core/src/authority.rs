//! The Authority - single source of truth for a vehicle's motion.
//!
//! Validates each incoming input sample, advances the canonical state with
//! the shared integrator and publishes the resulting snapshot. It never
//! consumes snapshots.
//!
//! # Anti-cheat
//!
//! The authority keeps its own running total of the time claimed by accepted
//! samples. A sample that would push that total past the authority's real
//! clock is claiming time that has not elapsed yet (speed hack / clock
//! forgery) and is rejected.

use crate::config::VehicleConstants;
use crate::kinematics::{advance, CollisionQuery, OpenGround};
use crate::metrics::ReplicationMetrics;
use crate::types::{AuthoritativeSnapshot, ControlInput, InputSample, KinematicState};
use kart_env::{EnvError, StateSyncPublisher, VehicleId};
use thiserror::Error;
use tracing::{debug, warn};

/// Why a sample was refused. Per-sample only, never fatal.
#[derive(Debug, Error, Clone, Copy, PartialEq)]
pub enum ValidationError {
    #[error("invalid input sample (throttle={throttle}, steering={steering}, delta_time={delta_time})")]
    InvalidInputSample {
        throttle: f64,
        steering: f64,
        delta_time: f64,
    },

    #[error("temporal violation: claimed clock {claimed:.4}s is ahead of authority clock {now:.4}s")]
    TemporalViolation { claimed: f64, now: f64 },
}

/// Authority role for one vehicle.
pub struct Authority<Q: CollisionQuery = OpenGround> {
    vehicle: VehicleId,
    constants: VehicleConstants,
    collision: Q,

    /// Canonical state
    state: KinematicState,

    /// Sum of `delta_time` over every applied sample, offset by the start time
    simulated_time: f64,

    latest: Option<AuthoritativeSnapshot>,
    metrics: ReplicationMetrics,
}

impl<Q: CollisionQuery> Authority<Q> {
    /// Creates an authority for `vehicle`.
    ///
    /// # Arguments
    /// * `start_time` - Authority clock reading when the controller began
    ///   producing samples; claimed time is measured from here
    pub fn new(
        vehicle: VehicleId,
        constants: VehicleConstants,
        collision: Q,
        initial: KinematicState,
        start_time: f64,
    ) -> Self {
        Self {
            vehicle,
            constants,
            collision,
            state: initial,
            simulated_time: start_time,
            latest: None,
            metrics: ReplicationMetrics::new(),
        }
    }

    /// Checks a sample against the authority clock without applying it.
    pub fn validate(&self, sample: &InputSample, now: f64) -> Result<(), ValidationError> {
        if !sample.is_well_formed() {
            return Err(ValidationError::InvalidInputSample {
                throttle: sample.throttle,
                steering: sample.steering,
                delta_time: sample.delta_time,
            });
        }

        let claimed = self.simulated_time + sample.delta_time;
        if claimed > now {
            return Err(ValidationError::TemporalViolation { claimed, now });
        }

        Ok(())
    }

    /// Validates and applies one sample from the controller.
    ///
    /// On rejection nothing changes: the clock is not advanced and no
    /// snapshot is produced.
    pub fn receive(&mut self, sample: InputSample, now: f64) -> Result<AuthoritativeSnapshot, ValidationError> {
        if let Err(err) = self.validate(&sample, now) {
            warn!(vehicle = %self.vehicle, timestamp = sample.timestamp, "Rejected input sample: {}", err);
            self.metrics.record_rejection(&err);
            return Err(err);
        }

        self.simulated_time += sample.delta_time;
        Ok(self.apply(sample))
    }

    /// [`receive`](Self::receive) followed by publishing the snapshot.
    ///
    /// # Returns
    /// * `Ok(Some(snapshot))` - Sample accepted and published
    /// * `Ok(None)` - Sample rejected (already logged and counted)
    /// * `Err(EnvError)` - The state-sync channel failed
    pub fn handle_sample<P>(
        &mut self,
        sample: InputSample,
        now: f64,
        publisher: &P,
    ) -> Result<Option<AuthoritativeSnapshot>, EnvError>
    where
        P: StateSyncPublisher<AuthoritativeSnapshot> + ?Sized,
    {
        match self.receive(sample, now) {
            Ok(snapshot) => {
                publisher.publish(snapshot)?;
                self.metrics.snapshots_published += 1;
                Ok(Some(snapshot))
            }
            Err(_) => Ok(None),
        }
    }

    /// Drives a vehicle controlled on the authority itself (listen server).
    ///
    /// No remote clock to police, so the sample is applied without validation.
    pub fn drive_locally<P>(
        &mut self,
        controls: ControlInput,
        delta_time: f64,
        now: f64,
        publisher: &P,
    ) -> Result<AuthoritativeSnapshot, EnvError>
    where
        P: StateSyncPublisher<AuthoritativeSnapshot> + ?Sized,
    {
        let sample = InputSample::from_controls(controls.clamped(), delta_time, now);
        self.simulated_time += delta_time;
        let snapshot = self.apply(sample);
        publisher.publish(snapshot)?;
        self.metrics.snapshots_published += 1;
        Ok(snapshot)
    }

    fn apply(&mut self, sample: InputSample) -> AuthoritativeSnapshot {
        self.state = advance(&self.state, &self.constants, &sample, &self.collision);
        let snapshot = AuthoritativeSnapshot::new(sample, &self.state);
        self.latest = Some(snapshot);
        self.metrics.samples_accepted += 1;

        debug!(
            vehicle = %self.vehicle,
            timestamp = sample.timestamp,
            speed = self.state.speed(),
            "Applied input sample"
        );

        snapshot
    }

    pub fn vehicle(&self) -> VehicleId {
        self.vehicle
    }

    pub fn state(&self) -> &KinematicState {
        &self.state
    }

    /// Authority-side running total of claimed time.
    pub fn simulated_time(&self) -> f64 {
        self.simulated_time
    }

    /// The most recently produced snapshot, if any sample was applied yet.
    pub fn latest_snapshot(&self) -> Option<&AuthoritativeSnapshot> {
        self.latest.as_ref()
    }

    pub fn constants(&self) -> &VehicleConstants {
        &self.constants
    }

    pub fn metrics(&self) -> &ReplicationMetrics {
        &self.metrics
    }
}
