//! KartNet Replication Metrics
//! ===========================
//!
//! Counters each role keeps about its side of the protocol:
//! - **Authority**: accepted samples, rejections by kind, snapshots published
//! - **Controller**: samples sent, reconciliations, replay volume, corrections
//! - **Observer**: snapshot rebases, degenerate-span pins, presentation steps
//!
//! Controllers and observers both count snapshots they ignored as stale.
//!
//! A correction is the distance the predicted position moved when a
//! reconciliation re-derived it from a snapshot. With a deterministic
//! integrator and an honest controller it stays at zero.

use crate::authority::ValidationError;
use serde::Serialize;

/// Protocol counters for one role (or several, after [`merge`](Self::merge)).
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReplicationMetrics {
    /// Input samples handed to the reliable channel
    pub samples_sent: u64,
    /// Samples the authority validated and applied
    pub samples_accepted: u64,
    /// Samples rejected for out-of-range controls or bad time step
    pub invalid_samples: u64,
    /// Samples rejected for claiming more time than has elapsed
    pub temporal_violations: u64,
    /// Snapshots the authority put on the state-sync channel
    pub snapshots_published: u64,
    /// Reconciliations performed by the controller
    pub reconciliations: u64,
    /// Total samples re-simulated across all reconciliations
    pub samples_replayed: u64,
    /// Largest correction distance seen (m)
    pub max_correction: f64,
    /// Correction distance of the most recent reconciliation (m)
    pub last_correction: f64,
    /// Snapshots the observer rebased its spline on
    pub smoother_rebases: u64,
    /// Frames the observer pinned to the snapshot instead of interpolating
    pub smoother_pins: u64,
    /// Largest per-frame presented position change (m)
    pub max_presentation_step: f64,
    /// Snapshots ignored because a newer one was already applied
    pub stale_snapshots: u64,
}

impl ReplicationMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total rejected samples, all kinds.
    pub fn rejected(&self) -> u64 {
        self.invalid_samples + self.temporal_violations
    }

    pub fn record_rejection(&mut self, error: &ValidationError) {
        match error {
            ValidationError::InvalidInputSample { .. } => self.invalid_samples += 1,
            ValidationError::TemporalViolation { .. } => self.temporal_violations += 1,
        }
    }

    pub fn record_reconciliation(&mut self, replayed: usize, correction: f64) {
        self.reconciliations += 1;
        self.samples_replayed += replayed as u64;
        self.last_correction = correction;
        self.max_correction = self.max_correction.max(correction);
    }

    pub fn record_presentation_step(&mut self, step: f64) {
        self.max_presentation_step = self.max_presentation_step.max(step);
    }

    /// Mean number of samples replayed per reconciliation.
    pub fn mean_replay_depth(&self) -> f64 {
        if self.reconciliations > 0 {
            self.samples_replayed as f64 / self.reconciliations as f64
        } else {
            0.0
        }
    }

    /// Folds another role's counters into this one.
    pub fn merge(&mut self, other: &ReplicationMetrics) {
        self.samples_sent += other.samples_sent;
        self.samples_accepted += other.samples_accepted;
        self.invalid_samples += other.invalid_samples;
        self.temporal_violations += other.temporal_violations;
        self.snapshots_published += other.snapshots_published;
        self.reconciliations += other.reconciliations;
        self.samples_replayed += other.samples_replayed;
        self.max_correction = self.max_correction.max(other.max_correction);
        self.last_correction = other.last_correction;
        self.smoother_rebases += other.smoother_rebases;
        self.smoother_pins += other.smoother_pins;
        self.max_presentation_step = self.max_presentation_step.max(other.max_presentation_step);
        self.stale_snapshots += other.stale_snapshots;
    }
}
