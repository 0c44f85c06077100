//! Pending Sample Log - the controller's record of unacknowledged input.

use crate::types::InputSample;
use std::collections::VecDeque;
use thiserror::Error;

/// Errors raised when appending to the log.
#[derive(Debug, Error, Clone, Copy, PartialEq)]
pub enum SampleLogError {
    #[error("sample at t={timestamp} is not newer than the latest logged sample at t={latest}")]
    OutOfOrder { timestamp: f64, latest: f64 },
}

/// Time-ordered input samples not yet acknowledged by the authority.
///
/// Timestamps are strictly increasing. The Local Predictor is the only
/// writer that appends; the Reconciler is the only one that prunes.
#[derive(Debug, Clone, Default)]
pub struct PendingSampleLog {
    samples: VecDeque<InputSample>,
}

impl PendingSampleLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a sample.
    ///
    /// Rejects samples whose timestamp is not strictly greater than the
    /// newest entry, which keeps entries unique by timestamp.
    pub fn push(&mut self, sample: InputSample) -> Result<(), SampleLogError> {
        if let Some(latest) = self.samples.back() {
            // Negated comparison so a NaN timestamp is rejected too
            if !(sample.timestamp > latest.timestamp) {
                return Err(SampleLogError::OutOfOrder {
                    timestamp: sample.timestamp,
                    latest: latest.timestamp,
                });
            }
        }
        self.samples.push_back(sample);
        Ok(())
    }

    /// Drops every sample the authority has already applied.
    ///
    /// Retains exactly the samples with `timestamp > acknowledged.timestamp`.
    /// Returns the number of samples removed.
    pub fn clear_acknowledged(&mut self, acknowledged: &InputSample) -> usize {
        let before = self.samples.len();
        while self
            .samples
            .front()
            .is_some_and(|s| s.timestamp <= acknowledged.timestamp)
        {
            self.samples.pop_front();
        }
        before - self.samples.len()
    }

    /// Iterates pending samples oldest first (replay order).
    pub fn iter(&self) -> impl Iterator<Item = &InputSample> {
        self.samples.iter()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Most recently appended sample.
    pub fn latest(&self) -> Option<&InputSample> {
        self.samples.back()
    }

    /// Oldest sample still awaiting acknowledgment.
    pub fn oldest(&self) -> Option<&InputSample> {
        self.samples.front()
    }

    /// Timestamps of the pending samples, oldest first.
    pub fn timestamps(&self) -> Vec<f64> {
        self.samples.iter().map(|s| s.timestamp).collect()
    }
}
