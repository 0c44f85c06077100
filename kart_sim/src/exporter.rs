//! JSON exporter for replaying a run frame by frame.
//!
//! Each frame records what every role was showing at that tick, so the
//! controller's prediction, the authority's canonical pose and each
//! observer's smoothed pose can be plotted against each other.

use kart_core::PresentationFrame;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;

/// A single frame of simulation data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimFrame {
    /// Simulation time in seconds
    pub time_sec: f64,

    /// Canonical pose held by the authority
    pub authority: PoseRecord,

    /// Predicted pose on the owning client (absent when host-driven)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub controller: Option<PoseRecord>,

    /// Smoothed pose on each observer
    pub observers: Vec<PoseRecord>,

    /// Samples awaiting acknowledgment on the controller
    pub pending_samples: usize,

    /// Rejections and wall contacts raised since the previous frame
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub events: Vec<SimEvent>,
}

/// Position and heading of one presented vehicle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PoseRecord {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    /// Yaw about +Z (rad)
    pub heading: f64,
    pub speed: f64,
}

impl From<&PresentationFrame> for PoseRecord {
    fn from(frame: &PresentationFrame) -> Self {
        Self {
            x: frame.position.x,
            y: frame.position.y,
            z: frame.position.z,
            heading: frame.orientation.euler_angles().2,
            speed: frame.velocity.norm(),
        }
    }
}

/// Simulation event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimEvent {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
}

impl SimEvent {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            level: None,
        }
    }

    pub fn warn(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            level: Some("warn".to_string()),
        }
    }
}

/// Complete simulation export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimExport {
    /// Scenario name
    pub scenario: String,

    /// Seed used
    pub seed: u64,

    /// Duration in seconds
    pub duration_sec: f64,

    /// All frames
    pub frames: Vec<SimFrame>,

    /// Final results
    pub passed: bool,

    /// Largest reconciliation correction seen (m)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_correction: Option<f64>,
}

impl SimExport {
    /// Creates a new export container.
    pub fn new(scenario: &str, seed: u64) -> Self {
        Self {
            scenario: scenario.to_string(),
            seed,
            duration_sec: 0.0,
            frames: Vec::new(),
            passed: false,
            max_correction: None,
        }
    }

    /// Adds a frame.
    pub fn add_frame(&mut self, frame: SimFrame) {
        self.duration_sec = frame.time_sec;
        self.frames.push(frame);
    }

    /// Finalizes the export.
    pub fn finalize(&mut self, passed: bool, max_correction: Option<f64>) {
        self.passed = passed;
        self.max_correction = max_correction;
    }

    /// Writes to a JSON file.
    pub fn write_to_file(&self, path: &str) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use kart_core::{KinematicState, Transform};
    use nalgebra::Vector3;

    fn pose(x: f64) -> PoseRecord {
        PoseRecord {
            x,
            y: 0.0,
            z: 0.0,
            heading: 0.0,
            speed: 0.0,
        }
    }

    #[test]
    fn test_pose_from_frame() {
        let state = KinematicState::new(
            Vector3::new(3.0, 4.0, 0.0),
            Transform::from_heading(Vector3::new(1.0, 2.0, 0.0), 0.25),
        );
        let record = PoseRecord::from(&PresentationFrame::from(state));

        assert_eq!((record.x, record.y), (1.0, 2.0));
        assert_relative_eq!(record.heading, 0.25, epsilon = 1e-12);
        assert_relative_eq!(record.speed, 5.0, epsilon = 1e-12);
    }

    #[test]
    fn test_export_tracks_duration() {
        let mut export = SimExport::new("baseline", 7);
        for i in 1..=3 {
            export.add_frame(SimFrame {
                time_sec: i as f64 * 0.5,
                authority: pose(i as f64),
                controller: None,
                observers: vec![],
                pending_samples: 0,
                events: vec![],
            });
        }
        export.finalize(true, Some(0.0));

        assert_eq!(export.frames.len(), 3);
        assert_eq!(export.duration_sec, 1.5);
    }

    #[test]
    fn test_export_json_skips_empty_fields() {
        let mut export = SimExport::new("host_drive", 1);
        export.add_frame(SimFrame {
            time_sec: 0.1,
            authority: pose(0.0),
            controller: None,
            observers: vec![pose(0.0)],
            pending_samples: 0,
            events: vec![],
        });

        let json = serde_json::to_value(&export).unwrap();
        let frame = &json["frames"][0];
        assert!(frame.get("controller").is_none());
        assert!(frame.get("events").is_none());
        assert_eq!(json["scenario"], "host_drive");
    }
}
