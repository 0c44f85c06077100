//! Wire and state types shared by every role.
//!
//! World frame: +X forward, +Z up. Units are SI (m, s, kg, N).

use nalgebra::{Unit, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

/// Throttle/steering pair sampled from the input layer once per tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ControlInput {
    /// Forward drive request in [-1, 1] (negative = reverse)
    pub throttle: f64,
    /// Steering throw in [-1, 1] (positive = turn left about +Z)
    pub steering: f64,
}

impl ControlInput {
    pub fn new(throttle: f64, steering: f64) -> Self {
        Self { throttle, steering }
    }

    /// Saturates both axes to [-1, 1].
    pub fn clamped(self) -> Self {
        Self {
            throttle: self.throttle.clamp(-1.0, 1.0),
            steering: self.steering.clamp(-1.0, 1.0),
        }
    }
}

/// One tick of local input, the unit of prediction and replay.
///
/// Created once per controller tick and never mutated afterwards. The
/// `timestamp` doubles as the sample's identity in the pending log.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InputSample {
    pub throttle: f64,
    pub steering: f64,
    /// Simulated seconds this sample covers (> 0)
    pub delta_time: f64,
    /// Producer's monotonic simulation clock when the sample was captured
    pub timestamp: f64,
}

impl InputSample {
    pub fn new(throttle: f64, steering: f64, delta_time: f64, timestamp: f64) -> Self {
        Self {
            throttle,
            steering,
            delta_time,
            timestamp,
        }
    }

    /// Builds a sample from the current controls.
    pub fn from_controls(controls: ControlInput, delta_time: f64, timestamp: f64) -> Self {
        Self::new(controls.throttle, controls.steering, delta_time, timestamp)
    }

    /// Returns true if both control axes are within [-1, 1].
    pub fn is_valid(&self) -> bool {
        self.throttle.abs() <= 1.0 && self.steering.abs() <= 1.0
    }

    /// `is_valid()` plus a finite, positive time step and a finite timestamp.
    pub fn is_well_formed(&self) -> bool {
        self.is_valid()
            && self.delta_time.is_finite()
            && self.delta_time > 0.0
            && self.timestamp.is_finite()
    }
}

/// Position and orientation of a vehicle in the world frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub position: Vector3<f64>,
    pub orientation: UnitQuaternion<f64>,
}

impl Transform {
    pub fn new(position: Vector3<f64>, orientation: UnitQuaternion<f64>) -> Self {
        Self {
            position,
            orientation,
        }
    }

    /// Transform at `position` facing yaw `heading` radians about +Z.
    pub fn from_heading(position: Vector3<f64>, heading: f64) -> Self {
        Self::new(position, UnitQuaternion::from_axis_angle(&Vector3::z_axis(), heading))
    }

    /// Vehicle's forward axis (local +X) in world space.
    pub fn forward(&self) -> Vector3<f64> {
        self.orientation * Vector3::x()
    }

    /// Vehicle's up axis (local +Z) in world space.
    pub fn up(&self) -> Unit<Vector3<f64>> {
        self.orientation * Vector3::z_axis()
    }

    /// Yaw angle about +Z in radians.
    pub fn heading(&self) -> f64 {
        self.orientation.euler_angles().2
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::new(Vector3::zeros(), UnitQuaternion::identity())
    }
}

/// The state the Kinematic Integrator advances.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct KinematicState {
    /// Velocity in m/s (world frame)
    pub velocity: Vector3<f64>,
    pub transform: Transform,
}

impl KinematicState {
    pub fn new(velocity: Vector3<f64>, transform: Transform) -> Self {
        Self { velocity, transform }
    }

    /// A vehicle standing still at `transform`.
    pub fn at_rest(transform: Transform) -> Self {
        Self::new(Vector3::zeros(), transform)
    }

    pub fn position(&self) -> Vector3<f64> {
        self.transform.position
    }

    pub fn speed(&self) -> f64 {
        self.velocity.norm()
    }
}

/// Canonical motion state published by the Authority after each accepted sample.
///
/// Replicated latest-value-wins: a newer snapshot replaces the previous one
/// wholesale.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AuthoritativeSnapshot {
    /// The input sample whose application produced this state
    pub last_applied: InputSample,
    pub velocity: Vector3<f64>,
    pub transform: Transform,
}

impl AuthoritativeSnapshot {
    pub fn new(last_applied: InputSample, state: &KinematicState) -> Self {
        Self {
            last_applied,
            velocity: state.velocity,
            transform: state.transform,
        }
    }

    /// The kinematic state carried by this snapshot.
    pub fn state(&self) -> KinematicState {
        KinematicState::new(self.velocity, self.transform)
    }
}

/// Per-frame output handed to the presentation layer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PresentationFrame {
    pub position: Vector3<f64>,
    pub orientation: UnitQuaternion<f64>,
    pub velocity: Vector3<f64>,
}

impl From<KinematicState> for PresentationFrame {
    fn from(state: KinematicState) -> Self {
        Self {
            position: state.transform.position,
            orientation: state.transform.orientation,
            velocity: state.velocity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::FRAC_PI_2;

    #[test]
    fn test_sample_validity() {
        assert!(InputSample::new(1.0, -1.0, 0.016, 0.0).is_valid());
        assert!(InputSample::new(0.9, -0.5, 0.016, 0.0).is_valid());
        assert!(!InputSample::new(1.5, 0.0, 0.016, 0.0).is_valid());
        assert!(!InputSample::new(0.0, -1.01, 0.016, 0.0).is_valid());
        assert!(!InputSample::new(f64::NAN, 0.0, 0.016, 0.0).is_valid());
    }

    #[test]
    fn test_sample_well_formed() {
        assert!(InputSample::new(0.5, 0.5, 0.016, 1.0).is_well_formed());
        assert!(!InputSample::new(0.5, 0.5, 0.0, 1.0).is_well_formed());
        assert!(!InputSample::new(0.5, 0.5, -0.1, 1.0).is_well_formed());
        assert!(!InputSample::new(0.5, 0.5, f64::INFINITY, 1.0).is_well_formed());
    }

    #[test]
    fn test_controls_clamped() {
        let controls = ControlInput::new(3.0, -2.0).clamped();
        assert_eq!(controls, ControlInput::new(1.0, -1.0));
    }

    #[test]
    fn test_transform_axes() {
        let t = Transform::default();
        assert_relative_eq!(t.forward(), Vector3::x(), epsilon = 1e-12);
        assert_relative_eq!(t.up().into_inner(), Vector3::z(), epsilon = 1e-12);

        let turned = Transform::from_heading(Vector3::zeros(), FRAC_PI_2);
        assert_relative_eq!(turned.forward(), Vector3::y(), epsilon = 1e-12);
        assert_relative_eq!(turned.heading(), FRAC_PI_2, epsilon = 1e-12);
    }

    #[test]
    fn test_snapshot_round_trips_state() {
        let state = KinematicState::new(
            Vector3::new(3.0, 1.0, 0.0),
            Transform::from_heading(Vector3::new(5.0, 6.0, 0.0), 0.3),
        );
        let snapshot = AuthoritativeSnapshot::new(InputSample::new(1.0, 0.0, 0.1, 2.0), &state);
        assert_eq!(snapshot.state(), state);
    }

    #[test]
    fn test_snapshot_serializes() {
        let snapshot = AuthoritativeSnapshot::new(
            InputSample::new(0.5, 0.25, 0.016, 4.0),
            &KinematicState::default(),
        );
        let json = serde_json::to_string(&snapshot).unwrap();
        let back: AuthoritativeSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back.last_applied, snapshot.last_applied);
    }
}
