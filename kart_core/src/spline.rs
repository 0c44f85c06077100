//! Cubic Hermite segment used by the Remote Smoother.

use nalgebra::Vector3;

/// One cubic Hermite segment over normalized time `t ∈ [0, 1]`.
///
/// Derivatives are in position-per-normalized-time, i.e. a velocity scaled
/// by the segment's duration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HermiteSpline {
    pub start_position: Vector3<f64>,
    pub start_derivative: Vector3<f64>,
    pub target_position: Vector3<f64>,
    pub target_derivative: Vector3<f64>,
}

impl HermiteSpline {
    /// Builds a segment from endpoint positions and velocities over `span` seconds.
    pub fn from_velocities(
        start_position: Vector3<f64>,
        start_velocity: Vector3<f64>,
        target_position: Vector3<f64>,
        target_velocity: Vector3<f64>,
        span: f64,
    ) -> Self {
        Self {
            start_position,
            start_derivative: start_velocity * span,
            target_position,
            target_derivative: target_velocity * span,
        }
    }

    /// Position at normalized time `t`.
    pub fn position(&self, t: f64) -> Vector3<f64> {
        let t2 = t * t;
        let t3 = t2 * t;

        self.start_position * (2.0 * t3 - 3.0 * t2 + 1.0)
            + self.start_derivative * (t3 - 2.0 * t2 + t)
            + self.target_position * (-2.0 * t3 + 3.0 * t2)
            + self.target_derivative * (t3 - t2)
    }

    /// First derivative with respect to normalized time at `t`.
    pub fn derivative(&self, t: f64) -> Vector3<f64> {
        let t2 = t * t;

        self.start_position * (6.0 * t2 - 6.0 * t)
            + self.start_derivative * (3.0 * t2 - 4.0 * t + 1.0)
            + self.target_position * (-6.0 * t2 + 6.0 * t)
            + self.target_derivative * (3.0 * t2 - 2.0 * t)
    }
}
