//! The Kinematic Integrator
//!
//! One explicit Euler step of a single rigid-body, ground-plane vehicle.
//! Controller, Authority and replay all run exactly this function, so its
//! output must depend on nothing but its arguments.
//!
//! Forces modelled per step:
//! - Driving force along the current forward axis, `max_driving_force * throttle`
//! - Quadratic air drag, `drag_coefficient * |v|²` opposing velocity
//! - Rolling resistance, `rolling_resistance_coefficient * mass * g` opposing velocity

use crate::config::VehicleConstants;
use crate::types::{InputSample, KinematicState, Transform};
use nalgebra::{UnitQuaternion, Vector3};
use std::sync::Arc;

/// Below this speed the direction of travel is undefined and resistance is zero.
const SAFE_NORMAL_EPSILON: f64 = 1.0e-8;

/// Result of sweeping a transform through a displacement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MoveOutcome {
    /// Where the vehicle ended up (stopped at the contact point on a hit)
    pub transform: Transform,
    /// True if the sweep was blocked by scene geometry
    pub hit: bool,
}

/// Scene collision seam supplied by the physics/scene module.
///
/// Implementations must be deterministic: the same query on controller and
/// authority has to produce the same outcome.
pub trait CollisionQuery {
    fn try_move(&self, from: &Transform, displacement: &Vector3<f64>) -> MoveOutcome;
}

/// Unbounded flat ground: nothing is ever hit.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenGround;

impl CollisionQuery for OpenGround {
    fn try_move(&self, from: &Transform, displacement: &Vector3<f64>) -> MoveOutcome {
        MoveOutcome {
            transform: Transform::new(from.position + displacement, from.orientation),
            hit: false,
        }
    }
}

impl<T: CollisionQuery + ?Sized> CollisionQuery for Arc<T> {
    fn try_move(&self, from: &Transform, displacement: &Vector3<f64>) -> MoveOutcome {
        (**self).try_move(from, displacement)
    }
}

impl<T: CollisionQuery + ?Sized> CollisionQuery for &T {
    fn try_move(&self, from: &Transform, displacement: &Vector3<f64>) -> MoveOutcome {
        (**self).try_move(from, displacement)
    }
}

/// Advances `state` by one input sample.
///
/// # Arguments
/// * `state` - Current velocity and transform
/// * `constants` - The vehicle's physical constants
/// * `sample` - Throttle, steering and time step to apply
/// * `collision` - Scene query used to sweep the displacement
///
/// # Returns
/// The next state. If the sweep hits geometry the velocity is zeroed, the
/// model's only discontinuity.
pub fn advance<Q: CollisionQuery + ?Sized>(
    state: &KinematicState,
    constants: &VehicleConstants,
    sample: &InputSample,
    collision: &Q,
) -> KinematicState {
    let dt = sample.delta_time;
    let forward = state.transform.forward();
    let up = state.transform.up();

    // Step 1: Net force -> acceleration -> velocity (explicit Euler)
    let force = forward * constants.max_driving_force * sample.throttle
        + air_resistance(&state.velocity, constants)
        + rolling_resistance(&state.velocity, constants);
    let acceleration = force / constants.mass;
    let mut velocity = state.velocity + acceleration * dt;

    // Step 2: Steering as a yaw proportional to distance travelled along the heading
    let distance_along_heading = forward.dot(&velocity) * dt;
    let rotation_angle = distance_along_heading / constants.min_turning_radius * sample.steering;
    let rotation_delta = UnitQuaternion::from_axis_angle(&up, rotation_angle);
    velocity = rotation_delta * velocity;
    let rotated = Transform::new(
        state.transform.position,
        rotation_delta * state.transform.orientation,
    );

    // Step 3: Sweep the displacement through the scene
    let outcome = collision.try_move(&rotated, &(velocity * dt));
    if outcome.hit {
        velocity = Vector3::zeros();
    }

    KinematicState::new(velocity, outcome.transform)
}

/// Quadratic drag opposing the direction of travel.
pub fn air_resistance(velocity: &Vector3<f64>, constants: &VehicleConstants) -> Vector3<f64> {
    -safe_normal(velocity) * velocity.norm_squared() * constants.drag_coefficient
}

/// Speed-independent rolling resistance opposing the direction of travel.
pub fn rolling_resistance(velocity: &Vector3<f64>, constants: &VehicleConstants) -> Vector3<f64> {
    let normal_force = constants.mass * constants.gravity;
    -safe_normal(velocity) * constants.rolling_resistance_coefficient * normal_force
}

fn safe_normal(v: &Vector3<f64>) -> Vector3<f64> {
    v.try_normalize(SAFE_NORMAL_EPSILON).unwrap_or_else(Vector3::zeros)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    /// Blocks every move: the vehicle stays where it is.
    struct Wall;

    impl CollisionQuery for Wall {
        fn try_move(&self, from: &Transform, _displacement: &Vector3<f64>) -> MoveOutcome {
            MoveOutcome {
                transform: *from,
                hit: true,
            }
        }
    }

    #[test]
    fn test_full_throttle_from_rest() {
        // 10000 N / 1000 kg = 10 m/s², for 0.1 s
        let constants = VehicleConstants::frictionless();
        let sample = InputSample::new(1.0, 0.0, 0.1, 10.0);

        let next = advance(&KinematicState::default(), &constants, &sample, &OpenGround);

        assert_relative_eq!(next.velocity, Vector3::new(1.0, 0.0, 0.0), epsilon = 1e-12);
        assert_relative_eq!(next.transform.position, Vector3::new(0.1, 0.0, 0.0), epsilon = 1e-12);
    }

    #[test]
    fn test_rest_stays_at_rest() {
        let constants = VehicleConstants::default();
        let sample = InputSample::new(0.0, 1.0, 0.016, 0.0);

        let next = advance(&KinematicState::default(), &constants, &sample, &OpenGround);

        assert_eq!(next.velocity, Vector3::zeros());
        assert_eq!(next.transform, Transform::default());
    }

    #[test]
    fn test_resistance_decelerates() {
        let constants = VehicleConstants::default();
        let state = KinematicState::new(Vector3::new(10.0, 0.0, 0.0), Transform::default());
        let sample = InputSample::new(0.0, 0.0, 0.1, 0.0);

        let next = advance(&state, &constants, &sample, &OpenGround);

        // drag 16 * 100 = 1600 N, rolling 0.015 * 1000 * 9.81 = 147.15 N
        let expected = 10.0 - (1600.0 + 147.15) / 1000.0 * 0.1;
        assert_relative_eq!(next.velocity.x, expected, epsilon = 1e-9);
        assert_relative_eq!(next.velocity.y, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_steering_turns_velocity_and_orientation() {
        let constants = VehicleConstants::frictionless();
        let state = KinematicState::new(Vector3::new(10.0, 0.0, 0.0), Transform::default());
        let sample = InputSample::new(0.0, 1.0, 0.1, 0.0);

        let next = advance(&state, &constants, &sample, &OpenGround);

        // 10 m/s * 0.1 s / 10 m radius = 0.1 rad of yaw
        assert_relative_eq!(next.transform.heading(), 0.1, epsilon = 1e-12);
        assert_relative_eq!(next.velocity.x, 10.0 * 0.1f64.cos(), epsilon = 1e-9);
        assert_relative_eq!(next.velocity.y, 10.0 * 0.1f64.sin(), epsilon = 1e-9);
        assert_relative_eq!(next.velocity.norm(), 10.0, epsilon = 1e-9);
    }

    #[test]
    fn test_reverse_steers_the_other_way() {
        let constants = VehicleConstants::frictionless();
        let state = KinematicState::new(Vector3::new(-10.0, 0.0, 0.0), Transform::default());
        let sample = InputSample::new(0.0, 1.0, 0.1, 0.0);

        let next = advance(&state, &constants, &sample, &OpenGround);

        assert!(next.transform.heading() < 0.0);
    }

    #[test]
    fn test_collision_zeroes_velocity() {
        let constants = VehicleConstants::default();
        let state = KinematicState::new(Vector3::new(20.0, 0.0, 0.0), Transform::default());
        let sample = InputSample::new(1.0, 0.0, 0.016, 0.0);

        let next = advance(&state, &constants, &sample, &Wall);

        assert_eq!(next.velocity, Vector3::zeros());
        assert_eq!(next.transform.position, Vector3::zeros());
    }

    proptest! {
        #[test]
        fn prop_advance_is_deterministic(
            throttle in -1.0f64..=1.0,
            steering in -1.0f64..=1.0,
            dt in 0.001f64..0.1,
            vx in -30.0f64..30.0,
            vy in -30.0f64..30.0,
            heading in -3.1f64..3.1,
        ) {
            let constants = VehicleConstants::default();
            let state = KinematicState::new(
                Vector3::new(vx, vy, 0.0),
                Transform::from_heading(Vector3::new(1.0, 2.0, 0.0), heading),
            );
            let sample = InputSample::new(throttle, steering, dt, 0.0);

            let a = advance(&state, &constants, &sample, &OpenGround);
            let b = advance(&state, &constants, &sample, &OpenGround);

            prop_assert_eq!(a, b);
            prop_assert!(a.velocity.iter().all(|c| c.is_finite()));
            // Ground-plane vehicle never leaves z = 0
            prop_assert!(a.transform.position.z.abs() < 1e-9);
        }
    }
}
