//! Walled arena used as the simulation's collision scene.
//!
//! The arena is an axis-aligned rectangle centred on the origin with walls
//! on all four sides. Controller and authority hold identical copies, so
//! every sweep they run produces bit-identical outcomes.

use kart_core::{CollisionQuery, MoveOutcome, Transform};
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

/// Rectangular walled arena in the XY plane.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Arena {
    /// Distance from the origin to the walls along X (m)
    pub half_extent_x: f64,

    /// Distance from the origin to the walls along Y (m)
    pub half_extent_y: f64,
}

impl Arena {
    pub fn new(half_extent_x: f64, half_extent_y: f64) -> Self {
        Self {
            half_extent_x: half_extent_x.abs(),
            half_extent_y: half_extent_y.abs(),
        }
    }

    /// Square arena with the given half extent.
    pub fn square(half_extent: f64) -> Self {
        Self::new(half_extent, half_extent)
    }

    /// True if `position` lies inside the walls (boundary included).
    pub fn contains(&self, position: &Vector3<f64>) -> bool {
        position.x.abs() <= self.half_extent_x && position.y.abs() <= self.half_extent_y
    }

    /// Fraction of `displacement` that can be travelled before touching a wall.
    fn free_fraction(&self, from: &Vector3<f64>, displacement: &Vector3<f64>) -> f64 {
        let bounds = [self.half_extent_x, self.half_extent_y];
        let mut fraction: f64 = 1.0;

        for (axis, bound) in bounds.iter().enumerate() {
            let p = from[axis];
            let d = displacement[axis];

            if d > 0.0 && p + d > *bound {
                fraction = fraction.min((bound - p) / d);
            } else if d < 0.0 && p + d < -bound {
                fraction = fraction.min((-bound - p) / d);
            }
        }

        fraction.clamp(0.0, 1.0)
    }
}

impl Default for Arena {
    fn default() -> Self {
        Self::square(200.0)
    }
}

impl CollisionQuery for Arena {
    fn try_move(&self, from: &Transform, displacement: &Vector3<f64>) -> MoveOutcome {
        let target = from.position + displacement;
        if self.contains(&target) {
            return MoveOutcome {
                transform: Transform::new(target, from.orientation),
                hit: false,
            };
        }

        // Stop at the contact point, never a rounding error past the wall
        let fraction = self.free_fraction(&from.position, displacement);
        let mut contact = from.position + displacement * fraction;
        contact.x = contact.x.clamp(-self.half_extent_x, self.half_extent_x);
        contact.y = contact.y.clamp(-self.half_extent_y, self.half_extent_y);

        MoveOutcome {
            transform: Transform::new(contact, from.orientation),
            hit: true,
        }
    }
}
