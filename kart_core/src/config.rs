//! Per-vehicle physical constants.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid vehicle constant: {0}")]
    Invalid(String),

    #[error("Failed to parse vehicle config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Physical constants of one vehicle.
///
/// These are configuration, never shared mutable state: controller and
/// authority must hold identical copies or replay will diverge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VehicleConstants {
    /// Mass of the car (kg)
    pub mass: f64,

    /// Force applied to the car when throttle is full down (N)
    pub max_driving_force: f64,

    /// Minimum radius of the turning circle at full lock (m)
    pub min_turning_radius: f64,

    /// Higher means more drag
    pub drag_coefficient: f64,

    /// Higher means more rolling resistance
    pub rolling_resistance_coefficient: f64,

    /// Gravitational acceleration for the normal force (m/s²)
    pub gravity: f64,
}

impl Default for VehicleConstants {
    fn default() -> Self {
        Self {
            mass: 1000.0,
            max_driving_force: 10_000.0,
            min_turning_radius: 10.0,
            drag_coefficient: 16.0,
            rolling_resistance_coefficient: 0.015,
            gravity: 9.81,
        }
    }
}

impl VehicleConstants {
    /// Constants with air drag and rolling resistance switched off.
    pub fn frictionless() -> Self {
        Self {
            drag_coefficient: 0.0,
            rolling_resistance_coefficient: 0.0,
            ..Self::default()
        }
    }

    /// Parses constants from JSON. Missing fields fall back to defaults.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let constants: Self = serde_json::from_str(json)?;
        constants.validate()?;
        Ok(constants)
    }

    /// Checks that the constants describe a physically meaningful vehicle.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("mass", self.mass),
            ("min_turning_radius", self.min_turning_radius),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(ConfigError::Invalid(format!("{} must be positive, got {}", name, value)));
            }
        }

        let non_negative = [
            ("max_driving_force", self.max_driving_force),
            ("drag_coefficient", self.drag_coefficient),
            ("rolling_resistance_coefficient", self.rolling_resistance_coefficient),
            ("gravity", self.gravity),
        ];
        for (name, value) in non_negative {
            if !(value.is_finite() && value >= 0.0) {
                return Err(ConfigError::Invalid(format!("{} must be non-negative, got {}", name, value)));
            }
        }

        Ok(())
    }

    /// Speed at which full throttle is balanced by drag and rolling resistance.
    pub fn top_speed(&self) -> f64 {
        let rolling = self.rolling_resistance_coefficient * self.mass * self.gravity;
        let surplus = (self.max_driving_force - rolling).max(0.0);
        if self.drag_coefficient > 0.0 {
            (surplus / self.drag_coefficient).sqrt()
        } else {
            f64::INFINITY
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(VehicleConstants::default().validate().is_ok());
        assert!(VehicleConstants::frictionless().validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let constants = VehicleConstants::from_json_str(r#"{ "mass": 800.0 }"#).unwrap();
        assert_eq!(constants.mass, 800.0);
        assert_eq!(constants.max_driving_force, 10_000.0);
    }

    #[test]
    fn test_rejects_non_positive_mass() {
        let result = VehicleConstants::from_json_str(r#"{ "mass": 0.0 }"#);
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_rejects_malformed_json() {
        let result = VehicleConstants::from_json_str("{ mass: ");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_top_speed() {
        let constants = VehicleConstants::default();
        // (10000 - 147.15) / 16 = 615.8..., sqrt = 24.8 m/s
        assert!((constants.top_speed() - 24.82).abs() < 0.01);
        assert!(VehicleConstants::frictionless().top_speed().is_infinite());
    }
}
