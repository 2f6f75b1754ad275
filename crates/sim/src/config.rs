//! Tuning for the character simulation.
//!
//! Every struct deserializes with `#[serde(default)]`, so a config file only
//! needs the fields it overrides.

use glam::Vec3;
use serde::{Deserialize, Serialize};
use vantage_geom::Layers;

/// One sphere of the multi-sphere character shape.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CollisionSphere {
    /// Distance of the sphere center above the controller origin.
    pub offset: f32,
    #[serde(default)]
    pub is_feet: bool,
    #[serde(default)]
    pub is_head: bool,
}

impl CollisionSphere {
    pub const fn feet(offset: f32) -> Self {
        Self {
            offset,
            is_feet: true,
            is_head: false,
        }
    }

    pub const fn body(offset: f32) -> Self {
        Self {
            offset,
            is_feet: false,
            is_head: false,
        }
    }

    pub const fn head(offset: f32) -> Self {
        Self {
            offset,
            is_feet: false,
            is_head: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    pub radius: f32,
    pub spheres: Vec<CollisionSphere>,
    /// Upper bound on pushback passes per tick. Residual penetration after
    /// the last pass is accepted.
    pub max_pushback_iterations: u32,
    /// Contacts shallower than this are treated as resting, not penetrating.
    pub pushback_skin: f32,
    pub walkable: Layers,
    pub up: Vec3,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            radius: 0.5,
            spheres: vec![
                CollisionSphere::feet(0.5),
                CollisionSphere::body(1.0),
                CollisionSphere::head(1.5),
            ],
            max_pushback_iterations: 2,
            pushback_skin: 1e-4,
            walkable: Layers::WALKABLE,
            up: Vec3::Y,
        }
    }
}

/// Ground probe distances and steady-ground thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    pub tolerance: f32,
    pub tiny_tolerance: f32,
    /// Surface angle, in degrees, at which the steady-ground ratio reaches
    /// its maximum.
    pub grounding_upper_bound_angle: f32,
    pub grounding_min_percent_from_center: f32,
    pub grounding_max_percent_from_center: f32,
    pub max_cast_distance: f32,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            tolerance: 0.05,
            tiny_tolerance: 0.01,
            grounding_upper_bound_angle: 60.0,
            grounding_min_percent_from_center: 0.5,
            grounding_max_percent_from_center: 0.85,
            max_cast_distance: 1000.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MotorConfig {
    pub walk_speed: f32,
    pub run_speed: f32,
    /// Downward acceleration in units/s².
    pub gravity: f32,
    pub jump_height: f32,
    /// Ground tolerance used when landing or starting a jump.
    pub acquire_ground_tolerance: f32,
    /// Ground tolerance used to stay grounded while walking.
    pub maintain_ground_tolerance: f32,
}

impl Default for MotorConfig {
    fn default() -> Self {
        Self {
            walk_speed: 6.0,
            run_speed: 8.0,
            gravity: 9.0,
            jump_height: 8.0,
            acquire_ground_tolerance: 0.01,
            maintain_ground_tolerance: 0.5,
        }
    }
}

impl MotorConfig {
    /// Initial upward speed of a jump.
    pub fn jump_velocity(&self) -> f32 {
        (0.5 * self.jump_height * self.gravity).sqrt()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub tick_rate_hz: u32,
    pub controller: ControllerConfig,
    pub probe: ProbeConfig,
    pub motor: MotorConfig,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            tick_rate_hz: 50,
            controller: ControllerConfig::default(),
            probe: ProbeConfig::default(),
            motor: MotorConfig::default(),
        }
    }
}

impl SimConfig {
    /// Fixed timestep in seconds.
    ///
    /// # Panics
    /// If `tick_rate_hz` is zero.
    pub fn dt(&self) -> f32 {
        assert!(self.tick_rate_hz > 0, "tick_rate_hz must be positive");
        1.0 / self.tick_rate_hz as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SimConfig::default();
        assert_eq!(config.tick_rate_hz, 50);
        assert_eq!(config.dt(), 0.02);
        assert_eq!(config.controller.spheres.len(), 3);
        assert!(config.controller.spheres[0].is_feet);
        assert!(config.controller.spheres[2].is_head);
        assert_eq!(config.motor.jump_velocity(), 6.0);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config: SimConfig =
            serde_json::from_str(r#"{ "tick_rate_hz": 60, "motor": { "run_speed": 10.0 } }"#).unwrap();
        assert_eq!(config.tick_rate_hz, 60);
        assert_eq!(config.motor.run_speed, 10.0);
        assert_eq!(config.motor.walk_speed, 6.0);
        assert_eq!(config.probe, ProbeConfig::default());
        assert_eq!(config.controller.walkable, Layers::WALKABLE);
    }

    #[test]
    #[should_panic(expected = "tick_rate_hz must be positive")]
    fn test_zero_tick_rate_panics() {
        let config = SimConfig {
            tick_rate_hz: 0,
            ..SimConfig::default()
        };
        let _ = config.dt();
    }
}
