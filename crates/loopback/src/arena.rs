//! The level both sides of the loopback simulate in, and the scripted
//! input driving the owning client.

use std::sync::Arc;

use glam::Vec3;
use vantage_geom::{Collider, CollisionWorld, MeshError, MeshIndex, MeshIndexConfig, Pose, Shape};
use vantage_sim::{Buttons, InputState};

pub const OWNER_SPAWN: Vec3 = Vec3::ZERO;
pub const BYSTANDER_SPAWN: Vec3 = Vec3::new(3.0, 0.0, -3.0);

/// A floor with a triangle-mesh ramp rising along +X and a wall at the
/// far edge.
pub fn arena() -> Result<CollisionWorld, MeshError> {
    let mut world = CollisionWorld::new();
    world.add(Collider::new(
        Shape::Cuboid {
            half_extents: Vec3::new(60.0, 0.5, 60.0),
        },
        Pose::at(Vec3::new(0.0, -0.5, 0.0)),
    ));

    let vertices = vec![
        Vec3::new(0.0, 0.0, -2.0),
        Vec3::new(0.0, 0.0, 2.0),
        Vec3::new(6.0, 2.0, -2.0),
        Vec3::new(6.0, 2.0, 2.0),
    ];
    let ramp = MeshIndex::build(vertices, &[0, 1, 2, 1, 3, 2], &MeshIndexConfig::default())?;
    world.add(Collider::new(Shape::Mesh(Arc::new(ramp)), Pose::at(Vec3::new(8.0, 0.0, 0.0))));

    world.add(Collider::new(
        Shape::Cuboid {
            half_extents: Vec3::new(0.5, 3.0, 20.0),
        },
        Pose::at(Vec3::new(40.0, 3.0, 0.0)),
    ));
    Ok(world)
}

/// Input for scripted step `step`: walk a wide circle, running for a
/// stretch and hopping now and then. The tick is filled in by the client.
pub fn scripted_input(step: u64) -> InputState {
    let yaw = (step as f32 * 0.5) % 360.0;
    let mut buttons = Buttons::empty();
    if (200..260).contains(&(step % 400)) {
        buttons |= Buttons::RUN;
    }
    if step % 150 == 75 {
        buttons |= Buttons::JUMP;
    }
    InputState::new(0)
        .with_axes(0.0, 1.0)
        .with_look(0.0, yaw)
        .with_buttons(buttons)
}
