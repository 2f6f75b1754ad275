//! Host physics interface.
//!
//! The character core only talks to the scene through [`PhysicsQuery`].
//! [`CollisionWorld`] is the in-process implementation: a flat list of posed
//! colliders answered shape by shape.

use bitflags::bitflags;
use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::shape::{Pose, Shape, ShapeHit};

bitflags! {
    /// Collision layers a collider belongs to, and that a query accepts.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct Layers: u32 {
        const STATIC    = 0x0001;
        const PLATFORM  = 0x0002;
        const CHARACTER = 0x0004;
        const DEBRIS    = 0x0008;
    }
}

impl Layers {
    /// Layers a character may stand on and collide with.
    pub const WALKABLE: Layers = Layers::STATIC.union(Layers::PLATFORM);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ColliderId(pub u32);

/// Per-collider walkability metadata.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SurfaceType {
    /// Steepest angle from up, in degrees, that still counts as ground.
    pub stand_angle: f32,
    /// Steepest angle, in degrees, a character may walk up.
    pub slope_limit: f32,
}

impl Default for SurfaceType {
    fn default() -> Self {
        Self {
            stand_angle: 80.0,
            slope_limit: 80.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayHit {
    pub point: Vec3,
    pub normal: Vec3,
    pub distance: f32,
    pub collider: ColliderId,
}

impl RayHit {
    fn from_shape(hit: ShapeHit, collider: ColliderId) -> Self {
        Self {
            point: hit.point,
            normal: hit.normal,
            distance: hit.distance,
            collider,
        }
    }
}

/// Which colliders a query may report.
#[derive(Debug, Clone, Copy)]
pub struct QueryFilter<'a> {
    pub layers: Layers,
    pub exclude: &'a [ColliderId],
}

impl<'a> QueryFilter<'a> {
    pub fn new(layers: Layers) -> Self {
        Self {
            layers,
            exclude: &[],
        }
    }

    pub fn excluding(self, exclude: &'a [ColliderId]) -> Self {
        Self { exclude, ..self }
    }

    pub fn accepts(&self, id: ColliderId, layers: Layers) -> bool {
        self.layers.intersects(layers) && !self.exclude.contains(&id)
    }
}

/// Synchronous scene queries required by the ground probe and the
/// controller. Directions are expected to be unit length; implementations
/// return `None` for a zero direction.
pub trait PhysicsQuery {
    /// Nearest hit along a ray. Rays that start inside a solid do not hit it.
    fn raycast(&self, origin: Vec3, dir: Vec3, max_distance: f32, filter: &QueryFilter) -> Option<RayHit>;

    /// Nearest hit of a swept sphere. Colliders the sphere already touches at
    /// `origin` are not reported.
    fn sphere_cast(
        &self,
        origin: Vec3,
        radius: f32,
        dir: Vec3,
        max_distance: f32,
        filter: &QueryFilter,
    ) -> Option<RayHit>;

    /// Sweep of a capsule with cap centers `a` and `b`.
    ///
    /// The provided implementation sweeps spheres spaced at most `radius`
    /// apart along the segment and keeps the earliest hit.
    fn capsule_cast(
        &self,
        a: Vec3,
        b: Vec3,
        radius: f32,
        dir: Vec3,
        max_distance: f32,
        filter: &QueryFilter,
    ) -> Option<RayHit> {
        let length = a.distance(b);
        let steps = if radius > 0.0 {
            ((length / radius).ceil() as usize).max(1)
        } else {
            1
        };
        (0..=steps)
            .filter_map(|i| {
                let center = a.lerp(b, i as f32 / steps as f32);
                self.sphere_cast(center, radius, dir, max_distance, filter)
            })
            .min_by(|x, y| x.distance.total_cmp(&y.distance))
    }

    /// Solid, non-trigger colliders touching the sphere, in id order.
    fn overlap_sphere(&self, center: Vec3, radius: f32, filter: &QueryFilter) -> Vec<ColliderId>;

    /// Nearest surface point of one collider; `None` means no contact.
    fn closest_point_on(&self, collider: ColliderId, point: Vec3, search_radius: f32) -> Option<Vec3>;

    /// Sphere cast against a single collider regardless of its layers.
    fn sphere_cast_collider(
        &self,
        collider: ColliderId,
        origin: Vec3,
        radius: f32,
        dir: Vec3,
        max_distance: f32,
    ) -> Option<RayHit>;

    fn surface_type(&self, collider: ColliderId) -> SurfaceType;

    /// Current world position of a collider, used to carry characters on
    /// moving platforms.
    fn anchor_position(&self, collider: ColliderId) -> Option<Vec3>;
}

#[derive(Debug, Clone)]
pub struct Collider {
    pub shape: Shape,
    pub pose: Pose,
    pub layers: Layers,
    pub surface: SurfaceType,
    pub is_trigger: bool,
}

impl Collider {
    pub fn new(shape: Shape, pose: Pose) -> Self {
        Self {
            shape,
            pose,
            layers: Layers::STATIC,
            surface: SurfaceType::default(),
            is_trigger: false,
        }
    }

    pub fn with_layers(mut self, layers: Layers) -> Self {
        self.layers = layers;
        self
    }

    pub fn with_surface(mut self, surface: SurfaceType) -> Self {
        self.surface = surface;
        self
    }

    pub fn trigger(mut self) -> Self {
        self.is_trigger = true;
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct CollisionWorld {
    colliders: Vec<Collider>,
}

impl CollisionWorld {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, collider: Collider) -> ColliderId {
        let id = ColliderId(self.colliders.len() as u32);
        self.colliders.push(collider);
        id
    }

    pub fn collider(&self, id: ColliderId) -> Option<&Collider> {
        self.colliders.get(id.0 as usize)
    }

    /// Move a collider, e.g. a platform, between ticks.
    pub fn set_pose(&mut self, id: ColliderId, pose: Pose) {
        if let Some(c) = self.colliders.get_mut(id.0 as usize) {
            c.pose = pose;
        }
    }

    pub fn len(&self) -> usize {
        self.colliders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.colliders.is_empty()
    }

    fn candidates<'a>(
        &'a self,
        filter: &'a QueryFilter,
    ) -> impl Iterator<Item = (ColliderId, &'a Collider)> + 'a {
        self.colliders
            .iter()
            .enumerate()
            .map(|(i, c)| (ColliderId(i as u32), c))
            .filter(move |(id, c)| !c.is_trigger && filter.accepts(*id, c.layers))
    }

    fn nearest(
        &self,
        filter: &QueryFilter,
        cast: impl Fn(&Collider) -> Option<ShapeHit>,
    ) -> Option<RayHit> {
        // Ties keep the lower id: min_by returns the first minimum
        self.candidates(filter)
            .filter_map(|(id, c)| cast(c).map(|hit| RayHit::from_shape(hit, id)))
            .min_by(|a, b| a.distance.total_cmp(&b.distance))
    }
}

impl PhysicsQuery for CollisionWorld {
    fn raycast(&self, origin: Vec3, dir: Vec3, max_distance: f32, filter: &QueryFilter) -> Option<RayHit> {
        let dir = dir.normalize_or_zero();
        if dir == Vec3::ZERO {
            return None;
        }
        self.nearest(filter, |c| c.shape.raycast(&c.pose, origin, dir, max_distance))
    }

    fn sphere_cast(
        &self,
        origin: Vec3,
        radius: f32,
        dir: Vec3,
        max_distance: f32,
        filter: &QueryFilter,
    ) -> Option<RayHit> {
        let dir = dir.normalize_or_zero();
        if dir == Vec3::ZERO {
            return None;
        }
        self.nearest(filter, |c| {
            c.shape.sphere_cast(&c.pose, origin, radius, dir, max_distance)
        })
    }

    fn overlap_sphere(&self, center: Vec3, radius: f32, filter: &QueryFilter) -> Vec<ColliderId> {
        self.candidates(filter)
            .filter(|(_, c)| c.shape.bounds(&c.pose).intersects_sphere(center, radius))
            .filter(|(_, c)| {
                let d = c.shape.distance(&c.pose, center, radius + 1.0);
                d * d <= radius * radius
            })
            .map(|(id, _)| id)
            .collect()
    }

    fn closest_point_on(&self, collider: ColliderId, point: Vec3, search_radius: f32) -> Option<Vec3> {
        let c = self.collider(collider)?;
        c.shape.closest_point_on_surface(&c.pose, point, search_radius)
    }

    fn sphere_cast_collider(
        &self,
        collider: ColliderId,
        origin: Vec3,
        radius: f32,
        dir: Vec3,
        max_distance: f32,
    ) -> Option<RayHit> {
        let dir = dir.normalize_or_zero();
        if dir == Vec3::ZERO {
            return None;
        }
        let c = self.collider(collider)?;
        c.shape
            .sphere_cast(&c.pose, origin, radius, dir, max_distance)
            .map(|hit| RayHit::from_shape(hit, collider))
    }

    fn surface_type(&self, collider: ColliderId) -> SurfaceType {
        self.collider(collider)
            .map(|c| c.surface)
            .unwrap_or_default()
    }

    fn anchor_position(&self, collider: ColliderId) -> Option<Vec3> {
        self.collider(collider).map(|c| c.pose.position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn floor() -> Collider {
        Collider::new(
            Shape::Cuboid {
                half_extents: Vec3::new(10.0, 0.5, 10.0),
            },
            Pose::at(Vec3::new(0.0, -0.5, 0.0)),
        )
    }

    fn wall_at(x: f32) -> Collider {
        Collider::new(
            Shape::Cuboid {
                half_extents: Vec3::new(0.5, 5.0, 10.0),
            },
            Pose::at(Vec3::new(x + 0.5, 5.0, 0.0)),
        )
    }

    #[test]
    fn test_raycast_nearest_and_filters() {
        let mut world = CollisionWorld::new();
        let floor = world.add(floor());
        let ledge = world.add(
            Collider::new(
                Shape::Cuboid {
                    half_extents: Vec3::splat(0.5),
                },
                Pose::at(Vec3::new(0.0, 1.5, 0.0)),
            )
            .with_layers(Layers::DEBRIS),
        );

        let origin = Vec3::new(0.0, 5.0, 0.0);
        let all = QueryFilter::new(Layers::all());
        let hit = world.raycast(origin, -Vec3::Y, f32::INFINITY, &all).unwrap();
        assert_eq!(hit.collider, ledge);
        assert!((hit.distance - 3.0).abs() < 1e-5);

        let walkable = QueryFilter::new(Layers::WALKABLE);
        let hit = world.raycast(origin, -Vec3::Y, f32::INFINITY, &walkable).unwrap();
        assert_eq!(hit.collider, floor);
        assert!((hit.distance - 5.0).abs() < 1e-5);
        assert_eq!(hit.normal, Vec3::Y);

        let excluded = [floor];
        let none = QueryFilter::new(Layers::WALKABLE).excluding(&excluded);
        assert!(world.raycast(origin, -Vec3::Y, f32::INFINITY, &none).is_none());

        assert!(world.raycast(origin, Vec3::ZERO, 10.0, &all).is_none());
    }

    #[test]
    fn test_overlap_sphere_skips_triggers() {
        let mut world = CollisionWorld::new();
        let wall = world.add(wall_at(1.0));
        world.add(wall_at(1.0).trigger());

        let filter = QueryFilter::new(Layers::all());
        assert_eq!(world.overlap_sphere(Vec3::new(0.6, 1.0, 0.0), 0.5, &filter), vec![wall]);
        // Exactly touching counts as overlapping
        assert_eq!(world.overlap_sphere(Vec3::new(0.5, 1.0, 0.0), 0.5, &filter), vec![wall]);
        assert!(world.overlap_sphere(Vec3::new(0.4, 1.0, 0.0), 0.5, &filter).is_empty());
    }

    #[test]
    fn test_capsule_cast_hits_with_any_sphere() {
        let mut world = CollisionWorld::new();
        // Low obstacle only the feet sphere can reach
        let step = world.add(Collider::new(
            Shape::Cuboid {
                half_extents: Vec3::new(0.5, 0.25, 5.0),
            },
            Pose::at(Vec3::new(3.5, 0.25, 0.0)),
        ));
        let filter = QueryFilter::new(Layers::all());
        let hit = world
            .capsule_cast(
                Vec3::new(0.0, 0.5, 0.0),
                Vec3::new(0.0, 1.5, 0.0),
                0.5,
                Vec3::X,
                10.0,
                &filter,
            )
            .unwrap();
        assert_eq!(hit.collider, step);
        assert!((hit.distance - 2.5).abs() < 1e-3);
    }

    #[test]
    fn test_sphere_cast_collider_ignores_layers_and_others() {
        let mut world = CollisionWorld::new();
        world.add(wall_at(1.0));
        let far = world.add(wall_at(3.0).with_layers(Layers::DEBRIS));

        let origin = Vec3::new(0.0, 1.0, 0.0);
        let hit = world.sphere_cast_collider(far, origin, 0.01, Vec3::X, 10.0).unwrap();
        assert_eq!(hit.collider, far);
        assert!((hit.distance - 2.99).abs() < 1e-3);

        // Starting inside the solid reports nothing
        assert!(world
            .sphere_cast_collider(far, Vec3::new(3.5, 1.0, 0.0), 0.01, Vec3::X, 10.0)
            .is_none());
    }

    #[test]
    fn test_anchor_follows_pose() {
        let mut world = CollisionWorld::new();
        let platform = world.add(floor().with_layers(Layers::PLATFORM));
        assert_eq!(world.anchor_position(platform), Some(Vec3::new(0.0, -0.5, 0.0)));
        world.set_pose(platform, Pose::at(Vec3::new(1.0, -0.5, 0.0)));
        assert_eq!(world.anchor_position(platform), Some(Vec3::new(1.0, -0.5, 0.0)));
        assert_eq!(world.anchor_position(ColliderId(99)), None);
        assert_eq!(world.surface_type(ColliderId(99)), SurfaceType::default());
    }
}
