//! Collider shapes and their closed-form surface queries.
//!
//! Every query works in the shape's local frame: the query point is moved
//! into local space with the inverse of the [`Pose`], resolved, and moved
//! back.

use std::sync::Arc;

use glam::{Quat, Vec3};

use crate::aabb::Aabb;
use crate::math::is_zero;
use crate::mesh_index::MeshIndex;

/// Rigid placement of a collider in world space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    pub position: Vec3,
    pub rotation: Quat,
}

impl Default for Pose {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
        }
    }
}

impl Pose {
    pub fn at(position: Vec3) -> Self {
        Self {
            position,
            rotation: Quat::IDENTITY,
        }
    }

    pub fn to_local(&self, p: Vec3) -> Vec3 {
        self.rotation.inverse() * (p - self.position)
    }

    pub fn to_world(&self, p: Vec3) -> Vec3 {
        self.rotation * p + self.position
    }

    pub fn dir_to_local(&self, d: Vec3) -> Vec3 {
        self.rotation.inverse() * d
    }

    pub fn dir_to_world(&self, d: Vec3) -> Vec3 {
        self.rotation * d
    }
}

/// Result of a ray test against one shape, in world space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShapeHit {
    pub distance: f32,
    pub point: Vec3,
    pub normal: Vec3,
}

#[derive(Debug, Clone)]
pub enum Shape {
    Sphere {
        radius: f32,
    },
    Cuboid {
        half_extents: Vec3,
    },
    /// Capsule along local +y. `half_height` is half the length of the
    /// inner segment joining the two cap centers.
    Capsule {
        radius: f32,
        half_height: f32,
    },
    /// Static triangle mesh; vertices are in the collider's local frame.
    Mesh(Arc<MeshIndex>),
}

const MARCH_MAX_STEPS: usize = 128;
const MARCH_HIT_EPSILON: f32 = 1e-5;

impl Shape {
    /// Nearest point on the surface to `to`.
    ///
    /// Spheres, boxes and capsules always answer. A mesh answers only when a
    /// triangle lies within `search_radius`; `None` means no contact.
    pub fn closest_point_on_surface(&self, pose: &Pose, to: Vec3, search_radius: f32) -> Option<Vec3> {
        let local = pose.to_local(to);
        let p = match self {
            Shape::Sphere { radius } => local.normalize_or_zero() * *radius,
            Shape::Cuboid { half_extents } => closest_on_box_surface(*half_extents, local),
            Shape::Capsule {
                radius,
                half_height,
            } => {
                let axis = closest_on_segment(*half_height, local);
                axis + (local - axis).normalize_or_zero() * *radius
            }
            Shape::Mesh(index) => index.closest_point(local, search_radius)?,
        };
        Some(pose.to_world(p))
    }

    /// Distance from `point` to the shape, capped at `max`.
    ///
    /// Zero for points inside a sphere, box or capsule. Meshes have no
    /// inside and report the distance to the nearest triangle.
    pub fn distance(&self, pose: &Pose, point: Vec3, max: f32) -> f32 {
        let local = pose.to_local(point);
        let d = match self {
            Shape::Sphere { radius } => (local.length() - radius).max(0.0),
            Shape::Cuboid { half_extents } => (local.abs() - *half_extents).max(Vec3::ZERO).length(),
            Shape::Capsule {
                radius,
                half_height,
            } => (local.distance(closest_on_segment(*half_height, local)) - radius).max(0.0),
            Shape::Mesh(index) => match index.closest_point(local, max) {
                Some(p) => p.distance(local),
                None => max,
            },
        };
        d.min(max)
    }

    /// Whether `point` lies inside the solid. Always false for meshes.
    pub fn contains(&self, pose: &Pose, point: Vec3) -> bool {
        let local = pose.to_local(point);
        match self {
            Shape::Sphere { radius } => local.length_squared() < radius * radius,
            Shape::Cuboid { half_extents } => {
                local.x.abs() < half_extents.x
                    && local.y.abs() < half_extents.y
                    && local.z.abs() < half_extents.z
            }
            Shape::Capsule {
                radius,
                half_height,
            } => local.distance_squared(closest_on_segment(*half_height, local)) < radius * radius,
            Shape::Mesh(_) => false,
        }
    }

    /// First surface hit along `dir` (unit length) within `max_distance`.
    ///
    /// A ray that starts inside a closed shape reports no hit. Mesh rays only
    /// hit front faces.
    pub fn raycast(&self, pose: &Pose, origin: Vec3, dir: Vec3, max_distance: f32) -> Option<ShapeHit> {
        if is_zero(dir) {
            return None;
        }
        let o = pose.to_local(origin);
        let d = pose.dir_to_local(dir);

        let (t, normal) = match self {
            Shape::Sphere { radius } => {
                let c = o.length_squared() - radius * radius;
                if c < 0.0 {
                    return None;
                }
                let b = o.dot(d);
                let disc = b * b - c;
                if disc < 0.0 {
                    return None;
                }
                let t = -b - disc.sqrt();
                if t < 0.0 || t > max_distance {
                    return None;
                }
                (t, (o + d * t).normalize_or_zero())
            }
            Shape::Cuboid { half_extents } => {
                if self.contains(&Pose::default(), o) {
                    return None;
                }
                let t = Aabb::new(Vec3::ZERO, *half_extents).ray_entry(o, d, max_distance)?;
                (t, box_face_normal(*half_extents, o + d * t))
            }
            Shape::Capsule { half_height, .. } => {
                let local = Pose::default();
                if self.contains(&local, o) {
                    return None;
                }
                let bounds = self.bounds(&local);
                let entry = bounds.ray_entry(o, d, max_distance)?;
                let limit = max_distance.min(entry + bounds.half_extents.length() * 2.0);
                let t = self.march(&local, o, d, limit, 0.0)?;
                let p = o + d * t;
                (t, (p - closest_on_segment(*half_height, p)).normalize_or_zero())
            }
            Shape::Mesh(index) => {
                let (t, id) = index.raycast(o, d, max_distance)?;
                (t, index.triangle_normal(id))
            }
        };

        Some(ShapeHit {
            distance: t,
            point: pose.to_world(o + d * t),
            normal: pose.dir_to_world(normal),
        })
    }

    /// Sweep a sphere of `radius` from `origin` along `dir` (unit length).
    ///
    /// Solved by conservative advancement on [`Shape::distance`]. A sphere
    /// that already touches the shape at `origin` (within the march epsilon)
    /// reports no hit, and so
    /// does a contact on the back of a mesh triangle. The reported point is
    /// the nearest surface point at the moment of contact and the normal
    /// points from that point towards the sphere center.
    pub fn sphere_cast(
        &self,
        pose: &Pose,
        origin: Vec3,
        radius: f32,
        dir: Vec3,
        max_distance: f32,
    ) -> Option<ShapeHit> {
        if is_zero(dir) {
            return None;
        }
        // Clip the sweep to the shape's bounds so unbounded casts terminate
        let bounds = self.bounds(pose);
        let swept = Aabb::new(bounds.center, bounds.half_extents + Vec3::splat(radius));
        let entry = swept.ray_entry(origin, dir, max_distance)?;
        let limit = max_distance.min(entry + swept.half_extents.length() * 2.0);

        if self.distance(pose, origin, limit + radius + 1.0) <= radius + MARCH_HIT_EPSILON {
            return None;
        }
        let t = self.march(pose, origin, dir, limit, radius)?;
        let center = origin + dir * t;
        let search = radius + MARCH_HIT_EPSILON * 2.0 + 1e-3;
        let point = match self {
            Shape::Mesh(index) => {
                let local = pose.to_local(center);
                let (p, id) = index.closest(local, search)?;
                if index.triangle_normal(id).dot(local - p) < 0.0 {
                    return None;
                }
                pose.to_world(p)
            }
            _ => self.closest_point_on_surface(pose, center, search)?,
        };
        let normal = (center - point).normalize_or_zero();
        Some(ShapeHit {
            distance: t,
            point,
            normal,
        })
    }

    fn march(&self, pose: &Pose, origin: Vec3, dir: Vec3, max_distance: f32, radius: f32) -> Option<f32> {
        let mut t = 0.0_f32;
        for _ in 0..MARCH_MAX_STEPS {
            let remaining = max_distance - t + radius + 1.0;
            let gap = self.distance(pose, origin + dir * t, remaining) - radius;
            if !gap.is_finite() {
                return None;
            }
            if gap <= MARCH_HIT_EPSILON {
                return Some(t);
            }
            t += gap;
            if t > max_distance {
                return None;
            }
        }
        None
    }

    /// World-space bounds of the shape.
    pub fn bounds(&self, pose: &Pose) -> Aabb {
        let local = match self {
            Shape::Sphere { radius } => Aabb::new(Vec3::ZERO, Vec3::splat(*radius)),
            Shape::Cuboid { half_extents } => Aabb::new(Vec3::ZERO, *half_extents),
            Shape::Capsule {
                radius,
                half_height,
            } => Aabb::new(Vec3::ZERO, Vec3::new(*radius, half_height + radius, *radius)),
            Shape::Mesh(index) => index.bounds(),
        };
        let (min, max) = (local.min(), local.max());
        let corners: [Vec3; 8] = std::array::from_fn(|i| {
            pose.to_world(Vec3::new(
                if i & 1 == 0 { min.x } else { max.x },
                if i & 2 == 0 { min.y } else { max.y },
                if i & 4 == 0 { min.z } else { max.z },
            ))
        });
        Aabb::from_points(&corners)
    }
}

/// Clamp into the box, then snap the nearest axis onto its face.
///
/// Ties between axes go to x, then y, then z, so a point inside always
/// lands on exactly one face.
fn closest_on_box_surface(half: Vec3, local: Vec3) -> Vec3 {
    let mut p = local.clamp(-half, half);
    let gap = half - p.abs();
    let face = |v: f32, h: f32| if v >= 0.0 { h } else { -h };
    if gap.x <= gap.y && gap.x <= gap.z {
        p.x = face(p.x, half.x);
    } else if gap.y <= gap.z {
        p.y = face(p.y, half.y);
    } else {
        p.z = face(p.z, half.z);
    }
    p
}

fn box_face_normal(half: Vec3, local: Vec3) -> Vec3 {
    let rel = local.abs() / half.max(Vec3::splat(f32::EPSILON));
    if rel.x >= rel.y && rel.x >= rel.z {
        Vec3::new(local.x.signum(), 0.0, 0.0)
    } else if rel.y >= rel.z {
        Vec3::new(0.0, local.y.signum(), 0.0)
    } else {
        Vec3::new(0.0, 0.0, local.z.signum())
    }
}

fn closest_on_segment(half_height: f32, local: Vec3) -> Vec3 {
    Vec3::new(0.0, local.y.clamp(-half_height, half_height), 0.0)
}
