//! Axis-aligned bounding boxes stored as center + half extents.

use glam::Vec3;

use crate::math::clamp_vec;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub center: Vec3,
    pub half_extents: Vec3,
}

impl Aabb {
    pub fn new(center: Vec3, half_extents: Vec3) -> Self {
        Self {
            center,
            half_extents,
        }
    }

    pub fn from_min_max(min: Vec3, max: Vec3) -> Self {
        Self {
            center: (min + max) * 0.5,
            half_extents: (max - min) * 0.5,
        }
    }

    /// Tight bounds around a set of points. Empty input yields a zero box at
    /// the origin.
    pub fn from_points(points: &[Vec3]) -> Self {
        let Some(first) = points.first() else {
            return Self::new(Vec3::ZERO, Vec3::ZERO);
        };
        let (min, max) = points
            .iter()
            .fold((*first, *first), |(min, max), p| (min.min(*p), max.max(*p)));
        Self::from_min_max(min, max)
    }

    pub fn min(&self) -> Vec3 {
        self.center - self.half_extents
    }

    pub fn max(&self) -> Vec3 {
        self.center + self.half_extents
    }

    pub fn union(&self, other: &Aabb) -> Aabb {
        Aabb::from_min_max(self.min().min(other.min()), self.max().max(other.max()))
    }

    pub fn intersects(&self, other: &Aabb) -> bool {
        let (a_min, a_max) = (self.min(), self.max());
        let (b_min, b_max) = (other.min(), other.max());
        !(a_min.x > b_max.x
            || b_min.x > a_max.x
            || a_min.y > b_max.y
            || b_min.y > a_max.y
            || a_min.z > b_max.z
            || b_min.z > a_max.z)
    }

    /// Nearest point of the box to `p` (p itself when inside).
    pub fn closest_point(&self, p: Vec3) -> Vec3 {
        clamp_vec(p, self.min(), self.max())
    }

    /// Squared-distance test of the clamped nearest point against the sphere.
    pub fn intersects_sphere(&self, p: Vec3, radius: f32) -> bool {
        (p - self.closest_point(p)).length_squared() <= radius * radius
    }

    /// Slab test. Returns the entry distance along `dir` when the ray
    /// `origin + t * dir`, `t` in `[0, max_distance]`, touches the box.
    pub fn ray_entry(&self, origin: Vec3, dir: Vec3, max_distance: f32) -> Option<f32> {
        let min = self.min();
        let max = self.max();
        let mut t_min = 0.0_f32;
        let mut t_max = max_distance;

        for axis in 0..3 {
            let o = origin[axis];
            let d = dir[axis];
            if d.abs() < 1e-12 {
                if o < min[axis] || o > max[axis] {
                    return None;
                }
                continue;
            }
            let inv = 1.0 / d;
            let mut t0 = (min[axis] - o) * inv;
            let mut t1 = (max[axis] - o) * inv;
            if t0 > t1 {
                std::mem::swap(&mut t0, &mut t1);
            }
            t_min = t_min.max(t0);
            t_max = t_max.min(t1);
            if t_min > t_max {
                return None;
            }
        }

        Some(t_min)
    }

    /// Index of the longest axis (x wins ties, then y).
    pub fn longest_axis(&self) -> usize {
        let e = self.half_extents;
        if e.x >= e.y && e.x >= e.z {
            0
        } else if e.y >= e.z {
            1
        } else {
            2
        }
    }
}
