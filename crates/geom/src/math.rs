//! Small vector helpers shared by the probe, the controller and the shape
//! resolvers.
//!
//! Every helper that would normalize a vector guards the zero-length case and
//! returns a neutral result instead of NaN.

use glam::{Quat, Vec3};

/// Squared length below which a vector is treated as zero.
pub const ZERO_EPSILON_SQ: f32 = 1e-12;

/// Unsigned angle between two vectors in degrees, `0.0` if either is zero.
pub fn angle_deg(a: Vec3, b: Vec3) -> f32 {
    let denom = (a.length_squared() * b.length_squared()).sqrt();
    if denom < ZERO_EPSILON_SQ {
        return 0.0;
    }
    let cos = (a.dot(b) / denom).clamp(-1.0, 1.0);
    cos.acos().to_degrees()
}

/// Remove the component of `v` along `normal`.
pub fn project_on_plane(normal: Vec3, v: Vec3) -> Vec3 {
    let n = normal.normalize_or_zero();
    v - n * v.dot(n)
}

/// Project `point` onto the plane through `plane_point` with `normal`.
pub fn project_point_on_plane(normal: Vec3, plane_point: Vec3, point: Vec3) -> Vec3 {
    let n = normal.normalize_or_zero();
    point - n * (point - plane_point).dot(n)
}

/// Project `point` onto the infinite line through `line_point` along `line_dir`.
pub fn project_point_on_line(line_point: Vec3, line_dir: Vec3, point: Vec3) -> Vec3 {
    let d = line_dir.normalize_or_zero();
    line_point + d * (point - line_point).dot(d)
}

/// Direction pointing down a surface with `normal`, relative to `up`.
///
/// Zero for a surface that faces straight up or down.
pub fn down_slope(normal: Vec3, up: Vec3) -> Vec3 {
    let r = normal.cross(-up);
    r.cross(normal)
}

/// Whether `v` is too short to normalize.
pub fn is_zero(v: Vec3) -> bool {
    v.length_squared() < ZERO_EPSILON_SQ
}

/// Component-wise clamp of `value` into `[min, max]`.
pub fn clamp_vec(value: Vec3, min: Vec3, max: Vec3) -> Vec3 {
    value.max(min).min(max)
}

/// Linear interpolation with `t` clamped to `[0, 1]`.
pub fn lerp_clamped(a: Vec3, b: Vec3, t: f32) -> Vec3 {
    a.lerp(b, t.clamp(0.0, 1.0))
}

/// Spherical interpolation with `t` clamped to `[0, 1]`.
pub fn slerp_clamped(a: Quat, b: Quat, t: f32) -> Quat {
    a.slerp(b, t.clamp(0.0, 1.0))
}
