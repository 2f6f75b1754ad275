//! Exact point and ray queries against a single triangle.

use glam::Vec3;

/// Closest point on triangle `abc` to `p`.
///
/// Voronoi-region classification from Ericson, *Real-Time Collision
/// Detection*, 5.1.5. Regions are tested in the order vertex A, vertex B,
/// edge AB, vertex C, edge AC, edge BC, and finally the face interior.
pub fn closest_point_on_triangle(a: Vec3, b: Vec3, c: Vec3, p: Vec3) -> Vec3 {
    let ab = b - a;
    let ac = c - a;
    let ap = p - a;

    let d1 = ab.dot(ap);
    let d2 = ac.dot(ap);
    if d1 <= 0.0 && d2 <= 0.0 {
        return a;
    }

    let bp = p - b;
    let d3 = ab.dot(bp);
    let d4 = ac.dot(bp);
    if d3 >= 0.0 && d4 <= d3 {
        return b;
    }

    let vc = d1 * d4 - d3 * d2;
    if vc <= 0.0 && d1 >= 0.0 && d3 <= 0.0 {
        let v = d1 / (d1 - d3);
        return a + ab * v;
    }

    let cp = p - c;
    let d5 = ab.dot(cp);
    let d6 = ac.dot(cp);
    if d6 >= 0.0 && d5 <= d6 {
        return c;
    }

    let vb = d5 * d2 - d1 * d6;
    if vb <= 0.0 && d2 >= 0.0 && d6 <= 0.0 {
        let w = d2 / (d2 - d6);
        return a + ac * w;
    }

    let va = d3 * d6 - d5 * d4;
    if va <= 0.0 && (d4 - d3) >= 0.0 && (d5 - d6) >= 0.0 {
        let w = (d4 - d3) / ((d4 - d3) + (d5 - d6));
        return b + (c - b) * w;
    }

    let denom = va + vb + vc;
    if denom.abs() < f32::EPSILON {
        // Degenerate (zero-area) triangle that slipped through every edge test
        return a;
    }
    let inv = 1.0 / denom;
    let v = vb * inv;
    let w = vc * inv;
    a + ab * v + ac * w
}

/// Unit normal following the winding `a -> b -> c`, zero when degenerate.
pub fn triangle_normal(a: Vec3, b: Vec3, c: Vec3) -> Vec3 {
    (b - a).cross(c - a).normalize_or_zero()
}

/// Möller–Trumbore intersection against the front face of `abc`.
///
/// Returns the distance along `dir` (expected unit length). Back faces and
/// hits beyond `max_distance` are ignored.
pub fn ray_triangle(
    origin: Vec3,
    dir: Vec3,
    a: Vec3,
    b: Vec3,
    c: Vec3,
    max_distance: f32,
) -> Option<f32> {
    const EPS: f32 = 1e-9;

    let e1 = b - a;
    let e2 = c - a;
    let pvec = dir.cross(e2);
    let det = e1.dot(pvec);
    // det <= 0 means the ray approaches from behind (or runs parallel)
    if det <= EPS {
        return None;
    }
    let inv_det = 1.0 / det;

    let tvec = origin - a;
    let u = tvec.dot(pvec) * inv_det;
    if !(0.0..=1.0).contains(&u) {
        return None;
    }

    let qvec = tvec.cross(e1);
    let v = dir.dot(qvec) * inv_det;
    if v < 0.0 || u + v > 1.0 {
        return None;
    }

    let t = e2.dot(qvec) * inv_det;
    if t < 0.0 || t > max_distance {
        return None;
    }
    Some(t)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tri() -> (Vec3, Vec3, Vec3) {
        // Counter-clockwise seen from +y, so the front face points up
        (
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(0.0, 0.0, 1.0),
            Vec3::new(1.0, 0.0, 0.0),
        )
    }

    #[test]
    fn test_closest_point_face_region() {
        let (a, b, c) = tri();
        let p = closest_point_on_triangle(a, b, c, Vec3::new(0.25, 3.0, 0.25));
        assert!((p - Vec3::new(0.25, 0.0, 0.25)).length() < 1e-6);
    }

    #[test]
    fn test_closest_point_vertex_regions() {
        let (a, b, c) = tri();
        assert_eq!(closest_point_on_triangle(a, b, c, Vec3::new(-1.0, 0.0, -1.0)), a);
        assert_eq!(closest_point_on_triangle(a, b, c, Vec3::new(-0.5, 1.0, 2.0)), b);
        assert_eq!(closest_point_on_triangle(a, b, c, Vec3::new(2.0, -1.0, -0.5)), c);
    }

    #[test]
    fn test_closest_point_edge_regions() {
        let (a, b, c) = tri();
        // Edge AB lies on the z axis
        let p = closest_point_on_triangle(a, b, c, Vec3::new(-1.0, 0.0, 0.5));
        assert!((p - Vec3::new(0.0, 0.0, 0.5)).length() < 1e-6);
        // Edge AC lies on the x axis
        let p = closest_point_on_triangle(a, b, c, Vec3::new(0.5, 0.0, -1.0));
        assert!((p - Vec3::new(0.5, 0.0, 0.0)).length() < 1e-6);
        // Edge BC is the hypotenuse
        let p = closest_point_on_triangle(a, b, c, Vec3::new(1.0, 0.0, 1.0));
        assert!((p - Vec3::new(0.5, 0.0, 0.5)).length() < 1e-6);
    }

    #[test]
    fn test_degenerate_triangle_does_not_nan() {
        let a = Vec3::ZERO;
        let p = closest_point_on_triangle(a, a, a, Vec3::ONE);
        assert!(p.is_finite());
        assert_eq!(triangle_normal(a, a, a), Vec3::ZERO);
    }

    #[test]
    fn test_ray_triangle_front_face_only() {
        let (a, b, c) = tri();
        assert_eq!(triangle_normal(a, b, c), Vec3::Y);

        let from_above = ray_triangle(Vec3::new(0.2, 2.0, 0.2), -Vec3::Y, a, b, c, 10.0);
        assert!((from_above.unwrap() - 2.0).abs() < 1e-6);

        let from_below = ray_triangle(Vec3::new(0.2, -2.0, 0.2), Vec3::Y, a, b, c, 10.0);
        assert!(from_below.is_none());

        let outside = ray_triangle(Vec3::new(0.9, 2.0, 0.9), -Vec3::Y, a, b, c, 10.0);
        assert!(outside.is_none());

        let too_far = ray_triangle(Vec3::new(0.2, 2.0, 0.2), -Vec3::Y, a, b, c, 1.0);
        assert!(too_far.is_none());
    }
}
