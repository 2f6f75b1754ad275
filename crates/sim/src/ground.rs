//! Ground probe.
//!
//! Each call to [`Ground::probe`] discards the previous result and samples
//! the surface below the character from scratch. Up to five hits are kept:
//!
//! - `primary`: the surface directly supporting the feet sphere.
//! - `near` / `far`: the two faces either side of a possible edge.
//! - `flush`: standable ground at the foot of a wall the character leans on.
//! - `step`: the landing below a ledge wall.

use glam::Vec3;
use tracing::{error, trace};
use vantage_geom::math::{angle_deg, down_slope, project_on_plane, project_point_on_plane};
use vantage_geom::{ColliderId, PhysicsQuery, QueryFilter, RayHit, SurfaceType};

use crate::config::ProbeConfig;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GroundHit {
    pub point: Vec3,
    pub normal: Vec3,
    pub distance: f32,
}

impl From<RayHit> for GroundHit {
    fn from(hit: RayHit) -> Self {
        Self {
            point: hit.point,
            normal: hit.normal,
            distance: hit.distance,
        }
    }
}

/// Controller placement the probe measures against.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProbeFrame {
    /// Controller origin, at the bottom of the feet sphere.
    pub position: Vec3,
    pub up: Vec3,
    pub radius: f32,
}

impl Default for ProbeFrame {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            up: Vec3::Y,
            radius: 0.5,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Ground {
    primary: Option<GroundHit>,
    near: Option<GroundHit>,
    far: Option<GroundHit>,
    flush: Option<GroundHit>,
    step: Option<GroundHit>,
    surface: SurfaceType,
    collider: Option<ColliderId>,
    frame: ProbeFrame,
    config: ProbeConfig,
}

impl Ground {
    /// Sample the ground below `origin` (the feet sphere center).
    pub fn probe<W: PhysicsQuery + ?Sized>(
        &mut self,
        world: &W,
        frame: ProbeFrame,
        origin: Vec3,
        filter: &QueryFilter,
        config: &ProbeConfig,
    ) {
        *self = Ground {
            frame,
            config: *config,
            ..Ground::default()
        };

        let up = frame.up;
        let down = -up;
        let tol = config.tolerance;
        let tiny = config.tiny_tolerance;
        let reach = config.max_cast_distance;

        let o = origin + up * tol;
        // Shrunk so the cast does not start clipped into an adjacent wall
        let smaller_radius = frame.radius - tol * tol;

        if let Some(cast) = world.sphere_cast(o, smaller_radius, down, reach, filter) {
            self.surface = world.surface_type(cast.collider);
            self.collider = Some(cast.collider);

            // Recover the contact the full-radius sphere would have made
            let hit = self
                .simulate_sphere_cast(world, cast.normal, filter)
                .unwrap_or_else(|| cast.into());
            self.primary = Some(hit);

            let planar = project_point_on_plane(up, frame.position, hit.point);
            if planar.distance(frame.position) < tiny {
                trace!("flat ground");
                return;
            }

            // Sample both faces of the edge we may be standing on
            let to_center = project_on_plane(up, (frame.position - hit.point).normalize_or_zero() * tiny);
            let (sin80, cos80) = 80.0_f32.to_radians().sin_cos();
            let away_from_center = -to_center * cos80 + up * to_center.length() * sin80;

            let near_point = hit.point + to_center + up * tiny;
            let far_point = hit.point + away_from_center * 3.0;

            self.near = world.raycast(near_point, down, reach, filter).map(Into::into);
            self.far = world.raycast(far_point, down, reach, filter).map(Into::into);

            // Standing on a wall: find the ground we are flush against
            if angle_deg(hit.normal, up) > self.surface.stand_angle {
                let slope = down_slope(hit.normal, up);
                let flush_origin = hit.point + hit.normal * tiny;
                if let Some(flush) = world.raycast(flush_origin, slope, reach, filter) {
                    self.flush = self.simulate_sphere_cast(world, flush.normal, filter);
                }
            }

            // On a ledge the near face is the wall; find the landing below it
            if let Some(near) = self.near {
                let near_angle = angle_deg(near.normal, up);
                if near_angle > self.surface.stand_angle {
                    let slope = down_slope(near.normal, up);
                    self.step = world.raycast(near_point, slope, reach, filter).map(Into::into);
                } else if near.distance > tol {
                    self.step = Some(near);
                }
            }
        } else if let Some(ray) = world.raycast(o, down, reach, filter) {
            // Sphere cast failed, most likely clipped into a wall
            self.surface = world.surface_type(ray.collider);
            self.collider = Some(ray.collider);
            self.primary = Some(
                self.simulate_sphere_cast(world, ray.normal, filter)
                    .unwrap_or_else(|| ray.into()),
            );
        } else {
            error!(
                x = frame.position.x,
                y = frame.position.y,
                z = frame.position.z,
                "no ground below character; escaped level"
            );
        }
    }

    /// Raycast from the point of the controller's bottom sphere that would
    /// touch a surface with `ground_normal`.
    fn simulate_sphere_cast<W: PhysicsQuery + ?Sized>(
        &self,
        world: &W,
        ground_normal: Vec3,
        filter: &QueryFilter,
    ) -> Option<GroundHit> {
        let up = self.frame.up;
        let radius = self.frame.radius;
        let tol = self.config.tolerance;
        let angle = angle_deg(ground_normal, up).to_radians();

        let mut origin = self.frame.position + up * tol;
        if angle.abs() > f32::EPSILON {
            let horizontal = angle.sin() * radius;
            let vertical = (1.0 - angle.cos()) * radius;
            let up_slope = project_on_plane(up, -down_slope(ground_normal, up)).normalize_or_zero();
            origin += up_slope * horizontal + up * vertical;
        }

        world
            .raycast(origin, -up, self.config.max_cast_distance, filter)
            .map(|hit| GroundHit {
                distance: hit.distance - tol,
                ..GroundHit::from(hit)
            })
    }

    /// Ground normal if the character counts as grounded within `distance`.
    ///
    /// Priority: flush against a wall, then ledge / steep edge (near face if
    /// it is itself steady, else the step landing), else the far or primary
    /// normal. `was_grounded` does not change the outcome; callers express
    /// hysteresis through `distance`.
    pub fn grounding(&self, _was_grounded: bool, distance: f32) -> Option<Vec3> {
        let primary = self.primary?;
        if primary.distance > distance {
            return None;
        }
        let up = self.frame.up;
        let stand = self.surface.stand_angle;

        if let Some(far) = self.far
            && angle_deg(far.normal, up) > stand
        {
            return self
                .flush
                .filter(|f| angle_deg(f.normal, up) < stand && f.distance < distance)
                .map(|f| f.normal);
        }

        if let Some(far) = self.far
            && !self.on_steady_ground(far.normal, primary.point)
        {
            if let Some(near) = self.near
                && near.distance < distance
                && angle_deg(near.normal, up) < stand
                && self.on_steady_ground(near.normal, near.point)
            {
                return Some(near.normal);
            }
            return self
                .step
                .filter(|s| s.distance < distance && angle_deg(s.normal, up) < stand)
                .map(|s| s.normal);
        }

        Some(self.far.map_or(primary.normal, |f| f.normal))
    }

    pub fn is_grounded(&self, was_grounded: bool, distance: f32) -> bool {
        self.grounding(was_grounded, distance).is_some()
    }

    /// Whether a contact at `point` is close enough to the controller's
    /// center, for a surface with `normal`, to be stood on. Steeper surfaces
    /// allow contacts further out.
    pub fn on_steady_ground(&self, normal: Vec3, point: Vec3) -> bool {
        let c = &self.config;
        let angle = angle_deg(normal, self.frame.up);
        let ratio = (angle / c.grounding_upper_bound_angle).clamp(0.0, 1.0);
        let percent = c.grounding_min_percent_from_center
            + (c.grounding_max_percent_from_center - c.grounding_min_percent_from_center) * ratio;
        let p = project_point_on_plane(self.frame.up, self.frame.position, point);
        p.distance(self.frame.position) <= percent * self.frame.radius
    }

    pub fn primary(&self) -> Option<&GroundHit> {
        self.primary.as_ref()
    }

    pub fn near(&self) -> Option<&GroundHit> {
        self.near.as_ref()
    }

    pub fn far(&self) -> Option<&GroundHit> {
        self.far.as_ref()
    }

    pub fn flush(&self) -> Option<&GroundHit> {
        self.flush.as_ref()
    }

    pub fn step(&self) -> Option<&GroundHit> {
        self.step.as_ref()
    }

    pub fn primary_normal(&self) -> Option<Vec3> {
        self.primary.map(|h| h.normal)
    }

    /// Distance from the controller origin down to the primary contact.
    pub fn distance(&self) -> Option<f32> {
        self.primary.map(|h| h.distance)
    }

    pub fn surface(&self) -> SurfaceType {
        self.surface
    }

    pub fn collider(&self) -> Option<ColliderId> {
        self.collider
    }

    /// True when the last probe found nothing at all below the character.
    pub fn escaped(&self) -> bool {
        self.primary.is_none()
    }

    pub fn frame(&self) -> &ProbeFrame {
        &self.frame
    }

    /// Ground normal with the given tolerance, zero when not grounded.
    pub fn normal(&self, was_grounded: bool, distance: f32) -> Vec3 {
        self.grounding(was_grounded, distance).unwrap_or(Vec3::ZERO)
    }

    /// Flat floor `distance` below the controller.
    #[cfg(test)]
    pub(crate) fn flat_for_tests(frame: ProbeFrame, distance: f32) -> Self {
        let hit = GroundHit {
            point: frame.position - frame.up * distance,
            normal: frame.up,
            distance,
        };
        Self::with_hits(frame, SurfaceType::default(), [Some(hit), None, None, None, None])
    }

    #[cfg(test)]
    fn with_hits(
        frame: ProbeFrame,
        surface: SurfaceType,
        hits: [Option<GroundHit>; 5],
    ) -> Self {
        let [primary, near, far, flush, step] = hits;
        Self {
            primary,
            near,
            far,
            flush,
            step,
            surface,
            collider: None,
            frame,
            config: ProbeConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Quat;
    use vantage_geom::{Collider, CollisionWorld, Layers, Pose, Shape};

    fn floor_world() -> CollisionWorld {
        let mut world = CollisionWorld::new();
        world.add(Collider::new(
            Shape::Cuboid {
                half_extents: Vec3::new(20.0, 0.5, 20.0),
            },
            Pose::at(Vec3::new(0.0, -0.5, 0.0)),
        ));
        world
    }

    fn probe_at(world: &CollisionWorld, position: Vec3) -> Ground {
        let frame = ProbeFrame {
            position,
            ..ProbeFrame::default()
        };
        let mut ground = Ground::default();
        let filter = QueryFilter::new(Layers::WALKABLE);
        ground.probe(
            world,
            frame,
            position + Vec3::Y * 0.5,
            &filter,
            &ProbeConfig::default(),
        );
        ground
    }

    fn hit(point: Vec3, normal: Vec3, distance: f32) -> Option<GroundHit> {
        Some(GroundHit {
            point,
            normal: normal.normalize(),
            distance,
        })
    }

    #[test]
    fn test_flat_floor_is_grounded_with_zero_distance() {
        let world = floor_world();
        let ground = probe_at(&world, Vec3::new(1.0, 0.0, 2.0));
        assert!(!ground.escaped());
        assert!(ground.distance().unwrap().abs() < 1e-5);
        assert_eq!(ground.primary_normal(), Some(Vec3::Y));
        // Flat ground short-circuits the edge samples
        assert!(ground.near().is_none());
        assert!(ground.far().is_none());
        assert!(ground.is_grounded(false, 0.01));
        assert_eq!(ground.grounding(true, 0.5), Some(Vec3::Y));
    }

    #[test]
    fn test_hovering_reports_distance() {
        let world = floor_world();
        let ground = probe_at(&world, Vec3::new(0.0, 0.3, 0.0));
        assert!((ground.distance().unwrap() - 0.3).abs() < 1e-4);
        assert!(!ground.is_grounded(false, 0.01));
        assert!(ground.is_grounded(true, 0.5));
    }

    #[test]
    fn test_nothing_below_is_escaped() {
        let world = floor_world();
        let ground = probe_at(&world, Vec3::new(100.0, 0.0, 0.0));
        assert!(ground.escaped());
        assert_eq!(ground.distance(), None);
        assert!(!ground.is_grounded(true, 10.0));
    }

    #[test]
    fn test_standing_on_a_ledge_edge_samples_both_faces() {
        // Platform top at y = 1 ending at x = 0, floor at y = 0
        let mut world = CollisionWorld::new();
        world.add(Collider::new(
            Shape::Cuboid {
                half_extents: Vec3::new(5.0, 0.5, 5.0),
            },
            Pose::at(Vec3::new(-5.0, 0.5, 0.0)),
        ));
        world.add(Collider::new(
            Shape::Cuboid {
                half_extents: Vec3::new(20.0, 0.5, 20.0),
            },
            Pose::at(Vec3::new(0.0, -0.5, 0.0)),
        ));

        // Center 0.3 past the edge: the feet sphere rests on the corner
        let ground = probe_at(&world, Vec3::new(0.3, 1.0, 0.0));
        let primary = ground.primary().unwrap();
        assert!(primary.point.x <= 0.0 && primary.point.x > -0.01);
        assert!((primary.point.y - 1.0).abs() < 1e-4);
        assert!((primary.distance - 0.1).abs() < 0.01);
        // Near samples toward the center, over the drop
        let near = ground.near().unwrap();
        assert!(near.point.y.abs() < 1e-4);
        assert_eq!(ground.step(), ground.near());
        // Far samples back over the platform
        let far = ground.far().unwrap();
        assert!((far.point.y - 1.0).abs() < 1e-4);
        // Contact is outside the steady radius and the landing is too far
        assert!(!ground.is_grounded(true, 0.5));

        // Center 0.15 past the edge is still steady
        let ground = probe_at(&world, Vec3::new(0.15, 1.0, 0.0));
        assert_eq!(ground.grounding(true, 0.5), Some(Vec3::Y));
        assert!(!ground.is_grounded(false, 0.01));
    }

    #[test]
    fn test_steep_slope_not_grounded_without_flush() {
        // Scenario D, first half: the far face is a wall and nothing
        // standable lies below it
        let frame = ProbeFrame::default();
        let wall = Vec3::new(-1.0, 0.05, 0.0);
        let ground = Ground::with_hits(
            frame,
            SurfaceType::default(),
            [
                hit(Vec3::new(0.3, 0.0, 0.0), wall, 0.0),
                hit(Vec3::new(0.29, 0.0, 0.0), wall, 0.0),
                hit(Vec3::new(0.31, 0.0, 0.0), wall, 0.0),
                None,
                None,
            ],
        );
        assert!(angle_deg(wall, Vec3::Y) > 80.0);
        assert_eq!(ground.grounding(false, 0.01), None);
        assert_eq!(ground.grounding(true, 0.5), None);
    }

    #[test]
    fn test_steep_slope_grounded_via_flush() {
        // Scenario D, second half: a flat face sits at the foot of the wall
        let frame = ProbeFrame::default();
        let wall = Vec3::new(-1.0, 0.05, 0.0);
        let ground = Ground::with_hits(
            frame,
            SurfaceType::default(),
            [
                hit(Vec3::new(0.3, 0.0, 0.0), wall, 0.0),
                hit(Vec3::new(0.29, 0.0, 0.0), wall, 0.0),
                hit(Vec3::new(0.31, 0.0, 0.0), wall, 0.0),
                hit(Vec3::new(0.0, 0.0, 0.0), Vec3::Y, 0.0),
                None,
            ],
        );
        assert_eq!(ground.grounding(false, 0.01), Some(Vec3::Y));
    }

    #[test]
    fn test_ledge_prefers_steady_near_then_step() {
        let frame = ProbeFrame::default();
        let flat = Vec3::Y;
        // Far contact 0.45 out on a 40° face: not steady
        let far_normal = Quat::from_rotation_z(40.0_f32.to_radians()) * Vec3::Y;
        let steady_near = Ground::with_hits(
            frame,
            SurfaceType::default(),
            [
                hit(Vec3::new(0.45, 0.0, 0.0), flat, 0.0),
                hit(Vec3::new(0.1, 0.0, 0.0), Vec3::new(0.0, 1.0, 0.1), 0.0),
                hit(Vec3::new(0.46, -0.5, 0.0), far_normal, 0.5),
                None,
                hit(Vec3::new(0.0, -0.2, 0.0), flat, 0.2),
            ],
        );
        assert!(!steady_near.on_steady_ground(far_normal, Vec3::new(0.45, 0.0, 0.0)));
        let n = steady_near.grounding(false, 0.01).unwrap();
        assert!((n - Vec3::new(0.0, 1.0, 0.1).normalize()).length() < 1e-6);

        // Near contact too far out, fall back to the step landing
        let step_only = Ground::with_hits(
            frame,
            SurfaceType::default(),
            [
                hit(Vec3::new(0.45, 0.0, 0.0), flat, 0.0),
                hit(Vec3::new(0.44, 0.0, 0.0), flat, 0.0),
                hit(Vec3::new(0.46, -0.5, 0.0), far_normal, 0.5),
                None,
                hit(Vec3::new(0.0, -0.2, 0.0), flat, 0.2),
            ],
        );
        assert_eq!(step_only.grounding(false, 0.01), None);
        assert_eq!(step_only.grounding(true, 0.5), Some(Vec3::Y));
    }

    #[test]
    fn test_steady_ground_ratio() {
        let ground = Ground::with_hits(ProbeFrame::default(), SurfaceType::default(), [None; 5]);
        // Flat: 50% of radius
        assert!(ground.on_steady_ground(Vec3::Y, Vec3::new(0.25, 0.0, 0.0)));
        assert!(!ground.on_steady_ground(Vec3::Y, Vec3::new(0.26, 0.0, 0.0)));
        // 60° and steeper: 85% of radius
        let steep = Quat::from_rotation_z(70.0_f32.to_radians()) * Vec3::Y;
        assert!(ground.on_steady_ground(steep, Vec3::new(0.42, 0.0, 0.0)));
        assert!(!ground.on_steady_ground(steep, Vec3::new(0.43, 0.0, 0.0)));
    }
}
