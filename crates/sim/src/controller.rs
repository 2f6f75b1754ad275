//! Fixed-step character controller.
//!
//! The character is approximated by a column of equal spheres. Each
//! [`CharacterController::step`] runs, in order:
//!
//! 1. carry along with the clamped-to collider (moving platforms),
//! 2. ground probe,
//! 3. motor update and displacement,
//! 4. recursive pushback out of overlapping geometry,
//! 5. ground probe,
//! 6. slope limiting,
//! 7. ground probe,
//! 8. ground clamping,
//! 9. anchor bookkeeping for the next tick.
//!
//! The order is part of the determinism contract: the client replays
//! inputs through this exact sequence and must land where the server did.

use glam::Vec3;
use tracing::{debug, trace};
use vantage_geom::math::{angle_deg, is_zero, project_on_plane, project_point_on_line};
use vantage_geom::{ColliderId, PhysicsQuery, QueryFilter, SurfaceType};

use crate::SimError;
use crate::config::{CollisionSphere, ControllerConfig, ProbeConfig};
use crate::ground::{Ground, ProbeFrame};
use crate::motor::{Motor, MotorContext};

/// One pushback contact.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Collision {
    pub sphere: CollisionSphere,
    pub collider: ColliderId,
    pub surface: SurfaceType,
    pub point: Vec3,
    pub normal: Vec3,
}

/// Contacts resolved in each pushback pass of one tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PushbackReport {
    pub contacts_per_iteration: Vec<usize>,
}

impl PushbackReport {
    pub fn iterations(&self) -> usize {
        self.contacts_per_iteration.len()
    }

    pub fn total_contacts(&self) -> usize {
        self.contacts_per_iteration.iter().sum()
    }

    /// Whether the last pass found nothing left to resolve.
    pub fn converged(&self) -> bool {
        self.contacts_per_iteration.last().is_none_or(|&n| n == 0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StepReport {
    pub position: Vec3,
    pub ground_distance: Option<f32>,
    pub pushback: PushbackReport,
    pub slope_limited: bool,
    pub clamped: bool,
}

#[derive(Debug, Clone)]
pub struct CharacterController {
    config: ControllerConfig,
    probe: ProbeConfig,
    dt: f32,
    position: Vec3,
    ground: Ground,
    clamping: bool,
    slope_limiting: bool,
    height_scale: f32,
    ignored: Vec<ColliderId>,
    clamped_to: Option<ColliderId>,
    anchor: Option<(ColliderId, Vec3)>,
    collisions: Vec<Collision>,
    feet: CollisionSphere,
    head: CollisionSphere,
}

impl CharacterController {
    /// Create a controller at `position` advancing `dt` seconds per step.
    ///
    /// # Panics
    /// If `dt` is not positive.
    pub fn new(
        config: ControllerConfig,
        probe: ProbeConfig,
        dt: f32,
        position: Vec3,
    ) -> Result<Self, SimError> {
        assert!(dt > 0.0, "dt must be positive");
        let feet = config
            .spheres
            .iter()
            .copied()
            .find(|s| s.is_feet)
            .ok_or(SimError::MissingSphere { kind: "feet" })?;
        let head = config
            .spheres
            .iter()
            .copied()
            .find(|s| s.is_head)
            .ok_or(SimError::MissingSphere { kind: "head" })?;

        Ok(Self {
            config,
            probe,
            dt,
            position,
            ground: Ground::default(),
            clamping: true,
            slope_limiting: true,
            height_scale: 1.0,
            ignored: Vec::new(),
            clamped_to: None,
            anchor: None,
            collisions: Vec::new(),
            feet,
            head,
        })
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn position(&self) -> Vec3 {
        self.position
    }

    /// Move without simulating. Leaves the ground result of the last step
    /// in place.
    pub fn set_position(&mut self, position: Vec3) {
        self.position = position;
    }

    pub fn up(&self) -> Vec3 {
        self.config.up
    }

    pub fn radius(&self) -> f32 {
        self.config.radius
    }

    pub fn dt(&self) -> f32 {
        self.dt
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub fn ground(&self) -> &Ground {
        &self.ground
    }

    /// Contacts resolved by the pushback of the last step.
    pub fn collisions(&self) -> &[Collision] {
        &self.collisions
    }

    pub fn is_clamping(&self) -> bool {
        self.clamping
    }

    pub fn enable_clamping(&mut self) {
        self.clamping = true;
    }

    pub fn disable_clamping(&mut self) {
        self.clamping = false;
    }

    pub fn is_slope_limiting(&self) -> bool {
        self.slope_limiting
    }

    pub fn enable_slope_limit(&mut self) {
        self.slope_limiting = true;
    }

    pub fn disable_slope_limit(&mut self) {
        self.slope_limiting = false;
    }

    pub fn height_scale(&self) -> f32 {
        self.height_scale
    }

    /// Scale the offsets of every sphere except the feet, e.g. to crouch.
    pub fn set_height_scale(&mut self, scale: f32) {
        self.height_scale = scale;
    }

    /// Height from the bottom of the feet sphere to the top of the head.
    pub fn height(&self) -> f32 {
        self.sphere_position(self.head)
            .distance(self.sphere_position(self.feet))
            + self.config.radius * 2.0
    }

    /// Exclude a collider (typically the character's own) from every query.
    pub fn ignore_collider(&mut self, collider: ColliderId) {
        if !self.ignored.contains(&collider) {
            self.ignored.push(collider);
        }
    }

    pub fn remove_ignored_collider(&mut self, collider: ColliderId) {
        self.ignored.retain(|&c| c != collider);
    }

    /// Follow `collider` explicitly instead of whatever is underfoot.
    pub fn clamp_to(&mut self, collider: Option<ColliderId>) {
        self.clamped_to = collider;
    }

    pub fn clamped_to(&self) -> Option<ColliderId> {
        self.clamped_to
    }

    /// Collider followed last step and its position at the time.
    pub fn anchor(&self) -> Option<(ColliderId, Vec3)> {
        self.anchor
    }

    pub fn set_anchor(&mut self, anchor: Option<(ColliderId, Vec3)>) {
        self.anchor = anchor;
    }

    pub fn sphere_position(&self, sphere: CollisionSphere) -> Vec3 {
        let up = self.config.up;
        if sphere.is_feet {
            self.position + up * sphere.offset
        } else {
            self.position + up * sphere.offset * self.height_scale
        }
    }

    pub fn feet_position(&self) -> Vec3 {
        self.sphere_position(self.feet)
    }

    pub fn head_position(&self) -> Vec3 {
        self.sphere_position(self.head)
    }

    /// Whether `point` lies below the head sphere's equator.
    pub fn point_below_head(&self, point: Vec3) -> bool {
        angle_deg(point - self.head_position(), self.config.up) > 89.0
    }

    /// Whether `point` lies above the feet sphere's equator.
    pub fn point_above_feet(&self, point: Vec3) -> bool {
        angle_deg(point - self.feet_position(), -self.config.up) > 89.0
    }

    // ========================================================================
    // Simulation
    // ========================================================================

    /// Advance one fixed step.
    ///
    /// If any ground probe finds nothing below the character, the position
    /// is restored to where this step started (after the platform carry)
    /// and [`SimError::EscapedLevel`] is returned.
    pub fn step<W, M>(&mut self, world: &W, motor: &mut M) -> Result<StepReport, SimError>
    where
        W: PhysicsQuery + ?Sized,
        M: Motor + ?Sized,
    {
        self.follow_anchor(world);
        let initial = self.position;

        let result = self.run_step(world, motor, initial);
        if result.is_err() {
            self.position = initial;
        }
        result
    }

    fn run_step<W, M>(&mut self, world: &W, motor: &mut M, initial: Vec3) -> Result<StepReport, SimError>
    where
        W: PhysicsQuery + ?Sized,
        M: Motor + ?Sized,
    {
        let exclude = self.ignored.clone();
        let filter = QueryFilter::new(self.config.walkable).excluding(&exclude);

        self.probe_ground(world, &filter, initial)?;

        let displacement = {
            let mut ctx = MotorContext::new(
                &self.ground,
                self.config.up,
                self.dt,
                self.clamping,
                self.slope_limiting,
            );
            let displacement = motor.update(&mut ctx);
            self.clamping = ctx.is_clamping();
            self.slope_limiting = ctx.is_slope_limiting();
            displacement
        };
        if displacement.is_finite() {
            self.position += displacement;
        }

        let pushback = self.recursive_pushback(world, &filter);

        self.probe_ground(world, &filter, initial)?;

        let slope_limited = self.slope_limiting && self.slope_limit(world, &filter, initial);

        self.probe_ground(world, &filter, initial)?;

        if self.clamping {
            self.clamp_to_ground();
        }

        self.record_anchor(world);

        Ok(StepReport {
            position: self.position,
            ground_distance: self.ground.distance(),
            pushback,
            slope_limited,
            clamped: self.clamping,
        })
    }

    fn anchor_target(&self) -> Option<ColliderId> {
        self.clamped_to.or(self.ground.collider())
    }

    fn is_anchored(&self) -> bool {
        self.clamping || self.clamped_to.is_some()
    }

    fn follow_anchor<W: PhysicsQuery + ?Sized>(&mut self, world: &W) {
        if !self.is_anchored() {
            return;
        }
        let Some((id, last)) = self.anchor else {
            return;
        };
        // An explicit clamp target switched since the anchor was recorded
        if self.clamped_to.is_some_and(|c| c != id) {
            return;
        }
        if let Some(now) = world.anchor_position(id) {
            let delta = now - last;
            if !is_zero(delta) {
                trace!(collider = id.0, dx = delta.x, dy = delta.y, dz = delta.z, "following anchor");
                self.position += delta;
            }
        }
    }

    fn record_anchor<W: PhysicsQuery + ?Sized>(&mut self, world: &W) {
        self.anchor = if self.is_anchored() {
            self.anchor_target()
                .and_then(|id| world.anchor_position(id).map(|p| (id, p)))
        } else {
            None
        };
    }

    fn probe_ground<W: PhysicsQuery + ?Sized>(
        &mut self,
        world: &W,
        filter: &QueryFilter,
        initial: Vec3,
    ) -> Result<(), SimError> {
        let frame = ProbeFrame {
            position: self.position,
            up: self.config.up,
            radius: self.config.radius,
        };
        let origin = self.feet_position();
        self.ground.probe(world, frame, origin, filter, &self.probe);
        if self.ground.escaped() {
            return Err(SimError::EscapedLevel { position: initial });
        }
        Ok(())
    }

    /// Push every sphere out of the geometry it overlaps. Runs up to
    /// `max_pushback_iterations` passes, stopping after a pass that finds no
    /// contact.
    fn recursive_pushback<W: PhysicsQuery + ?Sized>(
        &mut self,
        world: &W,
        filter: &QueryFilter,
    ) -> PushbackReport {
        self.collisions.clear();
        let mut report = PushbackReport::default();
        let radius = self.config.radius;
        let tiny = self.probe.tiny_tolerance;
        let skin = self.config.pushback_skin;

        for _ in 0..self.config.max_pushback_iterations.max(1) {
            let mut contacts = 0;

            for i in 0..self.config.spheres.len() {
                let sphere = self.config.spheres[i];
                for collider in world.overlap_sphere(self.sphere_position(sphere), radius, filter) {
                    let position = self.sphere_position(sphere);
                    let Some(contact) = world.closest_point_on(collider, position, radius) else {
                        continue;
                    };
                    let v = contact - position;
                    if is_zero(v) {
                        continue;
                    }
                    let dir = v.normalize();
                    let dist = v.length();

                    // A cast toward the contact only hits if we are outside the surface
                    let outside = world
                        .sphere_cast_collider(collider, position, tiny, dir, dist + tiny)
                        .is_some();

                    let push = if outside {
                        if dist < radius - skin {
                            -dir * (radius - dist)
                        } else {
                            continue;
                        }
                    } else {
                        dir * (radius + dist)
                    };

                    self.position += push;
                    contacts += 1;

                    let pushed = position + push;
                    let normal = (contact - pushed)
                        .try_normalize()
                        .and_then(|d| world.sphere_cast_collider(collider, pushed, tiny, d, f32::INFINITY))
                        .map(|hit| hit.normal)
                        .unwrap_or_else(|| (pushed - contact).normalize_or_zero());

                    self.collisions.push(Collision {
                        sphere,
                        collider,
                        surface: world.surface_type(collider),
                        point: contact,
                        normal,
                    });
                }
            }

            report.contacts_per_iteration.push(contacts);
            if contacts == 0 {
                break;
            }
        }

        if !report.converged() {
            debug!(
                iterations = report.iterations(),
                contacts = report.total_contacts(),
                "pushback stopped before converging"
            );
        }
        report
    }

    /// Keep the character from climbing a slope steeper than its surface's
    /// limit. Returns whether the position was corrected.
    fn slope_limit<W: PhysicsQuery + ?Sized>(&mut self, world: &W, filter: &QueryFilter, initial: Vec3) -> bool {
        let Some(n) = self.ground.primary_normal() else {
            return false;
        };
        let up = self.config.up;
        if angle_deg(n, up) <= self.ground.surface().slope_limit {
            return false;
        }

        let movement = project_on_plane(n, self.position - initial);
        // r runs along the slope, v points down it
        let r = n.cross(-up);
        let v = r.cross(n);
        if angle_deg(movement, v) <= 90.0 {
            return false;
        }

        let resolved = project_point_on_line(initial, r, self.position);
        let direction = project_on_plane(n, resolved - self.position);
        let Some(dir) = direction.try_normalize() else {
            return true;
        };

        let hit = world.capsule_cast(
            self.feet_position(),
            self.head_position(),
            self.config.radius,
            dir,
            direction.length(),
            filter,
        );
        match hit {
            Some(hit) => self.position += v.normalize_or_zero() * hit.distance,
            None => self.position += direction,
        }
        trace!(angle = angle_deg(n, up), "slope limited");
        true
    }

    fn clamp_to_ground(&mut self) {
        if let Some(d) = self.ground.distance() {
            self.position -= self.config.up * d;
        }
    }
}
