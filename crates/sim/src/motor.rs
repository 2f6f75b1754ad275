//! Movement logic run inside each controller tick.
//!
//! The controller probes the ground, then hands a [`MotorContext`] to a
//! [`Motor`], which returns the displacement for this tick and may toggle
//! ground clamping and slope limiting.

use glam::Vec3;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::MotorConfig;
use crate::ground::Ground;
use crate::input::InputState;
use crate::state_machine::{StateHandlers, StateMachine, StateTable};

pub struct MotorContext<'a> {
    pub ground: &'a Ground,
    pub up: Vec3,
    pub dt: f32,
    clamping: bool,
    slope_limiting: bool,
}

impl<'a> MotorContext<'a> {
    pub fn new(ground: &'a Ground, up: Vec3, dt: f32, clamping: bool, slope_limiting: bool) -> Self {
        Self {
            ground,
            up,
            dt,
            clamping,
            slope_limiting,
        }
    }

    pub fn enable_clamping(&mut self) {
        self.clamping = true;
    }

    pub fn disable_clamping(&mut self) {
        self.clamping = false;
    }

    pub fn enable_slope_limit(&mut self) {
        self.slope_limiting = true;
    }

    pub fn disable_slope_limit(&mut self) {
        self.slope_limiting = false;
    }

    pub fn is_clamping(&self) -> bool {
        self.clamping
    }

    pub fn is_slope_limiting(&self) -> bool {
        self.slope_limiting
    }
}

pub trait Motor {
    /// Displacement to apply this tick.
    fn update(&mut self, ctx: &mut MotorContext<'_>) -> Vec3;
}

/// Motor that never moves. Useful for settling a controller in place.
#[derive(Debug, Clone, Copy, Default)]
pub struct Still;

impl Motor for Still {
    fn update(&mut self, _ctx: &mut MotorContext<'_>) -> Vec3 {
        Vec3::ZERO
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocomotionState {
    #[default]
    Walk,
    Jump,
    Fall,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotorEvent {
    Jumped,
    Landed,
    Fired,
}

/// Per-tick working data the locomotion states read and write.
#[derive(Debug, Clone)]
pub struct Body {
    pub config: MotorConfig,
    pub input: InputState,
    pub forward: Vec3,
    pub up: Vec3,
    pub dt: f32,
    pub acquiring: bool,
    pub maintaining: bool,
    pub velocity: Vec3,
    pub clamping: bool,
    pub events: Vec<MotorEvent>,
}

impl Body {
    fn vertical_speed(&self) -> f32 {
        self.velocity.dot(self.up)
    }

    fn set_vertical_speed(&mut self, speed: f32) {
        self.velocity += self.up * (speed - self.vertical_speed());
    }

    fn apply_gravity(&mut self) {
        let speed = self.vertical_speed() - self.config.gravity * self.dt;
        self.set_vertical_speed(speed);
    }

    /// Input direction in the plane, relative to `forward`. Unit length or
    /// zero.
    fn local_movement(&self) -> Vec3 {
        let right = self.up.cross(self.forward);
        let mut local = Vec3::ZERO;
        if self.input.horizontal() != 0.0 {
            local += right * self.input.horizontal();
        }
        if self.input.vertical() != 0.0 {
            local += self.forward * self.input.vertical();
        }
        local.normalize_or_zero()
    }
}

// ============================================================================
// Locomotion states
// ============================================================================

fn walk_enter(body: &mut Body) {
    body.clamping = true;
    body.set_vertical_speed(0.0);
    body.events.push(MotorEvent::Landed);
}

fn walk_update(body: &mut Body) -> Option<LocomotionState> {
    if body.input.jump() && body.acquiring {
        return Some(LocomotionState::Jump);
    }
    if !body.maintaining {
        return Some(LocomotionState::Fall);
    }
    body.set_vertical_speed(0.0);
    body.clamping = true;
    None
}

fn jump_enter(body: &mut Body) {
    body.clamping = false;
    let speed = body.vertical_speed() + body.config.jump_velocity();
    body.set_vertical_speed(speed);
    body.events.push(MotorEvent::Jumped);
}

fn jump_update(body: &mut Body) -> Option<LocomotionState> {
    body.apply_gravity();
    (body.vertical_speed() <= 0.0).then_some(LocomotionState::Fall)
}

fn fall_enter(body: &mut Body) {
    body.clamping = false;
}

fn fall_update(body: &mut Body) -> Option<LocomotionState> {
    if body.acquiring {
        return Some(LocomotionState::Walk);
    }
    body.apply_gravity();
    None
}

fn no_exit(_: &mut Body) {}

impl StateTable<Body> for LocomotionState {
    fn handlers(self) -> StateHandlers<Self, Body> {
        match self {
            LocomotionState::Walk => StateHandlers {
                enter: walk_enter,
                update: walk_update,
                exit: no_exit,
            },
            LocomotionState::Jump => StateHandlers {
                enter: jump_enter,
                update: jump_update,
                exit: no_exit,
            },
            LocomotionState::Fall => StateHandlers {
                enter: fall_enter,
                update: fall_update,
                exit: no_exit,
            },
        }
    }
}

/// Walk / jump / fall movement driven by [`InputState`].
#[derive(Debug, Clone)]
pub struct Locomotion {
    body: Body,
    machine: StateMachine<LocomotionState, Body>,
}

impl Locomotion {
    pub fn new(config: MotorConfig, up: Vec3) -> Self {
        Self {
            body: Body {
                config,
                input: InputState::default(),
                forward: Vec3::Z,
                up,
                dt: 0.0,
                acquiring: false,
                maintaining: false,
                velocity: Vec3::ZERO,
                clamping: true,
                events: Vec::new(),
            },
            machine: StateMachine::new(LocomotionState::Walk),
        }
    }

    /// Input and facing for the next update.
    pub fn set_input(&mut self, input: InputState, forward: Vec3) {
        self.body.input = input;
        self.body.forward = forward;
    }

    pub fn state(&self) -> LocomotionState {
        self.machine.current()
    }

    pub fn velocity(&self) -> Vec3 {
        self.body.velocity
    }

    pub fn config(&self) -> &MotorConfig {
        &self.body.config
    }

    /// Rewind to a captured state without running enter / exit handlers.
    pub fn restore(&mut self, state: LocomotionState, velocity: Vec3, clamping: bool) {
        self.machine.restore(state);
        self.body.velocity = velocity;
        self.body.clamping = clamping;
        self.body.events.clear();
    }

    pub fn drain_events(&mut self) -> Vec<MotorEvent> {
        std::mem::take(&mut self.body.events)
    }
}

impl Motor for Locomotion {
    fn update(&mut self, ctx: &mut MotorContext<'_>) -> Vec3 {
        let body = &mut self.body;
        body.up = ctx.up;
        body.dt = ctx.dt;
        body.acquiring = ctx
            .ground
            .is_grounded(false, body.config.acquire_ground_tolerance);
        body.maintaining = ctx
            .ground
            .is_grounded(true, body.config.maintain_ground_tolerance);
        body.clamping = ctx.is_clamping();

        let speed = if body.input.run() {
            body.config.run_speed
        } else {
            body.config.walk_speed
        };
        let planar = body.local_movement() * speed;
        body.velocity = planar + body.up * body.vertical_speed();

        let before = self.machine.current();
        self.machine.update(body);
        if self.machine.current() != before {
            debug!(from = ?before, to = ?self.machine.current(), "locomotion state change");
        }

        if body.input.fire() {
            body.events.push(MotorEvent::Fired);
        }

        if body.clamping {
            ctx.enable_clamping();
        } else {
            ctx.disable_clamping();
        }

        body.velocity * ctx.dt
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ground::ProbeFrame;
    use crate::input::Buttons;

    fn update(loco: &mut Locomotion, ground: &Ground) -> (Vec3, bool) {
        let mut ctx = MotorContext::new(ground, Vec3::Y, 0.02, true, true);
        let moved = loco.update(&mut ctx);
        (moved, ctx.is_clamping())
    }

    fn grounded() -> Ground {
        Ground::flat_for_tests(ProbeFrame::default(), 0.0)
    }

    fn airborne() -> Ground {
        Ground::default()
    }

    #[test]
    fn test_walk_forward_at_walk_speed() {
        let mut loco = Locomotion::new(MotorConfig::default(), Vec3::Y);
        loco.set_input(InputState::new(1).with_axes(0.0, 1.0), Vec3::Z);
        let (moved, clamping) = update(&mut loco, &grounded());
        assert!((moved - Vec3::new(0.0, 0.0, 6.0 * 0.02)).length() < 1e-6);
        assert!(clamping);
        assert_eq!(loco.state(), LocomotionState::Walk);
    }

    #[test]
    fn test_strafe_right_and_run() {
        let mut loco = Locomotion::new(MotorConfig::default(), Vec3::Y);
        let input = InputState::new(1)
            .with_axes(1.0, 0.0)
            .with_buttons(Buttons::RUN);
        loco.set_input(input, Vec3::Z);
        let (moved, _) = update(&mut loco, &grounded());
        // up x forward = +X
        assert!((moved - Vec3::new(8.0 * 0.02, 0.0, 0.0)).length() < 1e-6);
    }

    #[test]
    fn test_diagonal_is_normalized() {
        let mut loco = Locomotion::new(MotorConfig::default(), Vec3::Y);
        loco.set_input(InputState::new(1).with_axes(1.0, 1.0), Vec3::Z);
        update(&mut loco, &grounded());
        assert!((loco.velocity().length() - 6.0).abs() < 1e-5);
    }

    #[test]
    fn test_jump_then_fall_then_land() {
        let mut loco = Locomotion::new(MotorConfig::default(), Vec3::Y);
        loco.set_input(InputState::new(1).with_buttons(Buttons::JUMP), Vec3::Z);
        let (moved, clamping) = update(&mut loco, &grounded());
        assert_eq!(loco.state(), LocomotionState::Jump);
        assert!(!clamping);
        assert_eq!(loco.velocity().y, 6.0);
        assert!((moved.y - 0.12).abs() < 1e-6);
        assert_eq!(loco.drain_events(), vec![MotorEvent::Jumped]);

        loco.set_input(InputState::new(2), Vec3::Z);
        update(&mut loco, &airborne());
        assert_eq!(loco.state(), LocomotionState::Jump);
        assert!((loco.velocity().y - (6.0 - 9.0 * 0.02)).abs() < 1e-5);

        // 6 / (9 * 0.02) = 33.3 ticks until the apex
        for tick in 3..40 {
            loco.set_input(InputState::new(tick), Vec3::Z);
            update(&mut loco, &airborne());
        }
        assert_eq!(loco.state(), LocomotionState::Fall);
        assert!(loco.velocity().y < 0.0);

        loco.set_input(InputState::new(40), Vec3::Z);
        let (_, clamping) = update(&mut loco, &grounded());
        assert_eq!(loco.state(), LocomotionState::Walk);
        assert!(clamping);
        assert_eq!(loco.velocity().y, 0.0);
        assert_eq!(loco.drain_events(), vec![MotorEvent::Landed]);
    }

    #[test]
    fn test_walking_off_ground_falls() {
        let mut loco = Locomotion::new(MotorConfig::default(), Vec3::Y);
        loco.set_input(InputState::new(1), Vec3::Z);
        let (moved, clamping) = update(&mut loco, &airborne());
        assert_eq!(loco.state(), LocomotionState::Fall);
        assert!(!clamping);
        // Fall is entered this tick; gravity starts next tick
        assert_eq!(moved, Vec3::ZERO);
        update(&mut loco, &airborne());
        assert!((loco.velocity().y + 9.0 * 0.02).abs() < 1e-6);
    }

    #[test]
    fn test_jump_requires_acquired_ground() {
        let mut loco = Locomotion::new(MotorConfig::default(), Vec3::Y);
        loco.set_input(InputState::new(1).with_buttons(Buttons::JUMP), Vec3::Z);
        // 0.3 above the floor: maintained but not acquired
        update(&mut loco, &Ground::flat_for_tests(ProbeFrame::default(), 0.3));
        assert_eq!(loco.state(), LocomotionState::Walk);
    }

    #[test]
    fn test_fire_emits_event() {
        let mut loco = Locomotion::new(MotorConfig::default(), Vec3::Y);
        loco.set_input(InputState::new(1).with_buttons(Buttons::FIRE), Vec3::Z);
        update(&mut loco, &grounded());
        assert_eq!(loco.drain_events(), vec![MotorEvent::Fired]);
        assert!(loco.drain_events().is_empty());
    }

    #[test]
    fn test_restore_skips_enter() {
        let mut loco = Locomotion::new(MotorConfig::default(), Vec3::Y);
        loco.restore(LocomotionState::Fall, Vec3::new(0.0, -2.0, 0.0), false);
        assert_eq!(loco.state(), LocomotionState::Fall);
        assert_eq!(loco.velocity().y, -2.0);
        assert!(loco.drain_events().is_empty());
    }

    #[test]
    fn test_still_motor() {
        let ground = grounded();
        let mut ctx = MotorContext::new(&ground, Vec3::Y, 0.02, true, false);
        assert_eq!(Still.update(&mut ctx), Vec3::ZERO);
        assert!(!ctx.is_slope_limiting());
    }
}
