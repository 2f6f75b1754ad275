//! A simulated character: controller, locomotion and facing.

use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};
use tracing::info;
use vantage_geom::{ColliderId, PhysicsQuery};

use crate::config::SimConfig;
use crate::controller::{CharacterController, StepReport};
use crate::input::InputState;
use crate::motor::{Locomotion, LocomotionState, MotorEvent};
use crate::{EntityId, Fnv1a64, SimError, Tick};

/// Everything needed to resume simulation from a point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CharacterState {
    /// Tick of the last input applied.
    pub tick: Tick,
    pub position: Vec3,
    pub rotation: Quat,
    pub velocity: Vec3,
    pub locomotion: LocomotionState,
    pub clamping: bool,
    #[serde(default)]
    pub anchor: Option<(ColliderId, Vec3)>,
}

/// Authoritative state of one character, as broadcast to every peer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitySnapshot {
    pub entity_id: EntityId,
    pub state: CharacterState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CharacterEvent {
    pub tick: Tick,
    pub kind: MotorEvent,
}

#[derive(Debug, Clone)]
pub struct Character {
    entity_id: EntityId,
    tick: Tick,
    controller: CharacterController,
    locomotion: Locomotion,
    rotation: Quat,
    replaying: bool,
    events: Vec<CharacterEvent>,
}

impl Character {
    /// Spawn at `position`, facing +Z.
    ///
    /// # Panics
    /// If `config.tick_rate_hz` is zero.
    pub fn new(entity_id: EntityId, config: &SimConfig, position: Vec3) -> Result<Self, SimError> {
        let controller = CharacterController::new(config.controller.clone(), config.probe, config.dt(), position)?;
        Ok(Self {
            entity_id,
            tick: 0,
            locomotion: Locomotion::new(config.motor, config.controller.up),
            controller,
            rotation: Quat::IDENTITY,
            replaying: false,
            events: Vec::new(),
        })
    }

    pub fn entity_id(&self) -> EntityId {
        self.entity_id
    }

    pub fn tick(&self) -> Tick {
        self.tick
    }

    pub fn position(&self) -> Vec3 {
        self.controller.position()
    }

    pub fn rotation(&self) -> Quat {
        self.rotation
    }

    pub fn velocity(&self) -> Vec3 {
        self.locomotion.velocity()
    }

    pub fn forward(&self) -> Vec3 {
        self.rotation * Vec3::Z
    }

    pub fn locomotion_state(&self) -> LocomotionState {
        self.locomotion.state()
    }

    pub fn controller(&self) -> &CharacterController {
        &self.controller
    }

    pub fn controller_mut(&mut self) -> &mut CharacterController {
        &mut self.controller
    }

    pub fn is_replaying(&self) -> bool {
        self.replaying
    }

    /// While replaying, gameplay events are dropped instead of queued.
    pub fn set_replaying(&mut self, replaying: bool) {
        self.replaying = replaying;
    }

    /// Place the character without simulating.
    pub fn set_transform(&mut self, position: Vec3, rotation: Quat) {
        self.controller.set_position(position);
        self.rotation = rotation;
    }

    /// Simulate one tick with `input`.
    ///
    /// Movement uses the facing from the previous tick; the new facing
    /// (`input` yaw about up) is applied afterwards. Tick and facing advance
    /// even when the step fails.
    pub fn simulate<W: PhysicsQuery + ?Sized>(&mut self, world: &W, input: &InputState) -> Result<StepReport, SimError> {
        self.locomotion.set_input(*input, self.forward());
        let result = self.controller.step(world, &mut self.locomotion);

        self.rotation = Quat::from_axis_angle(self.controller.up(), input.yaw().to_radians());
        self.tick = input.tick;

        let events = self.locomotion.drain_events();
        if !self.replaying {
            for kind in events {
                if kind == MotorEvent::Fired {
                    info!(entity = self.entity_id, tick = input.tick, "firing");
                }
                self.events.push(CharacterEvent { tick: input.tick, kind });
            }
        }
        result
    }

    pub fn drain_events(&mut self) -> Vec<CharacterEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn capture(&self) -> CharacterState {
        CharacterState {
            tick: self.tick,
            position: self.controller.position(),
            rotation: self.rotation,
            velocity: self.locomotion.velocity(),
            locomotion: self.locomotion.state(),
            clamping: self.controller.is_clamping(),
            anchor: self.controller.anchor(),
        }
    }

    pub fn restore(&mut self, state: &CharacterState) {
        self.tick = state.tick;
        self.controller.set_position(state.position);
        self.rotation = state.rotation;
        self.locomotion
            .restore(state.locomotion, state.velocity, state.clamping);
        if state.clamping {
            self.controller.enable_clamping();
        } else {
            self.controller.disable_clamping();
        }
        self.controller.set_anchor(state.anchor);
    }

    pub fn snapshot(&self) -> EntitySnapshot {
        EntitySnapshot {
            entity_id: self.entity_id,
            state: self.capture(),
        }
    }

    /// FNV-1a digest of the captured state. See [`crate::STATE_DIGEST_ALGO_ID`].
    pub fn state_digest(&self) -> u64 {
        state_digest(self.entity_id, &self.capture())
    }
}

/// Digest of one character's state: tick, entity id, position, rotation,
/// velocity, locomotion state, clamping, all little-endian with floats
/// canonicalized.
pub fn state_digest(entity_id: EntityId, state: &CharacterState) -> u64 {
    let mut hasher = Fnv1a64::new();
    hasher.update(&state.tick.to_le_bytes());
    hasher.update(&entity_id.to_le_bytes());
    hasher.update_vec3(state.position);
    for c in state.rotation.to_array() {
        hasher.update_f32(c);
    }
    hasher.update_vec3(state.velocity);
    let locomotion: u8 = match state.locomotion {
        LocomotionState::Walk => 0,
        LocomotionState::Jump => 1,
        LocomotionState::Fall => 2,
    };
    hasher.update(&[locomotion, u8::from(state.clamping)]);
    hasher.finish()
}
