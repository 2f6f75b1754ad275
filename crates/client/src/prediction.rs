//! Client-side prediction and server reconciliation for the locally
//! controlled character.
//!
//! Every tick the client simulates its own input immediately and queues it.
//! When an authoritative snapshot arrives, the acknowledged prefix of the
//! queue is dropped and the rest is replayed on top of the authoritative
//! state. The replay is a side computation: the live character is restored
//! afterwards and only nudged toward the corrected prediction, over several
//! ticks, when the two disagree by more than `snap_distance`.

use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use vantage_geom::PhysicsQuery;
use vantage_sim::{Character, CharacterState, EntityId, EntitySnapshot, InputState, SimConfig, Tick};
use vantage_wire::{AuthoritativeSnapshot, ClientInputBatch, ServerWelcome};

use crate::ClientError;
use crate::pending::PendingInputs;

/// Remaining corrections shorter than this are applied in one go.
const CORRECTION_EPSILON: f32 = 1e-4;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Seconds of simulated time between input batches.
    pub send_interval_secs: f32,
    pub warning_queue_depth: usize,
    pub max_queue_depth: usize,
    /// Prediction errors up to this distance are left alone.
    pub snap_distance: f32,
    /// Fraction of the outstanding correction applied each tick.
    pub smoothing_factor: f32,
    /// Send a batch every tick, e.g. when the client is also the host.
    pub send_every_tick: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            send_interval_secs: 0.33,
            warning_queue_depth: 30,
            max_queue_depth: 50,
            snap_distance: 0.15,
            smoothing_factor: 0.2,
            send_every_tick: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReconcileOutcome {
    /// Not newer than the last acknowledged tick. Nothing changed.
    Stale { tick: Tick, acknowledged: Tick },
    Reconciled {
        tick: Tick,
        /// Queued inputs dropped as acknowledged.
        removed: usize,
        /// Inputs replayed on top of the authoritative state.
        replayed: usize,
        /// Distance between the live and the corrected prediction.
        error: f32,
        /// Whether a smoothed correction was started.
        smoothing: bool,
    },
}

/// The locally controlled character.
#[derive(Debug, Clone)]
pub struct OwningClient {
    config: ClientConfig,
    character: Character,
    pending: PendingInputs,
    tick: Tick,
    acknowledged: Tick,
    send_timer: f32,
    correction: Vec3,
    last_authoritative: Option<CharacterState>,
    last_predicted: Option<CharacterState>,
}

impl OwningClient {
    pub fn new(entity_id: EntityId, sim: &SimConfig, config: ClientConfig, spawn: Vec3) -> Result<Self, ClientError> {
        let character = Character::new(entity_id, sim, spawn)?;
        Ok(Self {
            pending: PendingInputs::new(config.warning_queue_depth, config.max_queue_depth),
            config,
            tick: character.tick(),
            acknowledged: character.tick(),
            character,
            send_timer: 0.0,
            correction: Vec3::ZERO,
            last_authoritative: None,
            last_predicted: None,
        })
    }

    /// Build the client for the character the authority assigned us.
    pub fn from_welcome(welcome: &ServerWelcome, sim: &SimConfig, config: ClientConfig) -> Result<Self, ClientError> {
        if welcome.tick_rate_hz != sim.tick_rate_hz {
            return Err(ClientError::TickRateMismatch {
                authority: welcome.tick_rate_hz,
                local: sim.tick_rate_hz,
            });
        }
        let spawn = welcome.spawn.map_or(Vec3::ZERO, Into::into);
        Self::new(welcome.controlled_entity_id, sim, config, spawn)
    }

    pub fn entity_id(&self) -> EntityId {
        self.character.entity_id()
    }

    /// Local tick counter; the tick of the newest input.
    pub fn current_tick(&self) -> Tick {
        self.tick
    }

    pub fn acknowledged_tick(&self) -> Tick {
        self.acknowledged
    }

    pub fn pending(&self) -> &PendingInputs {
        &self.pending
    }

    pub fn character(&self) -> &Character {
        &self.character
    }

    pub fn character_mut(&mut self) -> &mut Character {
        &mut self.character
    }

    pub fn position(&self) -> Vec3 {
        self.character.position()
    }

    pub fn rotation(&self) -> Quat {
        self.character.rotation()
    }

    /// Correction still to be blended into the live position.
    pub fn correction(&self) -> Vec3 {
        self.correction
    }

    pub fn last_authoritative(&self) -> Option<&CharacterState> {
        self.last_authoritative.as_ref()
    }

    /// Result of the latest replay on top of the authoritative state.
    pub fn last_predicted(&self) -> Option<&CharacterState> {
        self.last_predicted.as_ref()
    }

    /// Run one local tick with `input` (its tick is overwritten with the
    /// local counter). Returns a batch when one is due.
    pub fn tick<W: PhysicsQuery + ?Sized>(&mut self, world: &W, mut input: InputState) -> Option<ClientInputBatch> {
        self.tick += 1;
        input.tick = self.tick;

        self.apply_correction();
        if let Err(err) = self.character.simulate(world, &input) {
            debug!(tick = self.tick, error = %err, "local prediction held position");
        }
        self.pending.push(input);

        self.send_timer -= self.character.controller().dt();
        if self.config.send_every_tick || self.send_timer <= 0.0 {
            self.send_timer = self.config.send_interval_secs;
            return Some(self.pending.to_batch(self.character.position()));
        }
        None
    }

    /// Reconcile against an authoritative snapshot of our own character.
    pub fn on_snapshot<W: PhysicsQuery + ?Sized>(
        &mut self,
        world: &W,
        snapshot: &AuthoritativeSnapshot,
    ) -> Result<ReconcileOutcome, ClientError> {
        let snapshot = EntitySnapshot::try_from(snapshot)?;
        if snapshot.entity_id != self.entity_id() {
            return Err(ClientError::WrongEntity {
                expected: self.entity_id(),
                found: snapshot.entity_id,
            });
        }

        let tick = snapshot.state.tick;
        if tick <= self.acknowledged {
            debug!(tick, acknowledged = self.acknowledged, "ignoring stale snapshot");
            return Ok(ReconcileOutcome::Stale {
                tick,
                acknowledged: self.acknowledged,
            });
        }
        self.acknowledged = tick;
        let removed = self.pending.acknowledge(tick);

        let live = self.character.capture();
        self.character.restore(&snapshot.state);
        self.character.set_replaying(true);
        for input in self.pending.iter() {
            let _ = self.character.simulate(world, input);
        }
        self.character.set_replaying(false);
        let predicted = self.character.capture();
        self.character.restore(&live);

        let offset = predicted.position - live.position;
        let error = offset.length();
        let smoothing = error > self.config.snap_distance;
        if smoothing {
            warn!(
                tick,
                error,
                live = %live.position,
                predicted = %predicted.position,
                "prediction error, smoothing toward corrected position"
            );
        }
        // Any correction left from an earlier snapshot is superseded
        self.correction = if smoothing { offset } else { Vec3::ZERO };

        self.last_authoritative = Some(snapshot.state);
        self.last_predicted = Some(predicted);
        Ok(ReconcileOutcome::Reconciled {
            tick,
            removed,
            replayed: self.pending.len(),
            error,
            smoothing,
        })
    }

    fn apply_correction(&mut self) {
        if self.correction == Vec3::ZERO {
            return;
        }
        let step = if self.correction.length() <= CORRECTION_EPSILON {
            self.correction
        } else {
            self.correction * self.config.smoothing_factor
        };
        let rotation = self.character.rotation();
        self.character
            .set_transform(self.character.position() + step, rotation);
        self.correction -= step;
    }
}
