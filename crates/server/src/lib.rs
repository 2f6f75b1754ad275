//! Vantage Authority
//!
//! The authority owns the true state of every character. It
//! - accepts sessions and spawns one character per session,
//! - applies each session's input batches strictly in tick order,
//! - flags clients whose claimed position drifts from its own,
//! - produces snapshots, both per batch and on a fixed broadcast interval,
//! - records replay artifacts of what it simulated.
//!
//! Each batch is handled atomically between host ticks; nothing survives a
//! call boundary except the per-session acknowledged tick.

#![deny(unsafe_code)]

pub mod session;
pub mod validation;

use std::collections::BTreeMap;

use glam::Vec3;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info, warn};
use vantage_geom::PhysicsQuery;
use vantage_replay::{BuildFingerprintData, ReplayError, ReplayRecorder};
use vantage_sim::{Character, EntityId, SimConfig, SimError, Tick};
use vantage_wire::{
    AuthoritativeSnapshot, ClientInputBatch, SNAPSHOT_VERSION, ServerWelcome, SessionId, SnapshotBroadcast, WireError,
    decode_envelope, encode_envelope, envelope::Payload,
};

use session::Session;
use validation::Rejection;

// ============================================================================
// Configuration
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Simulation tuning, shared with every client. Carries the tick rate.
    pub sim: SimConfig,
    pub max_sessions: usize,
    /// Distance between the claimed and the simulated position above which
    /// a batch is flagged.
    pub divergence_warning_distance: f32,
    /// Entries beyond this count are dropped, oldest first.
    pub max_inputs_per_batch: usize,
    /// Seconds between periodic snapshot broadcasts.
    pub broadcast_interval_secs: f32,
    pub record_replays: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            sim: SimConfig::default(),
            max_sessions: 16,
            divergence_warning_distance: 0.25,
            max_inputs_per_batch: 64,
            broadcast_interval_secs: 0.33,
            record_replays: false,
        }
    }
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("unknown session {0}")]
    UnknownSession(SessionId),

    #[error("session limit of {max} reached")]
    SessionLimit { max: usize },

    #[error("could not spawn character: {0}")]
    Spawn(#[from] SimError),

    #[error("undecodable message: {0}")]
    Wire(#[from] WireError),

    #[error("session {0} is not recording")]
    NotRecording(SessionId),

    #[error(transparent)]
    Replay(#[from] ReplayError),
}

// ============================================================================
// End Reason
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    Complete,
    Disconnect,
}

impl EndReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Complete => "complete",
            Self::Disconnect => "disconnect",
        }
    }
}

// ============================================================================
// Batch Outcome
// ============================================================================

/// What one [`Authority::receive_batch`] call did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchOutcome {
    /// Inputs simulated.
    pub processed: usize,
    /// Entries at or below the acknowledged tick.
    pub stale: usize,
    pub out_of_order: usize,
    pub malformed: usize,
    /// Entries dropped by the batch cap.
    pub truncated: usize,
    /// Ticks skipped between consecutive accepted inputs.
    pub missing_ticks: u64,
    /// Ticks whose movement was discarded because the character escaped
    /// the level.
    pub escaped: usize,
    /// Claimed-vs-simulated distance, when above the warning threshold.
    pub divergence: Option<f32>,
    /// Present when at least one input was simulated.
    pub snapshot: Option<AuthoritativeSnapshot>,
}

// ============================================================================
// Authority
// ============================================================================

pub struct Authority<W> {
    config: ServerConfig,
    world: W,
    sessions: BTreeMap<SessionId, Session>,
    next_session_id: SessionId,
    next_entity_id: EntityId,
    broadcast_accumulator: f32,
    build_fingerprint: Option<BuildFingerprintData>,
}

impl<W: PhysicsQuery> Authority<W> {
    /// # Panics
    /// If `config.sim.tick_rate_hz` is zero.
    pub fn new(world: W, config: ServerConfig) -> Self {
        assert!(config.sim.tick_rate_hz > 0, "tick_rate_hz must be positive");
        Self {
            config,
            world,
            sessions: BTreeMap::new(),
            next_session_id: 1,
            next_entity_id: 1,
            broadcast_accumulator: 0.0,
            build_fingerprint: None,
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn world(&self) -> &W {
        &self.world
    }

    /// Hosts move platforms through this between batches.
    pub fn world_mut(&mut self) -> &mut W {
        &mut self.world
    }

    pub fn set_build_fingerprint(&mut self, fingerprint: BuildFingerprintData) {
        for session in self.sessions.values_mut() {
            if let Some(recorder) = session.recorder.as_mut() {
                recorder.set_build_fingerprint(fingerprint.clone());
            }
        }
        self.build_fingerprint = Some(fingerprint);
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn session_ids(&self) -> Vec<SessionId> {
        self.sessions.keys().copied().collect()
    }

    pub fn character(&self, session_id: SessionId) -> Result<&Character, ServerError> {
        Ok(&self.session(session_id)?.character)
    }

    /// Tick of the newest input applied for `session_id`.
    pub fn last_processed_tick(&self, session_id: SessionId) -> Result<Tick, ServerError> {
        Ok(self.session(session_id)?.last_processed_tick)
    }

    /// Spawn a character at `spawn` for a new session.
    pub fn accept_session(&mut self, spawn: Vec3) -> Result<(SessionId, EntityId), ServerError> {
        if self.sessions.len() >= self.config.max_sessions {
            return Err(ServerError::SessionLimit {
                max: self.config.max_sessions,
            });
        }

        let entity_id = self.next_entity_id;
        let character = Character::new(entity_id, &self.config.sim, spawn)?;
        let session_id = self.next_session_id;
        self.next_session_id += 1;
        self.next_entity_id += 1;

        let mut session = Session::new(session_id, character);
        if self.config.record_replays {
            session.recorder = Some(self.new_recorder(&session.character));
        }
        self.sessions.insert(session_id, session);

        info!(session = session_id, entity = entity_id, %spawn, "session accepted");
        Ok((session_id, entity_id))
    }

    pub fn welcome(&self, session_id: SessionId) -> Result<ServerWelcome, ServerError> {
        let session = self.session(session_id)?;
        Ok(ServerWelcome {
            session_id,
            controlled_entity_id: session.entity_id(),
            tick_rate_hz: self.config.sim.tick_rate_hz,
            snapshot_version: SNAPSHOT_VERSION,
            spawn: Some(session.character.position().into()),
        })
    }

    /// Remove a session. Returns its replay artifact when recording.
    pub fn disconnect_session(
        &mut self,
        session_id: SessionId,
    ) -> Result<Option<vantage_wire::ReplayArtifact>, ServerError> {
        let session = self
            .sessions
            .remove(&session_id)
            .ok_or(ServerError::UnknownSession(session_id))?;
        info!(session = session_id, entity = session.entity_id(), "session disconnected");

        match session.recorder {
            Some(recorder) => Ok(Some(recorder.finalize(
                session.character.state_digest(),
                session.character.tick(),
                EndReason::Disconnect.as_str(),
            )?)),
            None => Ok(None),
        }
    }

    /// Close the session's current recording and start a new one from its
    /// present state.
    pub fn finalize_replay(
        &mut self,
        session_id: SessionId,
        reason: EndReason,
    ) -> Result<vantage_wire::ReplayArtifact, ServerError> {
        let session = self.session(session_id)?;
        if session.recorder.is_none() {
            return Err(ServerError::NotRecording(session_id));
        }
        let fresh = self.new_recorder(&session.character);
        let session = self.session_mut(session_id)?;
        let recorder = session
            .recorder
            .replace(fresh)
            .ok_or(ServerError::NotRecording(session_id))?;
        Ok(recorder.finalize(
            session.character.state_digest(),
            session.character.tick(),
            reason.as_str(),
        )?)
    }

    /// Decode an enveloped message from `session_id`. Only input batches are
    /// expected from clients; anything else is logged and ignored.
    pub fn receive_bytes(&mut self, session_id: SessionId, bytes: &[u8]) -> Result<Option<BatchOutcome>, ServerError> {
        match decode_envelope(bytes)? {
            Payload::InputBatch(batch) => self.receive_batch(session_id, &batch).map(Some),
            other => {
                warn!(session = session_id, payload = ?other, "unexpected message from client");
                Ok(None)
            }
        }
    }

    /// Apply every not-yet-processed input of `batch`, in order.
    pub fn receive_batch(&mut self, session_id: SessionId, batch: &ClientInputBatch) -> Result<BatchOutcome, ServerError> {
        let max_inputs = self.config.max_inputs_per_batch;
        let divergence_limit = self.config.divergence_warning_distance;
        let Self {
            world, sessions, ..
        } = self;
        let session = sessions
            .get_mut(&session_id)
            .ok_or(ServerError::UnknownSession(session_id))?;

        let mut outcome = BatchOutcome::default();
        let entries = validation::capped(&batch.inputs, max_inputs);
        outcome.truncated = batch.inputs.len() - entries.len();
        if outcome.truncated > 0 {
            error!(
                session = session_id,
                dropped = outcome.truncated,
                "input batch over cap, oldest entries dropped"
            );
        }

        let acked = session.last_processed_tick;
        for entry in entries {
            let input = match validation::classify(entry, acked, session.last_processed_tick) {
                Ok(input) => input,
                Err(Rejection::Stale { tick }) => {
                    debug!(session = session_id, tick, "skipping acknowledged input");
                    outcome.stale += 1;
                    continue;
                }
                Err(Rejection::OutOfOrder { tick, after }) => {
                    warn!(session = session_id, tick, after, "out-of-order input dropped");
                    outcome.out_of_order += 1;
                    continue;
                }
                Err(Rejection::Malformed(err)) => {
                    warn!(session = session_id, tick = entry.tick, error = %err, "malformed input dropped");
                    outcome.malformed += 1;
                    continue;
                }
            };

            let expected = session.last_processed_tick + 1;
            if input.tick > expected {
                let missing = input.tick - expected;
                warn!(
                    session = session_id,
                    expected,
                    received = input.tick,
                    missing,
                    "missing inputs"
                );
                outcome.missing_ticks += missing;
            }

            session.last_processed_tick = input.tick;
            if session.character.simulate(&*world, &input).is_err() {
                outcome.escaped += 1;
            }
            if let Some(recorder) = session.recorder.as_mut() {
                recorder.record_input(input);
            }
            outcome.processed += 1;
        }

        if outcome.processed == 0 {
            return Ok(outcome);
        }

        if let Some(claimed) = validation::claimed_position(batch) {
            let distance = claimed.distance(session.character.position());
            if distance > divergence_limit {
                warn!(
                    session = session_id,
                    tick = session.last_processed_tick,
                    distance,
                    %claimed,
                    authoritative = %session.character.position(),
                    "client position diverged from authority"
                );
                outcome.divergence = Some(distance);
            }
        }

        outcome.snapshot = Some(AuthoritativeSnapshot::from(&session.character.snapshot()));
        Ok(outcome)
    }

    pub fn snapshot_for(&self, session_id: SessionId) -> Result<AuthoritativeSnapshot, ServerError> {
        Ok(AuthoritativeSnapshot::from(
            &self.session(session_id)?.character.snapshot(),
        ))
    }

    /// Snapshots of every character, ordered by entity id.
    pub fn broadcast(&self) -> SnapshotBroadcast {
        let mut snapshots: Vec<_> = self
            .sessions
            .values()
            .map(|s| AuthoritativeSnapshot::from(&s.character.snapshot()))
            .collect();
        snapshots.sort_by_key(|s| s.entity_id);
        SnapshotBroadcast { snapshots }
    }

    /// Advance the broadcast timer by `dt` seconds; returns a broadcast
    /// each time the interval elapses.
    pub fn advance_broadcast(&mut self, dt: f32) -> Option<SnapshotBroadcast> {
        self.broadcast_accumulator += dt;
        if self.broadcast_accumulator < self.config.broadcast_interval_secs {
            return None;
        }
        self.broadcast_accumulator -= self.config.broadcast_interval_secs;
        Some(self.broadcast())
    }

    fn new_recorder(&self, character: &Character) -> ReplayRecorder {
        let mut recorder = ReplayRecorder::new(character.entity_id(), self.config.sim.clone(), character.capture());
        if let Some(fingerprint) = &self.build_fingerprint {
            recorder.set_build_fingerprint(fingerprint.clone());
        }
        recorder
    }

    fn session(&self, session_id: SessionId) -> Result<&Session, ServerError> {
        self.sessions
            .get(&session_id)
            .ok_or(ServerError::UnknownSession(session_id))
    }

    fn session_mut(&mut self, session_id: SessionId) -> Result<&mut Session, ServerError> {
        self.sessions
            .get_mut(&session_id)
            .ok_or(ServerError::UnknownSession(session_id))
    }
}

/// Enveloped bytes of a broadcast, identical for every recipient.
pub fn encode_broadcast(broadcast: SnapshotBroadcast) -> Vec<u8> {
    encode_envelope(Payload::Broadcast(broadcast))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::{Arc, Mutex};
    use vantage_geom::{Collider, CollisionWorld, Pose, Shape};
    use vantage_replay::{VerifyOptions, verify_replay};
    use vantage_sim::{EntitySnapshot, InputState};
    use vantage_wire::InputStateProto;

    fn floor() -> CollisionWorld {
        let mut world = CollisionWorld::new();
        world.add(Collider::new(
            Shape::Cuboid {
                half_extents: Vec3::new(50.0, 0.5, 50.0),
            },
            Pose::at(Vec3::new(0.0, -0.5, 0.0)),
        ));
        world
    }

    fn authority() -> Authority<CollisionWorld> {
        Authority::new(floor(), ServerConfig::default())
    }

    fn forward(tick: Tick) -> InputStateProto {
        InputState::new(tick).with_axes(0.0, 1.0).into()
    }

    fn batch(ticks: impl IntoIterator<Item = Tick>) -> ClientInputBatch {
        ClientInputBatch {
            inputs: ticks.into_iter().map(forward).collect(),
            claimed_position: None,
        }
    }

    #[test]
    fn test_accept_and_welcome() {
        let mut server = authority();
        let (s1, e1) = server.accept_session(Vec3::ZERO).unwrap();
        let (s2, e2) = server.accept_session(Vec3::new(3.0, 0.0, 0.0)).unwrap();
        assert_ne!(s1, s2);
        assert_ne!(e1, e2);
        assert_eq!(server.session_count(), 2);

        let welcome = server.welcome(s2).unwrap();
        assert_eq!(welcome.controlled_entity_id, e2);
        assert_eq!(welcome.tick_rate_hz, 50);
        assert_eq!(welcome.snapshot_version, SNAPSHOT_VERSION);
        assert_eq!(welcome.spawn, Some(Vec3::new(3.0, 0.0, 0.0).into()));
    }

    #[test]
    fn test_session_limit() {
        let config = ServerConfig {
            max_sessions: 1,
            ..Default::default()
        };
        let mut server = Authority::new(floor(), config);
        server.accept_session(Vec3::ZERO).unwrap();
        assert!(matches!(
            server.accept_session(Vec3::ZERO),
            Err(ServerError::SessionLimit { max: 1 })
        ));
    }

    #[test]
    fn test_unknown_session() {
        let mut server = authority();
        assert!(matches!(
            server.receive_batch(9, &batch([1])),
            Err(ServerError::UnknownSession(9))
        ));
        assert!(matches!(server.disconnect_session(9), Err(ServerError::UnknownSession(9))));
    }

    #[test]
    fn test_batch_processed_in_order() {
        let mut server = authority();
        let (session, entity) = server.accept_session(Vec3::ZERO).unwrap();

        let outcome = server.receive_batch(session, &batch(1..=5)).unwrap();
        assert_eq!(outcome.processed, 5);
        assert_eq!(server.last_processed_tick(session).unwrap(), 5);

        let snapshot = outcome.snapshot.unwrap();
        assert_eq!(snapshot.entity_id, entity);
        assert_eq!(snapshot.tick(), 5);
        let decoded = EntitySnapshot::try_from(&snapshot).unwrap();
        // 5 ticks at 6 m/s, 50 Hz
        assert!((decoded.state.position - Vec3::new(0.0, 0.0, 0.6)).length() < 1e-4);
    }

    #[test]
    fn test_resent_inputs_skipped() {
        let mut server = authority();
        let (session, _) = server.accept_session(Vec3::ZERO).unwrap();
        server.receive_batch(session, &batch(1..=3)).unwrap();
        let after_three = server.character(session).unwrap().capture();

        let outcome = server.receive_batch(session, &batch(1..=5)).unwrap();
        assert_eq!(outcome.stale, 3);
        assert_eq!(outcome.processed, 2);
        assert_eq!(server.last_processed_tick(session).unwrap(), 5);
        assert_ne!(server.character(session).unwrap().capture(), after_three);
    }

    #[test]
    fn test_fully_acknowledged_batch_is_a_no_op() {
        let mut server = authority();
        let (session, _) = server.accept_session(Vec3::ZERO).unwrap();
        server.receive_batch(session, &batch(1..=4)).unwrap();
        let before = server.character(session).unwrap().capture();

        let outcome = server.receive_batch(session, &batch(2..=4)).unwrap();
        assert_eq!(outcome.processed, 0);
        assert_eq!(outcome.stale, 3);
        assert!(outcome.snapshot.is_none());
        assert_eq!(server.character(session).unwrap().capture(), before);
    }

    #[test]
    fn test_gap_reported_but_processed() {
        let mut server = authority();
        let (session, _) = server.accept_session(Vec3::ZERO).unwrap();
        server.receive_batch(session, &batch([1, 2])).unwrap();

        let outcome = server.receive_batch(session, &batch([5, 6, 8])).unwrap();
        assert_eq!(outcome.processed, 3);
        assert_eq!(outcome.missing_ticks, 3);
        assert_eq!(server.last_processed_tick(session).unwrap(), 8);
    }

    #[test]
    fn test_out_of_order_entries_dropped() {
        let mut server = authority();
        let (session, _) = server.accept_session(Vec3::ZERO).unwrap();
        let outcome = server.receive_batch(session, &batch([1, 3, 2, 4])).unwrap();
        assert_eq!(outcome.processed, 3);
        assert_eq!(outcome.out_of_order, 1);
        assert_eq!(server.last_processed_tick(session).unwrap(), 4);
    }

    #[test]
    fn test_malformed_entry_dropped() {
        let mut server = authority();
        let (session, _) = server.accept_session(Vec3::ZERO).unwrap();
        let mut b = batch(1..=3);
        b.inputs[1].horizontal = 1000;
        let outcome = server.receive_batch(session, &b).unwrap();
        assert_eq!(outcome.malformed, 1);
        assert_eq!(outcome.processed, 2);
    }

    #[test]
    fn test_batch_cap() {
        let config = ServerConfig {
            max_inputs_per_batch: 4,
            ..Default::default()
        };
        let mut server = Authority::new(floor(), config);
        let (session, _) = server.accept_session(Vec3::ZERO).unwrap();
        let outcome = server.receive_batch(session, &batch(1..=10)).unwrap();
        assert_eq!(outcome.truncated, 6);
        assert_eq!(outcome.processed, 4);
        assert_eq!(outcome.missing_ticks, 6);
        assert_eq!(server.last_processed_tick(session).unwrap(), 10);
    }

    #[derive(Clone, Default)]
    struct LogBuffer(Arc<Mutex<Vec<u8>>>);

    impl io::Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_batch_cap_trim_logged_as_error() {
        let logs = LogBuffer::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::TRACE)
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            let config = ServerConfig {
                max_inputs_per_batch: 4,
                ..Default::default()
            };
            let mut server = Authority::new(floor(), config);
            let (session, _) = server.accept_session(Vec3::ZERO).unwrap();
            server.receive_batch(session, &batch(1..=10)).unwrap();
        });

        let output = String::from_utf8(logs.0.lock().unwrap().clone()).unwrap();
        let line = output
            .lines()
            .find(|l| l.contains("input batch over cap"))
            .expect("trim is logged");
        assert!(line.contains("ERROR"), "{line}");
        assert!(line.contains("dropped=6"), "{line}");
    }

    #[test]
    fn test_divergence_flagged() {
        let mut server = authority();
        let (session, _) = server.accept_session(Vec3::ZERO).unwrap();

        let mut honest = batch(1..=5);
        honest.claimed_position = Some(Vec3::new(0.0, 0.0, 0.6).into());
        let outcome = server.receive_batch(session, &honest).unwrap();
        assert_eq!(outcome.divergence, None);

        let mut cheating = batch(6..=7);
        cheating.claimed_position = Some(Vec3::new(0.0, 0.0, 5.0).into());
        let outcome = server.receive_batch(session, &cheating).unwrap();
        let distance = outcome.divergence.unwrap();
        assert!((distance - (5.0 - 0.84)).abs() < 1e-3);

        // Authority keeps its own result
        let z = server.character(session).unwrap().position().z;
        assert!((z - 0.84).abs() < 1e-4);
    }

    #[test]
    fn test_receive_bytes() {
        let mut server = authority();
        let (session, _) = server.accept_session(Vec3::ZERO).unwrap();
        let bytes = encode_envelope(Payload::InputBatch(batch(1..=2)));
        let outcome = server.receive_bytes(session, &bytes).unwrap().unwrap();
        assert_eq!(outcome.processed, 2);

        let stray = encode_envelope(Payload::Broadcast(SnapshotBroadcast::default()));
        assert!(server.receive_bytes(session, &stray).unwrap().is_none());
        assert!(matches!(
            server.receive_bytes(session, &[0xff, 0xff]),
            Err(ServerError::Wire(_))
        ));
    }

    #[test]
    fn test_broadcast_interval() {
        let mut server = authority();
        server.accept_session(Vec3::new(2.0, 0.0, 0.0)).unwrap();
        server.accept_session(Vec3::ZERO).unwrap();

        assert!(server.advance_broadcast(0.2).is_none());
        let broadcast = server.advance_broadcast(0.2).unwrap();
        assert_eq!(broadcast.snapshots.len(), 2);
        assert!(broadcast.snapshots[0].entity_id < broadcast.snapshots[1].entity_id);
        // 0.07 carried over
        assert!(server.advance_broadcast(0.2).is_none());
        assert!(server.advance_broadcast(0.1).is_some());

        let bytes = encode_broadcast(server.broadcast());
        let Payload::Broadcast(decoded) = decode_envelope(&bytes).unwrap() else {
            panic!("expected a broadcast");
        };
        assert_eq!(decoded, server.broadcast());
    }

    #[test]
    fn test_disconnect_without_recording() {
        let mut server = authority();
        let (session, _) = server.accept_session(Vec3::ZERO).unwrap();
        assert!(server.disconnect_session(session).unwrap().is_none());
        assert_eq!(server.session_count(), 0);
        assert!(matches!(
            server.finalize_replay(session, EndReason::Complete),
            Err(ServerError::UnknownSession(_))
        ));
    }

    #[test]
    fn test_recorded_session_verifies() {
        let config = ServerConfig {
            record_replays: true,
            ..Default::default()
        };
        let mut server = Authority::new(floor(), config);
        let (session, _) = server.accept_session(Vec3::ZERO).unwrap();
        server.receive_batch(session, &batch(1..=10)).unwrap();
        // Resends and gaps are recorded exactly as applied
        server.receive_batch(session, &batch([8, 9, 10, 13, 14])).unwrap();

        let artifact = server.finalize_replay(session, EndReason::Complete).unwrap();
        assert_eq!(artifact.inputs.len(), 12);
        assert_eq!(artifact.checkpoint_tick, 14);
        assert_eq!(artifact.end_reason, "complete");
        verify_replay(&artifact, server.world(), &VerifyOptions::default()).unwrap();

        // Recording restarts from the current state
        server.receive_batch(session, &batch(15..=20)).unwrap();
        let artifact = server.disconnect_session(session).unwrap().unwrap();
        assert_eq!(artifact.initial_state.as_ref().unwrap().tick, 14);
        assert_eq!(artifact.inputs.len(), 6);
        assert_eq!(artifact.end_reason, "disconnect");
        verify_replay(&artifact, &floor(), &VerifyOptions::default()).unwrap();
    }

    #[test]
    fn test_config_from_partial_json() {
        let config: ServerConfig = serde_json::from_str(r#"{"max_sessions": 4}"#).unwrap();
        assert_eq!(config.max_sessions, 4);
        assert_eq!(config.divergence_warning_distance, 0.25);
        assert_eq!(config.sim, SimConfig::default());
    }
}
