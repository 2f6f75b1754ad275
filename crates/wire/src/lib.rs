//! Vantage Wire Protocol Types
//!
//! Shared Protobuf message types exchanged between the owning client, the
//! authority and remote observers. Every peer links this crate so the schema
//! cannot drift between them.
//!
//! # Message Categories
//!
//! - **Session**: [`ClientHello`] / [`ServerWelcome`].
//! - **Realtime**: [`ClientInputBatch`] (client to authority) and
//!   [`AuthoritativeSnapshot`] / [`SnapshotBroadcast`] (authority to peers).
//! - **Replay**: [`ReplayArtifact`] and its parts.
//!
//! All realtime traffic is wrapped in an [`Envelope`]; use [`encode_envelope`]
//! and [`decode_envelope`] at the transport boundary.

#![deny(unsafe_code)]

use glam::{Quat, Vec3};
use prost::Message;
use thiserror::Error;
use vantage_geom::ColliderId;
use vantage_sim::{Buttons, CharacterState, EntitySnapshot, InputState, LocomotionState};

// ============================================================================
// Type Aliases (matching simulation crate)
// ============================================================================

pub type Tick = vantage_sim::Tick;

pub type EntityId = vantage_sim::EntityId;

/// Identifies one connected client on the authority.
pub type SessionId = u64;

/// Current [`AuthoritativeSnapshot`] layout. Decoders refuse anything else.
pub const SNAPSHOT_VERSION: u32 = 1;

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Error)]
pub enum WireError {
    #[error("malformed message: {0}")]
    Decode(#[from] prost::DecodeError),

    #[error("missing required field `{field}`")]
    MissingField { field: &'static str },

    #[error("unsupported snapshot version {found} (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },

    #[error("envelope carries no payload")]
    EmptyEnvelope,

    #[error("field `{field}` is out of range")]
    OutOfRange { field: &'static str },
}

// ============================================================================
// Primitives
// ============================================================================

#[derive(Clone, Copy, PartialEq, Message)]
pub struct Vec3Proto {
    #[prost(float, tag = "1")]
    pub x: f32,
    #[prost(float, tag = "2")]
    pub y: f32,
    #[prost(float, tag = "3")]
    pub z: f32,
}

#[derive(Clone, Copy, PartialEq, Message)]
pub struct QuatProto {
    #[prost(float, tag = "1")]
    pub x: f32,
    #[prost(float, tag = "2")]
    pub y: f32,
    #[prost(float, tag = "3")]
    pub z: f32,
    #[prost(float, tag = "4")]
    pub w: f32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum LocomotionStateProto {
    Walk = 0,
    Jump = 1,
    Fall = 2,
}

/// Collider a character is standing on and its last known position.
#[derive(Clone, Copy, PartialEq, Message)]
pub struct AnchorProto {
    #[prost(uint32, tag = "1")]
    pub collider: u32,

    #[prost(message, optional, tag = "2")]
    pub position: Option<Vec3Proto>,
}

// ============================================================================
// Session Messages
// ============================================================================

/// Client asks to join.
#[derive(Clone, PartialEq, Message)]
pub struct ClientHello {
    /// Requested spawn point. The authority may ignore it.
    #[prost(message, optional, tag = "1")]
    pub spawn: Option<Vec3Proto>,
}

#[derive(Clone, PartialEq, Message)]
pub struct ServerWelcome {
    #[prost(uint64, tag = "1")]
    pub session_id: SessionId,

    /// Character this client controls.
    #[prost(uint64, tag = "2")]
    pub controlled_entity_id: EntityId,

    /// Authority tick rate in Hz. Clients must simulate at the same rate.
    #[prost(uint32, tag = "3")]
    pub tick_rate_hz: u32,

    #[prost(uint32, tag = "4")]
    pub snapshot_version: u32,

    /// Where the character was actually spawned.
    #[prost(message, optional, tag = "5")]
    pub spawn: Option<Vec3Proto>,
}

// ============================================================================
// Realtime Messages
// ============================================================================

/// One tick of quantized input, exactly as simulated.
#[derive(Clone, Copy, PartialEq, Message)]
pub struct InputStateProto {
    #[prost(uint64, tag = "1")]
    pub tick: Tick,

    /// Strafe axis, `i8` on the simulation side.
    #[prost(sint32, tag = "2")]
    pub horizontal: i32,

    /// Forward axis, `i8` on the simulation side.
    #[prost(sint32, tag = "3")]
    pub vertical: i32,

    /// Pitch in tenths of a degree, `i16` on the simulation side.
    #[prost(sint32, tag = "4")]
    pub pitch: i32,

    /// Yaw in tenths of a degree, `i16` on the simulation side.
    #[prost(sint32, tag = "5")]
    pub yaw: i32,

    #[prost(uint32, tag = "6")]
    pub buttons: u32,
}

/// Every unacknowledged input, oldest first, plus where the client thinks
/// it ended up.
#[derive(Clone, PartialEq, Message)]
pub struct ClientInputBatch {
    #[prost(message, repeated, tag = "1")]
    pub inputs: Vec<InputStateProto>,

    #[prost(message, optional, tag = "2")]
    pub claimed_position: Option<Vec3Proto>,
}

/// Full simulation state of one character at a tick.
#[derive(Clone, PartialEq, Message)]
pub struct CharacterStateProto {
    #[prost(uint64, tag = "1")]
    pub tick: Tick,

    #[prost(message, optional, tag = "2")]
    pub position: Option<Vec3Proto>,

    #[prost(message, optional, tag = "3")]
    pub rotation: Option<QuatProto>,

    #[prost(message, optional, tag = "4")]
    pub velocity: Option<Vec3Proto>,

    #[prost(enumeration = "LocomotionStateProto", tag = "5")]
    pub locomotion_state: i32,

    #[prost(bool, tag = "6")]
    pub clamping: bool,

    #[prost(message, optional, tag = "7")]
    pub anchor: Option<AnchorProto>,
}

/// Authority's view of one character after its latest processed input.
#[derive(Clone, PartialEq, Message)]
pub struct AuthoritativeSnapshot {
    /// Layout version, see [`SNAPSHOT_VERSION`].
    #[prost(uint32, tag = "1")]
    pub version: u32,

    #[prost(uint64, tag = "2")]
    pub entity_id: EntityId,

    #[prost(message, optional, tag = "3")]
    pub state: Option<CharacterStateProto>,
}

impl AuthoritativeSnapshot {
    /// Tick of the last input applied, or 0 when the state is missing.
    pub fn tick(&self) -> Tick {
        self.state.as_ref().map_or(0, |s| s.tick)
    }
}

/// Periodic broadcast of every character, ordered by entity id.
#[derive(Clone, PartialEq, Message)]
pub struct SnapshotBroadcast {
    #[prost(message, repeated, tag = "1")]
    pub snapshots: Vec<AuthoritativeSnapshot>,
}

#[derive(Clone, PartialEq, Message)]
pub struct Envelope {
    #[prost(oneof = "envelope::Payload", tags = "1, 2, 3, 4, 5")]
    pub payload: Option<envelope::Payload>,
}

pub mod envelope {
    #[derive(Clone, PartialEq, prost::Oneof)]
    pub enum Payload {
        #[prost(message, tag = "1")]
        Hello(super::ClientHello),
        #[prost(message, tag = "2")]
        Welcome(super::ServerWelcome),
        #[prost(message, tag = "3")]
        InputBatch(super::ClientInputBatch),
        #[prost(message, tag = "4")]
        Snapshot(super::AuthoritativeSnapshot),
        #[prost(message, tag = "5")]
        Broadcast(super::SnapshotBroadcast),
    }
}

pub fn encode_envelope(payload: envelope::Payload) -> Vec<u8> {
    Envelope {
        payload: Some(payload),
    }
    .encode_to_vec()
}

pub fn decode_envelope(bytes: &[u8]) -> Result<envelope::Payload, WireError> {
    Envelope::decode(bytes)?.payload.ok_or(WireError::EmptyEnvelope)
}

// ============================================================================
// Replay Artifact Types
// ============================================================================

/// Build fingerprint for replay scope verification.
#[derive(Clone, PartialEq, Message)]
pub struct BuildFingerprint {
    /// SHA-256 of the recording executable's bytes.
    #[prost(string, tag = "1")]
    pub binary_sha256: String,

    /// Target triple (e.g., "x86_64-unknown-linux-gnu").
    #[prost(string, tag = "2")]
    pub target_triple: String,

    /// Build profile ("release" or "dev").
    #[prost(string, tag = "3")]
    pub profile: String,

    /// Git commit hash (metadata/traceability).
    #[prost(string, tag = "4")]
    pub git_commit: String,
}

/// Everything needed to re-simulate one character's authoritative history.
#[derive(Clone, PartialEq, Message)]
pub struct ReplayArtifact {
    /// Schema version (starts at 1).
    #[prost(uint32, tag = "1")]
    pub replay_format_version: u32,

    #[prost(uint64, tag = "2")]
    pub entity_id: EntityId,

    #[prost(uint32, tag = "3")]
    pub tick_rate_hz: u32,

    /// See `vantage_sim::STATE_DIGEST_ALGO_ID`.
    #[prost(string, tag = "4")]
    pub state_digest_algo_id: String,

    /// State when recording started.
    #[prost(message, optional, tag = "5")]
    pub initial_state: Option<CharacterStateProto>,

    /// Inputs in the order the authority applied them.
    #[prost(message, repeated, tag = "6")]
    pub inputs: Vec<InputStateProto>,

    #[prost(message, optional, tag = "7")]
    pub build_fingerprint: Option<BuildFingerprint>,

    /// StateDigest after the last recorded input.
    #[prost(uint64, tag = "8")]
    pub final_digest: u64,

    #[prost(uint64, tag = "9")]
    pub checkpoint_tick: Tick,

    #[prost(string, tag = "10")]
    pub end_reason: String,

    /// Simulation tuning in effect while recording, as JSON.
    #[prost(string, tag = "11")]
    pub sim_config_json: String,
}

// ============================================================================
// Conversion Traits
// ============================================================================

impl From<Vec3> for Vec3Proto {
    fn from(v: Vec3) -> Self {
        Self {
            x: v.x,
            y: v.y,
            z: v.z,
        }
    }
}

impl From<Vec3Proto> for Vec3 {
    fn from(v: Vec3Proto) -> Self {
        Vec3::new(v.x, v.y, v.z)
    }
}

impl From<Quat> for QuatProto {
    fn from(q: Quat) -> Self {
        Self {
            x: q.x,
            y: q.y,
            z: q.z,
            w: q.w,
        }
    }
}

impl From<QuatProto> for Quat {
    fn from(q: QuatProto) -> Self {
        Quat::from_xyzw(q.x, q.y, q.z, q.w)
    }
}

impl From<LocomotionState> for LocomotionStateProto {
    fn from(state: LocomotionState) -> Self {
        match state {
            LocomotionState::Walk => Self::Walk,
            LocomotionState::Jump => Self::Jump,
            LocomotionState::Fall => Self::Fall,
        }
    }
}

impl From<LocomotionStateProto> for LocomotionState {
    fn from(state: LocomotionStateProto) -> Self {
        match state {
            LocomotionStateProto::Walk => Self::Walk,
            LocomotionStateProto::Jump => Self::Jump,
            LocomotionStateProto::Fall => Self::Fall,
        }
    }
}

impl From<InputState> for InputStateProto {
    fn from(input: InputState) -> Self {
        let (horizontal, vertical) = input.raw_axes();
        let (pitch, yaw) = input.raw_look();
        Self {
            tick: input.tick,
            horizontal: horizontal.into(),
            vertical: vertical.into(),
            pitch: pitch.into(),
            yaw: yaw.into(),
            buttons: input.buttons.bits().into(),
        }
    }
}

impl TryFrom<InputStateProto> for InputState {
    type Error = WireError;

    fn try_from(p: InputStateProto) -> Result<Self, Self::Error> {
        let horizontal = i8::try_from(p.horizontal).map_err(|_| WireError::OutOfRange { field: "horizontal" })?;
        let vertical = i8::try_from(p.vertical).map_err(|_| WireError::OutOfRange { field: "vertical" })?;
        let pitch = i16::try_from(p.pitch).map_err(|_| WireError::OutOfRange { field: "pitch" })?;
        let yaw = i16::try_from(p.yaw).map_err(|_| WireError::OutOfRange { field: "yaw" })?;
        let buttons = u8::try_from(p.buttons)
            .ok()
            .and_then(Buttons::from_bits)
            .ok_or(WireError::OutOfRange { field: "buttons" })?;
        Ok(InputState::from_raw(p.tick, horizontal, vertical, pitch, yaw, buttons))
    }
}

impl From<&CharacterState> for CharacterStateProto {
    fn from(s: &CharacterState) -> Self {
        Self {
            tick: s.tick,
            position: Some(s.position.into()),
            rotation: Some(s.rotation.into()),
            velocity: Some(s.velocity.into()),
            locomotion_state: LocomotionStateProto::from(s.locomotion).into(),
            clamping: s.clamping,
            anchor: s.anchor.map(|(collider, position)| AnchorProto {
                collider: collider.0,
                position: Some(position.into()),
            }),
        }
    }
}

impl TryFrom<&CharacterStateProto> for CharacterState {
    type Error = WireError;

    fn try_from(p: &CharacterStateProto) -> Result<Self, Self::Error> {
        let position: Vec3 = p.position.ok_or(WireError::MissingField { field: "position" })?.into();
        let rotation: Quat = p.rotation.ok_or(WireError::MissingField { field: "rotation" })?.into();
        let velocity: Vec3 = p.velocity.ok_or(WireError::MissingField { field: "velocity" })?.into();
        if !position.is_finite() {
            return Err(WireError::OutOfRange { field: "position" });
        }
        if !rotation.is_finite() {
            return Err(WireError::OutOfRange { field: "rotation" });
        }
        if !velocity.is_finite() {
            return Err(WireError::OutOfRange { field: "velocity" });
        }
        let locomotion = LocomotionStateProto::try_from(p.locomotion_state)
            .map_err(|_| WireError::OutOfRange {
                field: "locomotion_state",
            })?
            .into();
        let anchor = match p.anchor {
            Some(anchor) => {
                let position = anchor.position.ok_or(WireError::MissingField {
                    field: "anchor.position",
                })?;
                Some((ColliderId(anchor.collider), position.into()))
            }
            None => None,
        };
        Ok(CharacterState {
            tick: p.tick,
            position,
            rotation,
            velocity,
            locomotion,
            clamping: p.clamping,
            anchor,
        })
    }
}

impl From<&EntitySnapshot> for AuthoritativeSnapshot {
    fn from(s: &EntitySnapshot) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            entity_id: s.entity_id,
            state: Some((&s.state).into()),
        }
    }
}

impl TryFrom<&AuthoritativeSnapshot> for EntitySnapshot {
    type Error = WireError;

    fn try_from(s: &AuthoritativeSnapshot) -> Result<Self, Self::Error> {
        if s.version != SNAPSHOT_VERSION {
            return Err(WireError::UnsupportedVersion {
                found: s.version,
                expected: SNAPSHOT_VERSION,
            });
        }
        let state = s.state.as_ref().ok_or(WireError::MissingField { field: "state" })?;
        Ok(EntitySnapshot {
            entity_id: s.entity_id,
            state: state.try_into()?,
        })
    }
}

impl ClientInputBatch {
    /// Decode every input, failing on the first malformed one.
    pub fn decode_inputs(&self) -> Result<Vec<InputState>, WireError> {
        self.inputs.iter().map(|p| InputState::try_from(*p)).collect()
    }

    pub fn claimed_position(&self) -> Option<Vec3> {
        self.claimed_position.map(Into::into)
    }
}

// ============================================================================
// Tests
// ============================================================================
