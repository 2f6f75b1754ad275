//! Vantage Simulation Core
//!
//! The deterministic, fixed-timestep character simulation shared by the
//! authority and the owning client. Given the same starting
//! [`CharacterState`], the same collision world and the same sequence of
//! [`InputState`]s, every peer computes bit-identical positions. This is what
//! makes client-side prediction and server reconciliation work.
//!
//! # Constraints
//!
//! The simulation MUST NOT:
//! - Perform I/O operations (file, network, etc.)
//! - Read wall-clock time
//! - Depend on frame rate or variable delta time
//!
//! Scene access goes through [`vantage_geom::PhysicsQuery`] only.
//!
//! # Modules
//!
//! - [`input`]: quantized per-tick input.
//! - [`ground`]: five-ray ground probe.
//! - [`controller`]: the per-tick collision pipeline.
//! - [`motor`] / [`state_machine`]: walk / jump / fall locomotion.
//! - [`character`]: controller + locomotion + rotation, with capture/restore.

#![deny(unsafe_code)]

pub mod character;
pub mod config;
pub mod controller;
pub mod ground;
pub mod input;
pub mod motor;
pub mod state_machine;

use glam::Vec3;
use thiserror::Error;

pub use character::{Character, CharacterEvent, CharacterState, EntitySnapshot, state_digest};
pub use config::{CollisionSphere, ControllerConfig, MotorConfig, ProbeConfig, SimConfig};
pub use controller::{CharacterController, Collision, PushbackReport, StepReport};
pub use ground::{Ground, GroundHit, ProbeFrame};
pub use input::{Buttons, InputState};
pub use motor::{Locomotion, LocomotionState, Motor, MotorContext, MotorEvent, Still};
pub use state_machine::{StateHandlers, StateMachine, StateTable};

// ============================================================================
// Type Aliases
// ============================================================================

/// A single discrete simulation timestep; the atomic unit of game time.
pub type Tick = u64;

/// Unique identifier for a simulated character.
pub type EntityId = u64;

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SimError {
    /// No walkable surface below the character. The tick's movement was
    /// discarded and the character held at `position`.
    #[error("character escaped the level at {position}")]
    EscapedLevel { position: Vec3 },

    #[error("controller has no {kind} sphere")]
    MissingSphere { kind: &'static str },
}

// ============================================================================
// StateDigest
// ============================================================================

/// StateDigest algorithm identifier. Recorded in replay artifacts so a
/// verifier can refuse digests it does not know how to compute.
pub const STATE_DIGEST_ALGO_ID: &str = "statedigest-v1-fnv1a64-le-f32canon-char";

/// FNV-1a 64-bit offset basis.
const FNV1A_OFFSET_BASIS: u64 = 0xcbf29ce484222325;

/// FNV-1a 64-bit prime.
const FNV1A_PRIME: u64 = 0x100000001b3;

/// FNV-1a 64-bit hasher for StateDigest computation.
#[derive(Debug, Clone)]
pub(crate) struct Fnv1a64 {
    state: u64,
}

impl Fnv1a64 {
    pub(crate) fn new() -> Self {
        Self {
            state: FNV1A_OFFSET_BASIS,
        }
    }

    pub(crate) fn update(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.state ^= u64::from(byte);
            self.state = self.state.wrapping_mul(FNV1A_PRIME);
        }
    }

    pub(crate) fn update_f32(&mut self, value: f32) {
        self.update(&canonicalize_f32(value).to_le_bytes());
    }

    pub(crate) fn update_vec3(&mut self, v: Vec3) {
        for c in v.to_array() {
            self.update_f32(c);
        }
    }

    pub(crate) fn finish(self) -> u64 {
        self.state
    }
}

/// Canonicalize an f32 value for deterministic hashing.
///
/// Rules:
/// - `-0.0` → `+0.0`
/// - Any NaN → quiet NaN bit pattern `0x7fc00000`
pub(crate) fn canonicalize_f32(value: f32) -> u32 {
    const QUIET_NAN_BITS: u32 = 0x7fc0_0000;

    if value.is_nan() {
        QUIET_NAN_BITS
    } else if value == 0.0 {
        // Both +0.0 and -0.0 compare equal to 0.0
        0u32
    } else {
        value.to_bits()
    }
}
