//! Vantage Replay System
//!
//! Records one character's authoritative input history and verifies that
//! re-simulating it from the recorded starting state lands on the recorded
//! digest.
//!
//! - [`ReplayRecorder`] collects the inputs the authority applied.
//! - [`verify_replay`] re-simulates an artifact against a collision world.
//! - [`acquire_build_fingerprint`] scopes verification to one build.

#![deny(unsafe_code)]

use std::fs;
use std::io::{self, Read, Write};
use std::path::Path;

use prost::Message;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::warn;
use vantage_geom::PhysicsQuery;
use vantage_sim::{Character, CharacterState, EntityId, InputState, STATE_DIGEST_ALGO_ID, SimConfig, Tick};
use vantage_wire::{BuildFingerprint, CharacterStateProto, ReplayArtifact, WireError};

/// Artifact layout version written by [`ReplayRecorder::finalize`].
pub const REPLAY_FORMAT_VERSION: u32 = 1;

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("replay I/O failed: {0}")]
    Io(#[from] io::Error),

    #[error("replay artifact already exists at {0}")]
    AlreadyExists(String),

    #[error("failed to decode replay: {0}")]
    Decode(#[from] prost::DecodeError),

    #[error("simulation config is not valid JSON: {0}")]
    Config(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("build fingerprint mismatch: expected {expected}, got {actual}")]
    BuildMismatch { expected: String, actual: String },

    #[error("unsupported replay format version {0}")]
    UnsupportedFormat(u32),

    #[error("unknown state digest algorithm `{0}`")]
    UnsupportedDigestAlgorithm(String),

    #[error("replay has no initial state")]
    MissingInitialState,

    #[error("recorded tick rate {recorded} Hz does not match config {configured} Hz")]
    TickRateMismatch { recorded: u32, configured: u32 },

    #[error("input stream invalid: {reason}")]
    InputStreamInvalid { reason: String },

    #[error("checkpoint tick mismatch: expected {expected}, got {actual}")]
    CheckpointTickMismatch { expected: Tick, actual: Tick },

    #[error("final digest mismatch: expected {expected:#x}, got {actual:#x} ({escaped} ticks escaped the level)")]
    FinalDigestMismatch { expected: u64, actual: u64, escaped: usize },

    #[error("invalid replay format: {0}")]
    InvalidFormat(#[from] WireError),

    #[error("invalid simulation config: {0}")]
    InvalidConfig(#[from] serde_json::Error),

    #[error("failed to spawn replay character: {0}")]
    Spawn(#[from] vantage_sim::SimError),
}

// ============================================================================
// Replay Recorder
// ============================================================================

/// Build fingerprint data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildFingerprintData {
    pub binary_sha256: String,
    pub target_triple: String,
    pub profile: String,
    pub git_commit: String,
}

impl From<BuildFingerprintData> for BuildFingerprint {
    fn from(f: BuildFingerprintData) -> Self {
        Self {
            binary_sha256: f.binary_sha256,
            target_triple: f.target_triple,
            profile: f.profile,
            git_commit: f.git_commit,
        }
    }
}

/// Records one character's applied inputs for artifact generation.
#[derive(Debug, Clone)]
pub struct ReplayRecorder {
    entity_id: EntityId,
    sim_config: SimConfig,
    initial_state: CharacterState,
    inputs: Vec<InputState>,
    build_fingerprint: Option<BuildFingerprintData>,
}

impl ReplayRecorder {
    /// Start recording from `initial_state`.
    pub fn new(entity_id: EntityId, sim_config: SimConfig, initial_state: CharacterState) -> Self {
        Self {
            entity_id,
            sim_config,
            initial_state,
            inputs: Vec::new(),
            build_fingerprint: None,
        }
    }

    pub fn entity_id(&self) -> EntityId {
        self.entity_id
    }

    /// Record an input the authority just simulated.
    pub fn record_input(&mut self, input: InputState) {
        self.inputs.push(input);
    }

    pub fn input_count(&self) -> usize {
        self.inputs.len()
    }

    pub fn set_build_fingerprint(&mut self, fingerprint: BuildFingerprintData) {
        self.build_fingerprint = Some(fingerprint);
    }

    /// Finalize the replay artifact.
    pub fn finalize(self, final_digest: u64, checkpoint_tick: Tick, end_reason: &str) -> Result<ReplayArtifact, ReplayError> {
        Ok(ReplayArtifact {
            replay_format_version: REPLAY_FORMAT_VERSION,
            entity_id: self.entity_id,
            tick_rate_hz: self.sim_config.tick_rate_hz,
            state_digest_algo_id: STATE_DIGEST_ALGO_ID.to_string(),
            initial_state: Some(CharacterStateProto::from(&self.initial_state)),
            inputs: self.inputs.into_iter().map(Into::into).collect(),
            build_fingerprint: self.build_fingerprint.map(Into::into),
            final_digest,
            checkpoint_tick,
            end_reason: end_reason.to_string(),
            sim_config_json: serde_json::to_string(&self.sim_config)?,
        })
    }
}

// ============================================================================
// Replay Verification
// ============================================================================

/// Options for replay verification.
#[derive(Debug, Clone)]
pub struct VerifyOptions {
    /// Fail on a build mismatch instead of warning.
    pub strict_build_check: bool,
    pub current_build: Option<BuildFingerprintData>,
}

impl Default for VerifyOptions {
    fn default() -> Self {
        Self {
            strict_build_check: true,
            current_build: None,
        }
    }
}

/// Re-simulate `artifact` in `world` and check it reproduces the recorded
/// outcome.
///
/// Steps:
/// 1. Check the build fingerprint (strict: fail, otherwise warn).
/// 2. Check format version and digest algorithm.
/// 3. Decode the recorded simulation config and initial state.
/// 4. Validate the input stream: ticks strictly increasing, all after the
///    initial tick, the last one equal to the checkpoint tick.
/// 5. Spawn, restore the initial state and replay every input.
/// 6. Compare the tick and the state digest.
///
/// `world` must hold the same colliders, at the same poses, as the
/// authority's world did while recording.
pub fn verify_replay<W: PhysicsQuery + ?Sized>(
    artifact: &ReplayArtifact,
    world: &W,
    options: &VerifyOptions,
) -> Result<(), VerifyError> {
    if let (Some(recorded), Some(current)) = (&artifact.build_fingerprint, &options.current_build) {
        let mismatch = recorded.binary_sha256 != current.binary_sha256
            || recorded.target_triple != current.target_triple
            || recorded.profile != current.profile;
        if mismatch {
            if options.strict_build_check {
                return Err(VerifyError::BuildMismatch {
                    expected: recorded.binary_sha256.clone(),
                    actual: current.binary_sha256.clone(),
                });
            }
            warn!(
                recorded = %recorded.binary_sha256,
                current = %current.binary_sha256,
                "verifying replay recorded by a different build"
            );
        }
    }

    if artifact.replay_format_version != REPLAY_FORMAT_VERSION {
        return Err(VerifyError::UnsupportedFormat(artifact.replay_format_version));
    }
    if artifact.state_digest_algo_id != STATE_DIGEST_ALGO_ID {
        return Err(VerifyError::UnsupportedDigestAlgorithm(
            artifact.state_digest_algo_id.clone(),
        ));
    }

    let sim_config: SimConfig = serde_json::from_str(&artifact.sim_config_json)?;
    if sim_config.tick_rate_hz != artifact.tick_rate_hz {
        return Err(VerifyError::TickRateMismatch {
            recorded: artifact.tick_rate_hz,
            configured: sim_config.tick_rate_hz,
        });
    }

    let initial = artifact
        .initial_state
        .as_ref()
        .ok_or(VerifyError::MissingInitialState)?;
    let initial = CharacterState::try_from(initial)?;

    let inputs = artifact
        .inputs
        .iter()
        .map(|p| InputState::try_from(*p))
        .collect::<Result<Vec<_>, _>>()?;
    validate_input_stream(&inputs, initial.tick, artifact.checkpoint_tick)?;

    let mut character = Character::new(artifact.entity_id, &sim_config, initial.position)?;
    character.restore(&initial);
    character.set_replaying(true);
    let mut escaped = 0;
    for input in &inputs {
        // Escaped-level ticks are part of the recorded history
        if character.simulate(world, input).is_err() {
            escaped += 1;
        }
    }

    if character.tick() != artifact.checkpoint_tick {
        return Err(VerifyError::CheckpointTickMismatch {
            expected: artifact.checkpoint_tick,
            actual: character.tick(),
        });
    }

    let actual = character.state_digest();
    if actual != artifact.final_digest {
        return Err(VerifyError::FinalDigestMismatch {
            expected: artifact.final_digest,
            actual,
            escaped,
        });
    }

    Ok(())
}

fn validate_input_stream(inputs: &[InputState], initial_tick: Tick, checkpoint_tick: Tick) -> Result<(), VerifyError> {
    let mut last = initial_tick;
    for input in inputs {
        if input.tick <= last {
            return Err(VerifyError::InputStreamInvalid {
                reason: format!("input for tick {} follows tick {last}", input.tick),
            });
        }
        last = input.tick;
    }
    if last != checkpoint_tick {
        return Err(VerifyError::InputStreamInvalid {
            reason: format!("stream ends at tick {last}, checkpoint is {checkpoint_tick}"),
        });
    }
    Ok(())
}

// ============================================================================
// Build Fingerprint Acquisition
// ============================================================================

/// Fingerprint the running executable.
///
/// Fails only if the executable cannot be read.
pub fn acquire_build_fingerprint() -> io::Result<BuildFingerprintData> {
    let exe_path = std::env::current_exe()?;

    let mut file = fs::File::open(&exe_path)?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];
    loop {
        let n = file.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }
    let binary_sha256 = format!("{:x}", hasher.finalize());

    let profile = if cfg!(debug_assertions) { "dev" } else { "release" };

    Ok(BuildFingerprintData {
        binary_sha256,
        target_triple: target_triple(),
        profile: profile.to_string(),
        git_commit: std::env::var("VANTAGE_GIT_COMMIT").unwrap_or_else(|_| "unknown".to_string()),
    })
}

fn target_triple() -> String {
    format!("{}-{}", std::env::consts::ARCH, std::env::consts::OS)
}

// ============================================================================
// Replay I/O
// ============================================================================

/// Write a replay artifact, refusing to overwrite an existing file.
pub fn write_replay(artifact: &ReplayArtifact, path: &Path) -> Result<(), ReplayError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    if path.exists() {
        return Err(ReplayError::AlreadyExists(path.display().to_string()));
    }

    let mut file = fs::File::create(path)?;
    file.write_all(&artifact.encode_to_vec())?;
    Ok(())
}

pub fn read_replay(path: &Path) -> Result<ReplayArtifact, ReplayError> {
    let data = fs::read(path)?;
    Ok(ReplayArtifact::decode(data.as_slice())?)
}

// ============================================================================
// Tests
// ============================================================================
