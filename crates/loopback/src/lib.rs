//! Vantage Loopback
//!
//! Runs an authority and two connected peers in one process. The owner
//! drives its character with scripted input through client-side prediction;
//! the bystander never moves and only watches. Every message crosses a
//! [`link::DelayedLink`] as encoded envelope bytes, so the full wire path
//! is exercised.

#![deny(unsafe_code)]

pub mod arena;
pub mod config;
pub mod link;

use glam::Vec3;
use thiserror::Error;
use tracing::{debug, info, warn};
use vantage_client::{ClientError, OwningClient, ReconcileOutcome, RemoteObserver};
use vantage_geom::{CollisionWorld, MeshError};
use vantage_replay::{BuildFingerprintData, ReplayError, VerifyError, VerifyOptions, verify_replay, write_replay};
use vantage_server::{Authority, EndReason, ServerError, encode_broadcast};
use vantage_sim::{InputState, Tick};
use vantage_wire::{
    AuthoritativeSnapshot, ClientHello, ReplayArtifact, ServerWelcome, SessionId, WireError, decode_envelope,
    encode_envelope, envelope::Payload,
};

use crate::config::LoopbackConfig;
use crate::link::DelayedLink;

#[derive(Debug, Error)]
pub enum LoopbackError {
    #[error("could not build arena: {0}")]
    Arena(#[from] MeshError),

    #[error(transparent)]
    Server(#[from] ServerError),

    #[error(transparent)]
    Client(#[from] ClientError),

    #[error(transparent)]
    Wire(#[from] WireError),

    #[error("expected {expected}, got another message")]
    UnexpectedMessage { expected: &'static str },

    #[error(transparent)]
    Replay(#[from] ReplayError),

    #[error("replay did not verify: {0}")]
    Verify(#[from] VerifyError),
}

/// Counters and final positions of a run.
#[derive(Debug, Clone, Default)]
pub struct LoopbackReport {
    pub ticks: Tick,
    pub batches_sent: usize,
    pub snapshots_received: usize,
    pub reconciliations: usize,
    pub stale_snapshots: usize,
    pub smoothed_corrections: usize,
    pub max_prediction_error: f32,
    pub divergence_warnings: usize,
    pub missing_ticks: u64,
    pub authority_tick: Tick,
    pub acknowledged_tick: Tick,
    pub client_position: Vec3,
    pub authority_position: Vec3,
    /// Where the bystander sees the owner.
    pub observed_owner: Vec3,
    /// Where the owner sees the bystander.
    pub observed_bystander: Vec3,
    pub replay: Option<ReplayArtifact>,
}

struct Peer {
    session: SessionId,
    downlink: DelayedLink,
}

pub struct Loopback {
    config: LoopbackConfig,
    authority: Authority<CollisionWorld>,
    client_world: CollisionWorld,
    owner: Peer,
    bystander: Peer,
    client: OwningClient,
    owner_view: RemoteObserver,
    bystander_view: RemoteObserver,
    uplink: DelayedLink,
    tick: Tick,
    dt: f32,
    report: LoopbackReport,
}

impl Loopback {
    pub fn new(config: LoopbackConfig) -> Result<Self, LoopbackError> {
        Self::with_fingerprint(config, None)
    }

    /// Like [`Loopback::new`], stamping recorded replays with `fingerprint`.
    pub fn with_fingerprint(
        config: LoopbackConfig,
        fingerprint: Option<BuildFingerprintData>,
    ) -> Result<Self, LoopbackError> {
        let world = arena::arena()?;
        Self::with_worlds(config, world.clone(), world, fingerprint)
    }

    /// Run the authority and the owning client in separate levels. When
    /// they differ, the client mispredicts and must be corrected.
    pub fn with_worlds(
        config: LoopbackConfig,
        authority_world: CollisionWorld,
        client_world: CollisionWorld,
        fingerprint: Option<BuildFingerprintData>,
    ) -> Result<Self, LoopbackError> {
        let mut authority = Authority::new(authority_world, config.server.clone());
        if let Some(fingerprint) = fingerprint {
            authority.set_build_fingerprint(fingerprint);
        }

        let (owner_session, owner_welcome) = handshake(&mut authority, arena::OWNER_SPAWN)?;
        let (bystander_session, bystander_welcome) = handshake(&mut authority, arena::BYSTANDER_SPAWN)?;
        let client = OwningClient::from_welcome(&owner_welcome, &config.server.sim, config.client.clone())?;

        info!(
            owner = owner_welcome.controlled_entity_id,
            bystander = bystander_welcome.controlled_entity_id,
            latency_ticks = config.latency_ticks,
            "loopback connected"
        );

        Ok(Self {
            client_world,
            owner: Peer {
                session: owner_session,
                downlink: DelayedLink::new(config.latency_ticks),
            },
            bystander: Peer {
                session: bystander_session,
                downlink: DelayedLink::new(config.latency_ticks),
            },
            client,
            owner_view: RemoteObserver::new(bystander_welcome.controlled_entity_id, config.interpolation),
            bystander_view: RemoteObserver::new(owner_welcome.controlled_entity_id, config.interpolation),
            uplink: DelayedLink::new(config.latency_ticks),
            tick: 0,
            dt: config.server.sim.dt(),
            report: LoopbackReport::default(),
            authority,
            config,
        })
    }

    pub fn tick(&self) -> Tick {
        self.tick
    }

    pub fn authority(&self) -> &Authority<CollisionWorld> {
        &self.authority
    }

    pub fn owner_session(&self) -> SessionId {
        self.owner.session
    }

    pub fn client(&self) -> &OwningClient {
        &self.client
    }

    /// The bystander's view of the owner.
    pub fn observer(&self) -> &RemoteObserver {
        &self.bystander_view
    }

    /// Scripted ticks followed by idle settle ticks, then [`Loopback::finish`].
    pub fn run(mut self) -> Result<LoopbackReport, LoopbackError> {
        for step in 0..self.config.ticks {
            self.step(arena::scripted_input(step))?;
        }
        for _ in 0..self.config.settle_ticks {
            self.step(InputState::new(0))?;
        }
        self.finish()
    }

    /// One host tick: deliver due messages to both peers, predict the
    /// owner's `input`, let the authority consume what reached it, then
    /// broadcast when due and advance both observers.
    pub fn step(&mut self, input: InputState) -> Result<(), LoopbackError> {
        self.tick += 1;
        let now = self.now();

        for bytes in self.owner.downlink.deliver(self.tick) {
            match decode_envelope(&bytes)? {
                Payload::Snapshot(snapshot) => self.reconcile(&snapshot)?,
                Payload::Broadcast(broadcast) => {
                    for snapshot in &broadcast.snapshots {
                        if snapshot.entity_id == self.client.entity_id() {
                            self.reconcile(snapshot)?;
                        } else if snapshot.entity_id == self.owner_view.entity_id() {
                            self.report.snapshots_received += 1;
                            self.owner_view.on_snapshot(snapshot, now)?;
                        }
                    }
                }
                other => warn!(payload = ?other, "unexpected message for owner"),
            }
        }
        let watched = self.bystander_view.entity_id();
        for bytes in self.bystander.downlink.deliver(self.tick) {
            match decode_envelope(&bytes)? {
                Payload::Broadcast(broadcast) => {
                    for snapshot in broadcast.snapshots.iter().filter(|s| s.entity_id == watched) {
                        self.report.snapshots_received += 1;
                        self.bystander_view.on_snapshot(snapshot, now)?;
                    }
                }
                other => warn!(payload = ?other, "unexpected message for bystander"),
            }
        }

        if let Some(batch) = self.client.tick(&self.client_world, input) {
            debug!(tick = self.tick, inputs = batch.inputs.len(), "sending input batch");
            self.uplink
                .send(self.tick, encode_envelope(Payload::InputBatch(batch)));
            self.report.batches_sent += 1;
        }

        for bytes in self.uplink.deliver(self.tick) {
            let Some(outcome) = self.authority.receive_bytes(self.owner.session, &bytes)? else {
                continue;
            };
            self.report.missing_ticks += outcome.missing_ticks;
            if outcome.divergence.is_some() {
                self.report.divergence_warnings += 1;
            }
            if let Some(snapshot) = outcome.snapshot {
                self.owner
                    .downlink
                    .send(self.tick, encode_envelope(Payload::Snapshot(snapshot)));
            }
        }

        if let Some(broadcast) = self.authority.advance_broadcast(self.dt) {
            let bytes = encode_broadcast(broadcast);
            self.owner.downlink.send(self.tick, bytes.clone());
            self.bystander.downlink.send(self.tick, bytes);
        }

        self.owner_view.update(now);
        self.bystander_view.update(now);
        Ok(())
    }

    /// Close the run: finalize and verify the owner's replay when
    /// recording, write it out when configured, and report.
    pub fn finish(mut self) -> Result<LoopbackReport, LoopbackError> {
        self.report.authority_position = self.authority.character(self.owner.session)?.position();
        self.report.authority_tick = self.authority.last_processed_tick(self.owner.session)?;
        self.report.ticks = self.tick;
        self.report.acknowledged_tick = self.client.acknowledged_tick();
        self.report.client_position = self.client.position();
        self.report.observed_owner = self.bystander_view.position();
        self.report.observed_bystander = self.owner_view.position();

        if self.config.server.record_replays {
            let artifact = self
                .authority
                .finalize_replay(self.owner.session, EndReason::Complete)?;
            verify_replay(
                &artifact,
                self.authority.world(),
                &VerifyOptions {
                    strict_build_check: false,
                    current_build: None,
                },
            )?;
            info!(
                checkpoint_tick = artifact.checkpoint_tick,
                inputs = artifact.inputs.len(),
                "replay verified"
            );
            if let Some(path) = &self.config.replay_path {
                write_replay(&artifact, path)?;
                info!(path = %path.display(), "replay written");
            }
            self.report.replay = Some(artifact);
        }

        info!(
            ticks = self.report.ticks,
            reconciliations = self.report.reconciliations,
            max_error = self.report.max_prediction_error,
            divergences = self.report.divergence_warnings,
            "loopback finished"
        );
        Ok(self.report)
    }

    fn now(&self) -> f64 {
        self.tick as f64 * self.dt as f64
    }

    fn reconcile(&mut self, snapshot: &AuthoritativeSnapshot) -> Result<(), LoopbackError> {
        self.report.snapshots_received += 1;
        match self.client.on_snapshot(&self.client_world, snapshot)? {
            ReconcileOutcome::Stale { .. } => self.report.stale_snapshots += 1,
            ReconcileOutcome::Reconciled { error, smoothing, .. } => {
                self.report.reconciliations += 1;
                self.report.max_prediction_error = self.report.max_prediction_error.max(error);
                if smoothing {
                    self.report.smoothed_corrections += 1;
                }
            }
        }
        Ok(())
    }
}

/// Connect one peer: hello in, welcome out, both through the codec.
fn handshake(
    authority: &mut Authority<CollisionWorld>,
    spawn: Vec3,
) -> Result<(SessionId, ServerWelcome), LoopbackError> {
    let hello = encode_envelope(Payload::Hello(ClientHello {
        spawn: Some(spawn.into()),
    }));
    let Payload::Hello(hello) = decode_envelope(&hello)? else {
        return Err(LoopbackError::UnexpectedMessage { expected: "hello" });
    };

    let (session, _) = authority.accept_session(hello.spawn.map_or(Vec3::ZERO, Into::into))?;
    let welcome = encode_envelope(Payload::Welcome(authority.welcome(session)?));
    match decode_envelope(&welcome)? {
        Payload::Welcome(welcome) => Ok((session, welcome)),
        _ => Err(LoopbackError::UnexpectedMessage { expected: "welcome" }),
    }
}
