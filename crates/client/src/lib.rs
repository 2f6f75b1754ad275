//! Vantage Client
//!
//! The two client-side roles of the netcode:
//!
//! - [`OwningClient`] predicts its own character every tick, queues the
//!   inputs the authority has not acknowledged yet, and reconciles against
//!   authoritative snapshots by replaying that queue.
//! - [`RemoteObserver`] renders someone else's character by interpolating
//!   between buffered snapshots, a fixed delay behind the newest one.
//!
//! Neither role owns a transport. Both produce and consume
//! [`vantage_wire`] messages, and are driven by the host between ticks.

#![deny(unsafe_code)]

pub mod interpolation;
pub mod observer;
pub mod pending;
pub mod prediction;

use thiserror::Error;
use vantage_sim::{EntityId, SimError};
use vantage_wire::WireError;

pub use interpolation::{InterpolationConfig, SnapshotInterpolator, TransformSnapshot};
pub use observer::RemoteObserver;
pub use pending::PendingInputs;
pub use prediction::{ClientConfig, OwningClient, ReconcileOutcome};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Wire(#[from] WireError),

    #[error(transparent)]
    Sim(#[from] SimError),

    #[error("snapshot for entity {found} routed to the client of entity {expected}")]
    WrongEntity { expected: EntityId, found: EntityId },

    #[error("authority runs at {authority} Hz, client configured for {local} Hz")]
    TickRateMismatch { authority: u32, local: u32 },
}
