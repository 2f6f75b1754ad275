//! Classification of incoming input batch entries.
//!
//! Rules:
//! - Tick at or below the session's acknowledged tick: SKIP (already applied)
//! - Tick at or below an entry accepted earlier in the same batch: DROP + LOG
//! - Axes, look or buttons outside their wire range: DROP + LOG
//! - Batch longer than the configured cap: keep only the newest entries
//! - Non-finite claimed position: ignored for the divergence check

use glam::Vec3;
use vantage_sim::{InputState, Tick};
use vantage_wire::{ClientInputBatch, InputStateProto, WireError};

/// Why a batch entry was not simulated.
#[derive(Debug)]
pub enum Rejection {
    /// Already processed in an earlier batch.
    Stale { tick: Tick },
    /// Arrived after a newer tick within this batch.
    OutOfOrder { tick: Tick, after: Tick },
    Malformed(WireError),
}

/// Classify one batch entry.
///
/// `acked` is the session's last processed tick when the batch arrived;
/// `last_processed` includes entries of this batch accepted so far.
pub fn classify(entry: &InputStateProto, acked: Tick, last_processed: Tick) -> Result<InputState, Rejection> {
    if entry.tick <= acked {
        return Err(Rejection::Stale { tick: entry.tick });
    }
    if entry.tick <= last_processed {
        return Err(Rejection::OutOfOrder {
            tick: entry.tick,
            after: last_processed,
        });
    }
    InputState::try_from(*entry).map_err(Rejection::Malformed)
}

/// The newest `max` entries of a batch, in their original order.
pub fn capped(inputs: &[InputStateProto], max: usize) -> &[InputStateProto] {
    &inputs[inputs.len().saturating_sub(max)..]
}

/// Claimed position, if present and finite.
pub fn claimed_position(batch: &ClientInputBatch) -> Option<Vec3> {
    batch.claimed_position().filter(|p| p.is_finite())
}
