//! Per-client state on the authority.

use vantage_replay::ReplayRecorder;
use vantage_sim::{Character, EntityId, Tick};
use vantage_wire::SessionId;

/// One connected client and the character it drives.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: SessionId,
    pub character: Character,
    /// Tick of the newest input simulated for this session. Inputs at or
    /// below it are already acknowledged.
    pub last_processed_tick: Tick,
    pub recorder: Option<ReplayRecorder>,
}

impl Session {
    pub fn new(id: SessionId, character: Character) -> Self {
        Self {
            id,
            last_processed_tick: character.tick(),
            character,
            recorder: None,
        }
    }

    pub fn entity_id(&self) -> EntityId {
        self.character.entity_id()
    }
}
