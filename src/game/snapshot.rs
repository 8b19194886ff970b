//! State snapshots and the full-map resync cadence

use crate::util::time::MAP_SYNC_TICKS;
use crate::ws::protocol::{PlayerSnapshot, StateSnapshot};

use super::session::GameSession;

/// Builds `State` payloads and decides when a full map resync is due
pub struct SnapshotBuilder {
    /// Ticks seen so far
    tick: u64,
    /// Map resync interval in ticks
    map_sync_interval: u64,
}

impl SnapshotBuilder {
    pub fn new(map_sync_interval: u64) -> Self {
        Self {
            tick: 0,
            map_sync_interval: map_sync_interval.max(1),
        }
    }

    /// Advance one tick; true when this tick should resync maps.
    /// The very first tick always does.
    pub fn advance(&mut self) -> bool {
        let due = self.tick % self.map_sync_interval == 0;
        self.tick += 1;
        due
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// Full session state as broadcast to every player
    pub fn build(session: &GameSession) -> StateSnapshot {
        let players = session
            .players()
            .iter()
            .map(|p| PlayerSnapshot {
                user_id: p.user_id,
                team: p.team,
                x: p.x,
                y: p.y,
                vx: p.vx,
                vy: p.vy,
                name: session.name_of(p.user_id),
            })
            .collect();

        StateSnapshot {
            host: session.host(),
            room: session.room(),
            started: session.started(),
            started_at: i32::try_from(session.started_at_unix()).unwrap_or(i32::MAX),
            team_a_color: session.state.team_a_color,
            team_b_color: session.state.team_b_color,
            score_a: session.state.score_a,
            score_b: session.state.score_b,
            phase: session.phase(),
            players,
        }
    }
}

impl Default for SnapshotBuilder {
    fn default() -> Self {
        Self::new(MAP_SYNC_TICKS)
    }
}
