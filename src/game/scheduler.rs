//! Fixed-rate tick loop driving every session

use std::sync::Arc;

use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

use crate::util::time::{tick_duration, SIMULATION_TPS};
use crate::ws::protocol::ServerMsg;

use super::registry::SessionRegistry;
use super::snapshot::SnapshotBuilder;
use super::state::GamePhase;

/// Runs `update` on every session once per tick and pushes state out
pub struct TickScheduler {
    registry: Arc<SessionRegistry>,
    snapshots: SnapshotBuilder,
}

impl TickScheduler {
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        Self {
            registry,
            snapshots: SnapshotBuilder::default(),
        }
    }

    /// Run forever at the simulation rate
    pub async fn run(mut self) {
        info!(tps = SIMULATION_TPS, "Tick scheduler started");

        let mut ticker = interval(tick_duration());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            self.tick_once();
        }
    }

    /// One pass over every live session
    pub fn tick_once(&mut self) {
        let sync_maps = self.snapshots.advance();

        for handle in self.registry.sessions() {
            let mut session = handle.lock();
            if session.is_closed() {
                continue;
            }

            session.update();

            let playing = session.phase() == GamePhase::Playing;
            let dirty = session.take_dirty();
            if playing || dirty {
                let snapshot = SnapshotBuilder::build(&session);
                session.broadcast(&ServerMsg::State(snapshot));
            }
            if sync_maps && playing {
                debug!(room = %session.room(), tick = self.snapshots.tick(), "Map resync");
                session.broadcast(&ServerMsg::Map(session.state.map.clone()));
            }
        }
    }
}
