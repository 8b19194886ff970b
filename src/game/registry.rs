//! Keyed lookup of live sessions by room code and by member

use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::app::users::{UserDirectory, UserId};

use super::room::RoomCode;
use super::session::GameSession;
use super::GameError;

/// Shared handle to one session. Every operation on a session, including
/// its tick, runs under this lock.
pub type SessionHandle = Arc<Mutex<GameSession>>;

/// Registry of all live sessions
pub struct SessionRegistry {
    sessions: DashMap<RoomCode, SessionHandle>,
    /// Which room each user currently plays in
    memberships: DashMap<UserId, RoomCode>,
    users: Arc<UserDirectory>,
    round_duration: Duration,
}

impl SessionRegistry {
    pub fn new(users: Arc<UserDirectory>, round_duration: Duration) -> Self {
        Self {
            sessions: DashMap::new(),
            memberships: DashMap::new(),
            users,
            round_duration,
        }
    }

    /// Create a session hosted by `host` under a fresh random room code
    pub fn create_session(&self, host: UserId) -> Result<RoomCode, GameError> {
        self.create_session_with(host, || RoomCode::random(&mut rand::thread_rng()))
    }

    /// Create a session, drawing codes from `next_code` until one is free
    pub fn create_session_with(
        &self,
        host: UserId,
        mut next_code: impl FnMut() -> RoomCode,
    ) -> Result<RoomCode, GameError> {
        if self.memberships.contains_key(&host) {
            return Err(GameError::AlreadyInGame);
        }

        let room = loop {
            let code = next_code();
            match self.sessions.entry(code) {
                Entry::Vacant(slot) => {
                    let session = GameSession::new(
                        code,
                        host,
                        self.users.clone(),
                        self.round_duration,
                        rand::random::<u64>(),
                    );
                    slot.insert(Arc::new(Mutex::new(session)));
                    break code;
                }
                Entry::Occupied(_) => {
                    debug!(room = %code, "Room code taken, drawing another");
                }
            }
        };

        self.memberships.insert(host, room);
        info!(room = %room, host = %host, sessions = self.sessions.len(), "Session registered");
        Ok(room)
    }

    pub fn find_by_room(&self, room: RoomCode) -> Option<SessionHandle> {
        self.sessions.get(&room).map(|entry| entry.value().clone())
    }

    pub fn find_by_user(&self, user_id: UserId) -> Option<SessionHandle> {
        let room = *self.memberships.get(&user_id)?;
        self.find_by_room(room)
    }

    pub fn room_of(&self, user_id: UserId) -> Option<RoomCode> {
        self.memberships.get(&user_id).map(|entry| *entry)
    }

    /// Add a user to an existing session
    pub fn join(&self, user_id: UserId, room: RoomCode) -> Result<(), GameError> {
        if self.memberships.contains_key(&user_id) {
            return Err(GameError::AlreadyInGame);
        }
        let handle = self.find_by_room(room).ok_or(GameError::RoomNotFound)?;
        handle.lock().join(user_id)?;
        self.memberships.insert(user_id, room);
        Ok(())
    }

    /// Remove a user from their session, tearing the session down once empty
    pub fn leave(&self, user_id: UserId) -> Result<RoomCode, GameError> {
        let (_, room) = self
            .memberships
            .remove(&user_id)
            .ok_or(GameError::NotInGame)?;
        let Some(handle) = self.find_by_room(room) else {
            return Ok(room);
        };

        let empty = {
            let mut session = handle.lock();
            session.leave(user_id)?;
            session.is_empty()
        };

        if empty {
            self.sessions
                .remove_if(&room, |_, current| Arc::ptr_eq(current, &handle));
            info!(room = %room, sessions = self.sessions.len(), "Session closed");
        }
        Ok(room)
    }

    /// Snapshot of every live session handle
    pub fn sessions(&self) -> Vec<SessionHandle> {
        self.sessions
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn player_count(&self) -> usize {
        self.memberships.len()
    }
}
