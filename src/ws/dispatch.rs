//! Routes decoded client messages to the registry and sessions

use std::sync::Arc;

use tracing::debug;

use crate::app::users::{UserDirectory, UserId};
use crate::game::room::RoomCode;
use crate::game::{CommandError, GameError, GameSession, SessionRegistry};

use super::protocol::{ClientMsg, ServerMsg};

/// Executes client commands on behalf of a connection
#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<SessionRegistry>,
    users: Arc<UserDirectory>,
}

impl Dispatcher {
    pub fn new(registry: Arc<SessionRegistry>, users: Arc<UserDirectory>) -> Self {
        Self { registry, users }
    }

    /// Apply one message from `user_id`
    pub fn dispatch(&self, user_id: UserId, msg: ClientMsg) -> Result<(), CommandError> {
        debug!(user_id = %user_id, kind = ?msg.kind(), "Dispatching");

        match msg {
            ClientMsg::Host => {
                let room = self.registry.create_session(user_id)?;
                self.reply(user_id, &ServerMsg::Hosted { room });
            }
            ClientMsg::Join { room } => {
                let room = RoomCode::from_client(*room.as_bytes());
                self.registry.join(user_id, room)?;
            }
            ClientMsg::Leave => {
                self.registry.leave(user_id)?;
                self.reply(user_id, &ServerMsg::Left);
            }
            ClientMsg::Start => self.with_session(user_id, |s| Ok(s.start(user_id)?))?,
            ClientMsg::SwitchTeam => {
                self.with_session(user_id, |s| Ok(s.switch_team(user_id).map(|_| ())?))?
            }
            ClientMsg::Move(flags) => {
                self.with_session(user_id, |s| Ok(s.move_player(user_id, flags)?))?
            }
            ClientMsg::Shoot => self.with_session(user_id, |s| Ok(s.shoot(user_id)?))?,
            ClientMsg::Chat { message } => {
                self.with_session(user_id, |s| Ok(s.chat(user_id, message)?))?
            }
            ClientMsg::WeaponDown(frame) => {
                self.with_session(user_id, |s| s.weapon_down(user_id, &frame))?
            }
            ClientMsg::WeaponUpdate(frame) => {
                self.with_session(user_id, |s| s.weapon_update(user_id, &frame))?
            }
            ClientMsg::WeaponUp(frame) => {
                self.with_session(user_id, |s| s.weapon_up(user_id, &frame))?
            }
        }
        Ok(())
    }

    /// Remove a disconnected user from any session, without replying
    pub fn disconnect(&self, user_id: UserId) {
        match self.registry.leave(user_id) {
            Ok(room) => debug!(user_id = %user_id, room = %room, "Removed on disconnect"),
            Err(GameError::NotInGame) => {}
            Err(e) => debug!(user_id = %user_id, error = %e, "Disconnect cleanup"),
        }
    }

    /// Report a rejected command to the user who sent it
    pub fn reject(&self, user_id: UserId, error: &GameError) {
        self.reply(
            user_id,
            &ServerMsg::Error {
                message: error.to_string(),
            },
        );
    }

    fn with_session<T>(
        &self,
        user_id: UserId,
        op: impl FnOnce(&mut GameSession) -> Result<T, CommandError>,
    ) -> Result<T, CommandError> {
        let handle = self
            .registry
            .find_by_user(user_id)
            .ok_or(GameError::NotInGame)?;
        let mut session = handle.lock();
        op(&mut session)
    }

    fn reply(&self, user_id: UserId, msg: &ServerMsg) {
        match msg.encode() {
            Ok(frame) => {
                self.users.send(user_id, frame);
            }
            Err(e) => debug!(user_id = %user_id, error = %e, "Failed to encode reply"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::session::ROUND_DURATION;
    use crate::game::GamePhase;
    use crate::ws::protocol::{MoveFlags, ProtocolError, WeaponFrame};
    use bytes::Bytes;
    use tokio::sync::mpsc::UnboundedReceiver;
    use tokio_test::assert_ok;

    struct Fixture {
        users: Arc<UserDirectory>,
        registry: Arc<SessionRegistry>,
        dispatcher: Dispatcher,
    }

    impl Fixture {
        fn new() -> Self {
            let users = Arc::new(UserDirectory::new());
            let registry = Arc::new(SessionRegistry::new(users.clone(), ROUND_DURATION));
            let dispatcher = Dispatcher::new(registry.clone(), users.clone());
            Self {
                users,
                registry,
                dispatcher,
            }
        }

        fn connect(&self, name: &str) -> (UserId, UnboundedReceiver<Bytes>) {
            self.users.register(name.to_string())
        }
    }

    fn received(rx: &mut UnboundedReceiver<Bytes>) -> Vec<ServerMsg> {
        let mut out = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            out.push(ServerMsg::decode(&frame).expect("frame decodes"));
        }
        out
    }

    #[test]
    fn host_then_join_with_lowercase_code() {
        let fx = Fixture::new();
        let (host, mut host_rx) = fx.connect("host");
        let (guest, mut guest_rx) = fx.connect("guest");

        assert_ok!(fx.dispatcher.dispatch(host, ClientMsg::Host));
        let room = match received(&mut host_rx).first() {
            Some(ServerMsg::Hosted { room }) => *room,
            other => panic!("expected Hosted, got {other:?}"),
        };

        let lower = RoomCode::from_bytes(room.as_bytes().map(|b| b.to_ascii_lowercase()));
        assert_ok!(fx.dispatcher.dispatch(guest, ClientMsg::Join { room: lower }));
        assert_eq!(received(&mut guest_rx)[0], ServerMsg::Joined { room });
        assert_eq!(fx.registry.room_of(guest), Some(room));
    }

    #[test]
    fn commands_outside_a_session_are_rejected() {
        let fx = Fixture::new();
        let (user, _rx) = fx.connect("loner");
        assert_eq!(
            fx.dispatcher.dispatch(user, ClientMsg::Start),
            Err(CommandError::Game(GameError::NotInGame))
        );
        assert_eq!(
            fx.dispatcher.dispatch(user, ClientMsg::Leave),
            Err(CommandError::Game(GameError::NotInGame))
        );
    }

    #[test]
    fn leave_replies_and_disconnect_is_silent() {
        let fx = Fixture::new();
        let (host, mut host_rx) = fx.connect("host");
        let (guest, mut guest_rx) = fx.connect("guest");
        assert_ok!(fx.dispatcher.dispatch(host, ClientMsg::Host));
        let room = fx.registry.room_of(host).expect("room");
        assert_ok!(fx.dispatcher.dispatch(guest, ClientMsg::Join { room }));
        received(&mut host_rx);
        received(&mut guest_rx);

        assert_ok!(fx.dispatcher.dispatch(guest, ClientMsg::Leave));
        assert_eq!(received(&mut guest_rx), vec![ServerMsg::Left]);
        assert!(received(&mut host_rx)
            .iter()
            .any(|m| matches!(m, ServerMsg::System { message, .. } if message == "guest left the game")));

        fx.dispatcher.disconnect(host);
        assert!(received(&mut host_rx).is_empty());
        assert!(fx.registry.is_empty());
    }

    #[test]
    fn rejection_becomes_error_message() {
        let fx = Fixture::new();
        let (user, mut rx) = fx.connect("user");
        fx.dispatcher.reject(user, &GameError::GameFull);
        assert_eq!(
            received(&mut rx),
            vec![ServerMsg::Error {
                message: "game is full".into()
            }]
        );
    }

    #[test]
    fn weapon_mismatch_is_a_protocol_error() {
        let fx = Fixture::new();
        let (host, _rx) = fx.connect("host");
        assert_ok!(fx.dispatcher.dispatch(host, ClientMsg::Host));
        let frame = WeaponFrame {
            weapon_id: 3,
            args: Bytes::from_static(&[0; 8]),
        };
        assert!(matches!(
            fx.dispatcher.dispatch(host, ClientMsg::WeaponDown(frame)),
            Err(CommandError::Protocol(ProtocolError::WeaponMismatch { .. }))
        ));
    }

    #[test]
    fn full_round_through_dispatch() {
        let fx = Fixture::new();
        let (host, _host_rx) = fx.connect("host");
        let (guest, _guest_rx) = fx.connect("guest");
        assert_ok!(fx.dispatcher.dispatch(host, ClientMsg::Host));
        let room = fx.registry.room_of(host).expect("room");
        assert_ok!(fx.dispatcher.dispatch(guest, ClientMsg::Join { room }));

        assert_eq!(
            fx.dispatcher.dispatch(guest, ClientMsg::Start),
            Err(CommandError::Game(GameError::NotHost))
        );
        assert_ok!(fx.dispatcher.dispatch(host, ClientMsg::Start));
        assert_ok!(fx.dispatcher.dispatch(
            guest,
            ClientMsg::Move(MoveFlags {
                right: true,
                start: true,
                ..MoveFlags::default()
            })
        ));
        assert_ok!(fx.dispatcher.dispatch(host, ClientMsg::Shoot));

        let handle = fx.registry.find_by_room(room).expect("session");
        let session = handle.lock();
        assert_eq!(session.phase(), GamePhase::Playing);
        assert_eq!(session.player(guest).map(|p| p.vx), Some(1));
        assert_eq!(session.state.score_a, 1);
    }
}
