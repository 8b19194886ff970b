//! A single room: roster, round state and every operation players can run on it

use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::{debug, info, warn};

use crate::app::users::{UserDirectory, UserId};
use crate::util::time::unix_secs;
use crate::ws::protocol::{
    MoveFlags, ProtocolError, ServerMsg, SystemKind, WeaponEvent, WeaponFrame,
};

use super::grid::{MAP_HEIGHT, MAP_WIDTH};
use super::mapgen::MapGenerator;
use super::player::Player;
use super::room::RoomCode;
use super::state::{GamePhase, GameState, TeamId};
use super::weapon::WeaponArgs;
use super::{CommandError, GameError, MAX_PLAYERS};

/// Default round length
pub const ROUND_DURATION: Duration = Duration::from_secs(60);

/// Which weapon input a frame carries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WeaponInput {
    Down,
    Update,
    Up,
}

pub struct GameSession {
    room: RoomCode,
    host: UserId,
    /// Join order; drives team parity and host succession
    players: Vec<Player>,
    pub state: GameState,
    started: bool,
    started_at: Option<Instant>,
    started_at_unix: i64,
    /// Full state must go out on the next tick
    dirty: bool,
    round_duration: Duration,
    closed: bool,
    users: Arc<UserDirectory>,
    map_generator: MapGenerator,
    rng: ChaCha8Rng,
}

impl GameSession {
    /// New waiting session with `host` as its first player on team A
    pub fn new(
        room: RoomCode,
        host: UserId,
        users: Arc<UserDirectory>,
        round_duration: Duration,
        seed: u64,
    ) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let state = GameState::generate(&mut rng);
        info!(room = %room, host = %host, seed, "Session created");

        Self {
            room,
            host,
            players: vec![Player::new(host, TeamId::A)],
            state,
            started: false,
            started_at: None,
            started_at_unix: 0,
            dirty: true,
            round_duration,
            closed: false,
            users,
            map_generator: MapGenerator::default(),
            rng,
        }
    }

    pub fn room(&self) -> RoomCode {
        self.room
    }

    pub fn host(&self) -> UserId {
        self.host
    }

    pub fn players(&self) -> &[Player] {
        &self.players
    }

    pub fn player(&self, user_id: UserId) -> Option<&Player> {
        self.players.iter().find(|p| p.user_id == user_id)
    }

    fn player_mut(&mut self, user_id: UserId) -> Result<&mut Player, GameError> {
        self.players
            .iter_mut()
            .find(|p| p.user_id == user_id)
            .ok_or(GameError::PlayerNotFound)
    }

    pub fn phase(&self) -> GamePhase {
        self.state.phase
    }

    pub fn started(&self) -> bool {
        self.started
    }

    /// Unix seconds of the latest round start, 0 before the first
    pub fn started_at_unix(&self) -> i64 {
        self.started_at_unix
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    /// Set once the last player leaves; a closed session accepts nothing
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn users(&self) -> &UserDirectory {
        &self.users
    }

    /// Display name of a user, empty if they already disconnected
    pub fn name_of(&self, user_id: UserId) -> String {
        self.users.display_name(user_id).unwrap_or_default()
    }

    fn team_count(&self, team: TeamId) -> usize {
        self.players.iter().filter(|p| p.team == team).count()
    }

    // ========================================================================
    // Roster
    // ========================================================================

    /// Add a player. Teams alternate by roster size so they stay balanced.
    pub fn join(&mut self, user_id: UserId) -> Result<TeamId, GameError> {
        if self.closed {
            return Err(GameError::RoomNotFound);
        }
        if self.player(user_id).is_some() {
            return Err(GameError::AlreadyInGame);
        }
        if self.players.len() >= MAX_PLAYERS {
            return Err(GameError::GameFull);
        }
        if self.state.phase != GamePhase::WaitingForPlayers {
            return Err(GameError::AlreadyStarted);
        }

        let team = if self.players.len() % 2 == 0 {
            TeamId::A
        } else {
            TeamId::B
        };
        self.players.push(Player::new(user_id, team));
        self.dirty = true;

        info!(
            room = %self.room,
            user_id = %user_id,
            team = ?team,
            player_count = self.players.len(),
            "Player joined session"
        );

        self.send_to(user_id, &ServerMsg::Joined { room: self.room });
        self.broadcast_info(format!("{} joined the game", self.name_of(user_id)));
        Ok(team)
    }

    /// Remove a player. Emptying the roster closes the session; dropping
    /// below two players invalidates the round.
    pub fn leave(&mut self, user_id: UserId) -> Result<(), GameError> {
        let index = self
            .players
            .iter()
            .position(|p| p.user_id == user_id)
            .ok_or(GameError::PlayerNotFound)?;
        self.players.remove(index);
        self.dirty = true;

        info!(
            room = %self.room,
            user_id = %user_id,
            player_count = self.players.len(),
            "Player left session"
        );

        if self.players.is_empty() {
            self.closed = true;
            return Ok(());
        }

        if self.players.len() < 2 {
            self.state.reset_round();
            self.started = false;
            for player in &mut self.players {
                player.stop();
            }
        }

        if self.host == user_id {
            self.host = self.players[0].user_id;
            debug!(room = %self.room, host = %self.host, "Host passed on");
        }

        self.broadcast_info(format!("{} left the game", self.name_of(user_id)));
        Ok(())
    }

    pub fn switch_team(&mut self, user_id: UserId) -> Result<TeamId, GameError> {
        if self.state.phase != GamePhase::WaitingForPlayers {
            return Err(GameError::AlreadyStarted);
        }
        let player = self.player_mut(user_id)?;
        player.team = player.team.other();
        let team = player.team;
        self.dirty = true;

        self.broadcast_info(format!("{} switched teams", self.name_of(user_id)));
        Ok(team)
    }

    // ========================================================================
    // Round lifecycle
    // ========================================================================

    /// Begin a round on a freshly generated map
    pub fn start(&mut self, user_id: UserId) -> Result<(), GameError> {
        if self.state.phase == GamePhase::Playing {
            return Err(GameError::AlreadyStarted);
        }
        if user_id != self.host {
            return Err(GameError::NotHost);
        }
        if self.players.len() < 2 {
            return Err(GameError::NotEnoughPlayers);
        }
        if self.team_count(TeamId::A) == 0 || self.team_count(TeamId::B) == 0 {
            return Err(GameError::UnbalancedTeams);
        }

        let map = self
            .map_generator
            .generate(MAP_WIDTH, MAP_HEIGHT, &mut self.rng);
        self.state = GameState::with_map(map);
        self.state.phase = GamePhase::Playing;
        self.started = true;
        self.started_at = Some(Instant::now());
        self.started_at_unix = unix_secs();

        for player in &mut self.players {
            player.spawn(&self.state.map, &mut self.rng);
        }
        self.dirty = true;

        info!(
            room = %self.room,
            player_count = self.players.len(),
            "Round started"
        );

        self.broadcast(&ServerMsg::Map(self.state.map.clone()));
        Ok(())
    }

    /// One simulation tick. Ends the round once its time is up.
    pub fn update(&mut self) {
        if self.state.phase != GamePhase::Playing {
            return;
        }

        for player in &mut self.players {
            player.update(&self.state.map);
        }

        let elapsed = self.started_at.map(|t| t.elapsed()).unwrap_or_default();
        if elapsed >= self.round_duration {
            self.finish();
        }
    }

    fn finish(&mut self) {
        self.state.phase = GamePhase::GameOver;
        self.started = false;
        for player in &mut self.players {
            player.stop();
        }
        self.dirty = true;

        info!(
            room = %self.room,
            score_a = self.state.score_a,
            score_b = self.state.score_b,
            "Round over"
        );
        self.broadcast_info("Game over".to_string());
    }

    /// Whether a full state broadcast is pending; clears the flag
    pub fn take_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    // ========================================================================
    // In-round actions, ignored outside a round
    // ========================================================================

    pub fn move_player(&mut self, user_id: UserId, flags: MoveFlags) -> Result<(), GameError> {
        if self.state.phase != GamePhase::Playing {
            return Ok(());
        }
        self.player_mut(user_id)?.apply_move(flags);
        Ok(())
    }

    /// Paint the cell under the player
    pub fn shoot(&mut self, user_id: UserId) -> Result<(), GameError> {
        if self.state.phase != GamePhase::Playing {
            return Ok(());
        }
        let player = self
            .player(user_id)
            .ok_or(GameError::PlayerNotFound)?;
        let (x, y) = player.cell();
        let team = player.team;

        let cell = self.state.paint(x, y, team)?;
        self.broadcast(&ServerMsg::Shot(cell));
        Ok(())
    }

    pub fn weapon_down(&mut self, user_id: UserId, frame: &WeaponFrame) -> Result<(), CommandError> {
        self.weapon_input(user_id, frame, WeaponInput::Down)
    }

    pub fn weapon_update(&mut self, user_id: UserId, frame: &WeaponFrame) -> Result<(), CommandError> {
        self.weapon_input(user_id, frame, WeaponInput::Update)
    }

    pub fn weapon_up(&mut self, user_id: UserId, frame: &WeaponFrame) -> Result<(), CommandError> {
        self.weapon_input(user_id, frame, WeaponInput::Up)
    }

    /// Validate a weapon frame against the player's weapon, run it and relay
    /// the result to the session
    fn weapon_input(
        &mut self,
        user_id: UserId,
        frame: &WeaponFrame,
        input: WeaponInput,
    ) -> Result<(), CommandError> {
        let playing = self.state.phase == GamePhase::Playing;
        let player = self
            .players
            .iter_mut()
            .find(|p| p.user_id == user_id)
            .ok_or(GameError::PlayerNotFound)?;

        let expected = player.weapon().id() as u8;
        if frame.weapon_id != expected {
            return Err(ProtocolError::WeaponMismatch {
                expected,
                actual: frame.weapon_id,
            }
            .into());
        }

        let weapon = player.weapon();
        let args = match input {
            WeaponInput::Down => weapon.parse_down_args(&frame.args)?,
            WeaponInput::Update => weapon.parse_update_args(&frame.args)?,
            WeaponInput::Up => weapon.parse_up_args(&frame.args)?,
        };
        if !playing {
            return Ok(());
        }

        let wielder = player.wielder();
        let event = |payload: Bytes| WeaponEvent {
            weapon_id: expected,
            user_id,
            payload,
        };

        match input {
            WeaponInput::Down => {
                player.weapon_mut().on_down(&wielder, &args)?;
                self.broadcast(&ServerMsg::WeaponPressed(event(args.encode())));
            }
            WeaponInput::Update => {
                player.weapon_mut().on_update(&wielder, &args)?;
                self.broadcast(&ServerMsg::WeaponUpdated(event(args.encode())));
            }
            WeaponInput::Up => {
                let weapon_name = player.weapon().name();
                let blast = player
                    .weapon_mut()
                    .on_up(&mut self.state, &wielder, &args)?;
                debug!(
                    room = %self.room,
                    user_id = %user_id,
                    weapon = weapon_name,
                    x = blast.x,
                    y = blast.y,
                    cells = blast.painted.len(),
                    "Weapon released"
                );
                let landed = WeaponArgs::Target {
                    x: blast.x,
                    y: blast.y,
                };
                self.broadcast(&ServerMsg::WeaponReleased(event(landed.encode())));
                for cell in blast.painted {
                    self.broadcast(&ServerMsg::Shot(cell));
                }
            }
        }
        Ok(())
    }

    /// Relay a chat line to everyone in the session, sender included
    pub fn chat(&self, user_id: UserId, message: String) -> Result<(), GameError> {
        if self.player(user_id).is_none() {
            return Err(GameError::PlayerNotFound);
        }
        self.broadcast(&ServerMsg::Chatted {
            from: user_id,
            message,
        });
        Ok(())
    }

    // ========================================================================
    // Outbound
    // ========================================================================

    /// Encode once and queue for every player
    pub fn broadcast(&self, msg: &ServerMsg) {
        let frame = match msg.encode() {
            Ok(frame) => frame,
            Err(e) => {
                warn!(room = %self.room, error = %e, kind = ?msg.kind(), "Failed to encode broadcast");
                return;
            }
        };
        for player in &self.players {
            self.users.send(player.user_id, frame.clone());
        }
    }

    pub fn send_to(&self, user_id: UserId, msg: &ServerMsg) {
        match msg.encode() {
            Ok(frame) => {
                self.users.send(user_id, frame);
            }
            Err(e) => {
                warn!(room = %self.room, user_id = %user_id, error = %e, "Failed to encode message");
            }
        }
    }

    pub fn broadcast_info(&self, message: String) {
        self.broadcast(&ServerMsg::System {
            kind: SystemKind::Info,
            message,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::grid::Tile;
    use tokio::sync::mpsc::UnboundedReceiver;
    use tokio_test::{assert_err, assert_ok};

    struct Client {
        id: UserId,
        rx: UnboundedReceiver<Bytes>,
    }

    impl Client {
        fn connect(users: &UserDirectory, name: &str) -> Self {
            let (id, rx) = users.register(name.to_string());
            Self { id, rx }
        }

        fn drain(&mut self) -> Vec<ServerMsg> {
            let mut out = Vec::new();
            while let Ok(frame) = self.rx.try_recv() {
                out.push(ServerMsg::decode(&frame).expect("server frame decodes"));
            }
            out
        }
    }

    fn session_with(players: usize) -> (GameSession, Vec<Client>) {
        let users = Arc::new(UserDirectory::new());
        let clients: Vec<Client> = (0..players)
            .map(|i| Client::connect(&users, &format!("Player {i}")))
            .collect();
        let mut session = GameSession::new(
            RoomCode::from_bytes(*b"TEST"),
            clients[0].id,
            users,
            ROUND_DURATION,
            7,
        );
        for client in &clients[1..] {
            assert_ok!(session.join(client.id));
        }
        (session, clients)
    }

    fn weapon_frame(args: &[u8]) -> WeaponFrame {
        WeaponFrame {
            weapon_id: 0,
            args: Bytes::copy_from_slice(args),
        }
    }

    fn target(x: f64, y: f64) -> Vec<u8> {
        WeaponArgs::Target { x, y }.encode().to_vec()
    }

    #[test]
    fn teams_alternate_by_join_order() {
        let (session, _clients) = session_with(3);
        let teams: Vec<TeamId> = session.players().iter().map(|p| p.team).collect();
        assert_eq!(teams, vec![TeamId::A, TeamId::B, TeamId::A]);
        assert_eq!(session.phase(), GamePhase::WaitingForPlayers);
    }

    #[test]
    fn join_acknowledges_then_announces() {
        let (session, mut clients) = session_with(2);
        let joiner = clients[1].drain();
        assert_eq!(
            joiner[0],
            ServerMsg::Joined {
                room: session.room()
            }
        );
        assert!(joiner.contains(&ServerMsg::System {
            kind: SystemKind::Info,
            message: "Player 1 joined the game".into()
        }));
    }

    #[test]
    fn full_session_rejects_join() {
        let (mut session, _clients) = session_with(MAX_PLAYERS);
        let late = Client::connect(session.users(), "late");
        assert_eq!(session.join(late.id), Err(GameError::GameFull));
        assert_eq!(session.len(), MAX_PLAYERS);
    }

    #[test]
    fn join_after_start_is_rejected() {
        let (mut session, clients) = session_with(2);
        assert_ok!(session.start(clients[0].id));
        let late = Client::connect(session.users(), "late");
        assert_eq!(session.join(late.id), Err(GameError::AlreadyStarted));
        assert_eq!(session.len(), 2);
    }

    #[test]
    fn start_requires_host_players_and_both_teams() {
        let (mut solo, clients) = session_with(1);
        assert_eq!(solo.start(clients[0].id), Err(GameError::NotEnoughPlayers));

        let (mut session, clients) = session_with(2);
        assert_eq!(session.start(clients[1].id), Err(GameError::NotHost));

        assert_ok!(session.switch_team(clients[1].id));
        assert_eq!(session.start(clients[0].id), Err(GameError::UnbalancedTeams));
        assert_eq!(session.phase(), GamePhase::WaitingForPlayers);
    }

    #[test]
    fn switch_team_only_while_waiting() {
        let (mut session, clients) = session_with(2);
        assert_eq!(session.switch_team(clients[1].id), Ok(TeamId::A));
        assert_eq!(session.switch_team(UserId(999)), Err(GameError::PlayerNotFound));

        assert_ok!(session.switch_team(clients[1].id));
        assert_ok!(session.start(clients[0].id));
        assert_eq!(session.switch_team(clients[1].id), Err(GameError::AlreadyStarted));
    }

    #[test]
    fn leaving_below_two_players_invalidates_round() {
        let (mut session, clients) = session_with(2);
        assert_ok!(session.start(clients[0].id));
        let (x, y) = session.players()[0].cell();
        assert_ok!(session.state.paint(x, y, TeamId::A));

        assert_ok!(session.leave(clients[1].id));
        assert_eq!(session.phase(), GamePhase::WaitingForPlayers);
        assert!(!session.started());
        assert_eq!(session.state.map.count(Tile::TeamA), 0);
        assert_eq!(session.state.map.count(Tile::TeamB), 0);
        assert_eq!(session.state.score_a, 0);
        assert!(!session.is_closed());
    }

    #[test]
    fn host_passes_to_next_in_join_order() {
        let (mut session, clients) = session_with(3);
        assert_ok!(session.leave(clients[0].id));
        assert_eq!(session.host(), clients[1].id);

        assert_ok!(session.leave(clients[1].id));
        assert_eq!(session.host(), clients[2].id);

        assert_ok!(session.leave(clients[2].id));
        assert!(session.is_empty());
        assert!(session.is_closed());
        assert_eq!(session.join(clients[0].id), Err(GameError::RoomNotFound));
    }

    #[test]
    fn leave_unknown_player_fails() {
        let (mut session, _clients) = session_with(2);
        assert_eq!(session.leave(UserId(999)), Err(GameError::PlayerNotFound));
        assert_eq!(session.len(), 2);
    }

    #[test]
    fn shoot_paints_under_player_only_in_round() {
        let (mut session, mut clients) = session_with(2);
        assert_ok!(session.shoot(clients[0].id));
        assert_eq!(session.state.score_a, 0);

        assert_ok!(session.start(clients[0].id));
        clients[1].drain();

        assert_ok!(session.shoot(clients[0].id));
        let (x, y) = session.players()[0].cell();
        assert_eq!(session.state.map.get(x, y), Tile::TeamA);
        assert_eq!(session.state.score_a, 1);
        assert!(clients[1].drain().contains(&ServerMsg::Shot(crate::game::state::CellPaint {
            x,
            y,
            tile: Tile::TeamA
        })));
    }

    #[test]
    fn shoot_on_wall_is_rejected() {
        let (mut session, clients) = session_with(2);
        assert_ok!(session.start(clients[0].id));
        let (x, y) = session.players()[0].cell();
        session.state.map.set(x, y, Tile::Wall);
        assert_eq!(session.shoot(clients[0].id), Err(GameError::PaintWall));
        assert_eq!(session.state.score_a, 0);
    }

    #[test]
    fn weapon_frames_are_checked_before_phase() {
        let (mut session, clients) = session_with(2);
        let host = clients[0].id;

        let wrong_id = WeaponFrame {
            weapon_id: 9,
            args: Bytes::copy_from_slice(&0.0f64.to_le_bytes()),
        };
        assert_eq!(
            session.weapon_down(host, &wrong_id),
            Err(CommandError::Protocol(ProtocolError::WeaponMismatch {
                expected: 0,
                actual: 9
            }))
        );
        assert!(matches!(
            session.weapon_up(host, &weapon_frame(&[0u8; 3])),
            Err(CommandError::Protocol(_))
        ));

        // well-formed but outside a round: ignored
        assert_ok!(session.weapon_down(host, &weapon_frame(&0.0f64.to_le_bytes())));
        assert!(!session.players()[0].weapon().is_charging());
    }

    #[test]
    fn weapon_round_trip_relays_and_paints() {
        let (mut session, mut clients) = session_with(2);
        let host = clients[0].id;
        assert_ok!(session.start(host));
        clients[1].drain();

        assert_ok!(session.weapon_down(host, &weapon_frame(&0.5f64.to_le_bytes())));
        assert_ok!(session.weapon_update(host, &weapon_frame(&0.75f64.to_le_bytes())));
        assert_eq!(
            session.weapon_down(host, &weapon_frame(&0.5f64.to_le_bytes())),
            Err(CommandError::Game(GameError::AlreadyCharging))
        );

        let (px, py) = (session.players()[0].x, session.players()[0].y);
        assert_ok!(session.weapon_up(host, &weapon_frame(&target(px + 0.5, py + 0.5))));
        assert!(session.players()[0].weapon().cooling_down());

        let seen = clients[1].drain();
        assert!(matches!(seen[0], ServerMsg::WeaponPressed(ref e) if e.user_id == host && e.payload.len() == 8));
        assert!(matches!(seen[1], ServerMsg::WeaponUpdated(_)));
        assert!(matches!(seen[2], ServerMsg::WeaponReleased(ref e) if e.payload.len() == 16));
        let shots = seen.iter().filter(|m| matches!(m, ServerMsg::Shot(_))).count();
        assert!(shots >= 1);
        assert_eq!(shots as i32, session.state.score_a);

        assert_eq!(
            session.weapon_down(host, &weapon_frame(&0.5f64.to_le_bytes())),
            Err(CommandError::Game(GameError::CoolingDown))
        );
    }

    #[test]
    fn chat_reaches_everyone_including_sender() {
        let (session, mut clients) = session_with(2);
        for client in clients.iter_mut() {
            client.drain();
        }
        assert_ok!(session.chat(clients[1].id, "hello".into()));
        let expected = ServerMsg::Chatted {
            from: clients[1].id,
            message: "hello".into(),
        };
        for client in clients.iter_mut() {
            assert_eq!(client.drain(), vec![expected.clone()]);
        }
        assert_err!(session.chat(UserId(999), "x".into()));
    }

    #[test]
    fn dirty_flag_is_taken_once() {
        let (mut session, clients) = session_with(2);
        assert!(session.take_dirty());
        assert!(!session.take_dirty());
        assert_ok!(session.switch_team(clients[1].id));
        assert!(session.take_dirty());
    }

    #[test]
    fn host_starts_round_and_it_ends_on_time() {
        let users = Arc::new(UserDirectory::new());
        let mut host = Client::connect(&users, "host");
        let mut guest = Client::connect(&users, "guest");

        let room = RoomCode::random(&mut rand::thread_rng());
        assert_eq!(room.as_bytes().len(), 4);
        assert!(room.as_bytes().iter().all(u8::is_ascii_uppercase));

        let mut session = GameSession::new(room, host.id, users.clone(), ROUND_DURATION, 42);
        assert_eq!(session.join(guest.id), Ok(TeamId::B));
        host.drain();
        guest.drain();

        assert_ok!(session.start(host.id));
        assert_eq!(session.phase(), GamePhase::Playing);
        assert!(session.started());
        assert!(session.started_at_unix() > 0);
        for client in [&mut host, &mut guest] {
            assert!(client
                .drain()
                .iter()
                .any(|m| matches!(m, ServerMsg::Map(map) if map.width() == MAP_WIDTH)));
        }
        for player in session.players() {
            assert!(!session
                .state
                .map
                .get(player.x as i32, player.y as i32)
                .is_wall());
        }

        assert_ok!(session.move_player(
            guest.id,
            MoveFlags {
                left: true,
                start: true,
                ..MoveFlags::default()
            }
        ));
        session.update();
        assert_eq!(session.phase(), GamePhase::Playing);

        session.round_duration = Duration::ZERO;
        session.update();
        assert_eq!(session.phase(), GamePhase::GameOver);
        assert!(!session.started());
        for player in session.players() {
            assert_eq!((player.vx, player.vy), (0, 0));
        }
        assert!(guest.drain().contains(&ServerMsg::System {
            kind: SystemKind::Info,
            message: "Game over".into()
        }));

        // a finished round can be restarted by the host
        assert_ok!(session.start(host.id));
        assert_eq!(session.phase(), GamePhase::Playing);
    }
}
