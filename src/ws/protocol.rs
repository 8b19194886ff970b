//! Binary wire protocol for client-server communication.
//!
//! Every frame starts with a one-byte message type tag. Multi-byte integers
//! and floats are little-endian, strings carry a one-byte length prefix and
//! room codes are always four raw bytes. There is no other framing: each
//! decoder checks the exact payload length before extracting fields.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::app::users::UserId;
use crate::game::grid::{Map, Tile};
use crate::game::room::{RoomCode, ROOM_CODE_LEN};
use crate::game::state::{CellPaint, GamePhase, TeamId};

/// Message type tag, in wire order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MsgType {
    Connected = 0,
    Host = 1,
    Hosted = 2,
    Join = 3,
    Joined = 4,
    Leave = 5,
    Left = 6,
    Start = 7,
    /// Reserved
    Started = 8,
    SwitchTeam = 9,
    /// Reserved
    Teamed = 10,
    Move = 11,
    /// Reserved
    Moved = 12,
    Shoot = 13,
    Shot = 14,
    Chat = 15,
    Chatted = 16,
    Map = 17,
    State = 18,
    System = 19,
    Error = 20,
    WeaponDown = 21,
    WeaponUpdate = 22,
    WeaponUp = 23,
    WeaponPressed = 24,
    WeaponUpdated = 25,
    WeaponReleased = 26,
}

const ALL_TYPES: [MsgType; 27] = [
    MsgType::Connected,
    MsgType::Host,
    MsgType::Hosted,
    MsgType::Join,
    MsgType::Joined,
    MsgType::Leave,
    MsgType::Left,
    MsgType::Start,
    MsgType::Started,
    MsgType::SwitchTeam,
    MsgType::Teamed,
    MsgType::Move,
    MsgType::Moved,
    MsgType::Shoot,
    MsgType::Shot,
    MsgType::Chat,
    MsgType::Chatted,
    MsgType::Map,
    MsgType::State,
    MsgType::System,
    MsgType::Error,
    MsgType::WeaponDown,
    MsgType::WeaponUpdate,
    MsgType::WeaponUp,
    MsgType::WeaponPressed,
    MsgType::WeaponUpdated,
    MsgType::WeaponReleased,
];

/// Number of known message types; any tag at or above this is rejected
pub const MSG_TYPE_COUNT: u8 = ALL_TYPES.len() as u8;

impl TryFrom<u8> for MsgType {
    type Error = ProtocolError;

    fn try_from(tag: u8) -> Result<Self, ProtocolError> {
        ALL_TYPES
            .get(usize::from(tag))
            .copied()
            .ok_or(ProtocolError::UnknownType(tag))
    }
}

/// Protocol-level failures. Any of these on an inbound frame ends the connection.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("empty frame")]
    Empty,

    #[error("unknown message type {0}")]
    UnknownType(u8),

    #[error("message type {0:?} is not valid in this direction")]
    Unexpected(MsgType),

    #[error("{kind:?} payload is {actual} bytes, expected {expected}")]
    BadLength {
        kind: MsgType,
        expected: usize,
        actual: usize,
    },

    #[error("{0:?} payload is truncated")]
    Truncated(MsgType),

    #[error("{kind:?} payload has {extra} trailing bytes")]
    TrailingBytes { kind: MsgType, extra: usize },

    #[error("string of {0} bytes does not fit a one-byte length prefix")]
    StringTooLong(usize),

    #[error("{0} entries do not fit a one-byte count")]
    TooManyEntries(usize),

    #[error("string is not valid UTF-8")]
    InvalidUtf8,

    #[error("invalid {field} value {value}")]
    InvalidValue { field: &'static str, value: i64 },

    #[error("weapon id {actual} does not match equipped weapon {expected}")]
    WeaponMismatch { expected: u8, actual: u8 },
}

/// Directional key flags carried by a `Move` message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MoveFlags {
    pub up: bool,
    pub down: bool,
    pub left: bool,
    pub right: bool,
    /// Key pressed (true) or released (false)
    pub start: bool,
}

impl MoveFlags {
    const UP: u8 = 1 << 0;
    const DOWN: u8 = 1 << 1;
    const LEFT: u8 = 1 << 2;
    const RIGHT: u8 = 1 << 3;
    const START: u8 = 1 << 4;

    pub fn from_bits(bits: u8) -> Self {
        Self {
            up: bits & Self::UP != 0,
            down: bits & Self::DOWN != 0,
            left: bits & Self::LEFT != 0,
            right: bits & Self::RIGHT != 0,
            start: bits & Self::START != 0,
        }
    }

    pub fn bits(&self) -> u8 {
        let mut bits = 0;
        for (set, bit) in [
            (self.up, Self::UP),
            (self.down, Self::DOWN),
            (self.left, Self::LEFT),
            (self.right, Self::RIGHT),
            (self.start, Self::START),
        ] {
            if set {
                bits |= bit;
            }
        }
        bits
    }
}

/// Weapon id plus the weapon-specific argument bytes, validated by the weapon itself
#[derive(Debug, Clone, PartialEq)]
pub struct WeaponFrame {
    pub weapon_id: u8,
    pub args: Bytes,
}

/// Messages sent from client to server
#[derive(Debug, Clone, PartialEq)]
pub enum ClientMsg {
    Host,
    Join { room: RoomCode },
    Leave,
    Start,
    SwitchTeam,
    Move(MoveFlags),
    Shoot,
    Chat { message: String },
    WeaponDown(WeaponFrame),
    WeaponUpdate(WeaponFrame),
    WeaponUp(WeaponFrame),
}

/// System notice subtype
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SystemKind {
    Info = 0,
}

/// Relay of another player's weapon input
#[derive(Debug, Clone, PartialEq)]
pub struct WeaponEvent {
    pub weapon_id: u8,
    pub user_id: UserId,
    pub payload: Bytes,
}

/// Player record inside a `State` message
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerSnapshot {
    pub user_id: UserId,
    pub team: TeamId,
    pub x: f64,
    pub y: f64,
    pub vx: i32,
    pub vy: i32,
    pub name: String,
}

/// Full session state broadcast
#[derive(Debug, Clone, PartialEq)]
pub struct StateSnapshot {
    pub host: UserId,
    pub room: RoomCode,
    pub started: bool,
    /// Unix seconds, 0 before the first round
    pub started_at: i32,
    pub team_a_color: i32,
    pub team_b_color: i32,
    pub score_a: i32,
    pub score_b: i32,
    pub phase: GamePhase,
    pub players: Vec<PlayerSnapshot>,
}

/// Messages sent from server to client
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMsg {
    Connected { user_id: UserId, username: String },
    Hosted { room: RoomCode },
    Joined { room: RoomCode },
    Left,
    Shot(CellPaint),
    Chatted { from: UserId, message: String },
    Map(Map),
    State(StateSnapshot),
    System { kind: SystemKind, message: String },
    Error { message: String },
    WeaponPressed(WeaponEvent),
    WeaponUpdated(WeaponEvent),
    WeaponReleased(WeaponEvent),
}

// ============================================================================
// Helpers
// ============================================================================

fn split_tag(frame: &[u8]) -> Result<(MsgType, &[u8]), ProtocolError> {
    let (&tag, payload) = frame.split_first().ok_or(ProtocolError::Empty)?;
    Ok((MsgType::try_from(tag)?, payload))
}

fn expect_len(kind: MsgType, payload: &[u8], expected: usize) -> Result<(), ProtocolError> {
    if payload.len() == expected {
        Ok(())
    } else {
        Err(ProtocolError::BadLength {
            kind,
            expected,
            actual: payload.len(),
        })
    }
}

fn put_short_str(buf: &mut BytesMut, s: &str) -> Result<(), ProtocolError> {
    let len = u8::try_from(s.len()).map_err(|_| ProtocolError::StringTooLong(s.len()))?;
    buf.put_u8(len);
    buf.put_slice(s.as_bytes());
    Ok(())
}

fn utf8(bytes: &[u8]) -> Result<String, ProtocolError> {
    String::from_utf8(bytes.to_vec()).map_err(|_| ProtocolError::InvalidUtf8)
}

/// Bounds-checked cursor over a payload
struct Reader<'a> {
    kind: MsgType,
    buf: &'a [u8],
}

impl<'a> Reader<'a> {
    fn new(kind: MsgType, buf: &'a [u8]) -> Self {
        Self { kind, buf }
    }

    fn need(&self, n: usize) -> Result<(), ProtocolError> {
        if self.buf.remaining() < n {
            Err(ProtocolError::Truncated(self.kind))
        } else {
            Ok(())
        }
    }

    fn u8(&mut self) -> Result<u8, ProtocolError> {
        self.need(1)?;
        Ok(self.buf.get_u8())
    }

    fn i16(&mut self) -> Result<i16, ProtocolError> {
        self.need(2)?;
        Ok(self.buf.get_i16_le())
    }

    fn i32(&mut self) -> Result<i32, ProtocolError> {
        self.need(4)?;
        Ok(self.buf.get_i32_le())
    }

    fn f64(&mut self) -> Result<f64, ProtocolError> {
        self.need(8)?;
        Ok(self.buf.get_f64_le())
    }

    fn bytes(&mut self, n: usize) -> Result<&'a [u8], ProtocolError> {
        self.need(n)?;
        let (head, tail) = self.buf.split_at(n);
        self.buf = tail;
        Ok(head)
    }

    fn room(&mut self) -> Result<RoomCode, ProtocolError> {
        let raw = self.bytes(ROOM_CODE_LEN)?;
        let mut code = [0u8; ROOM_CODE_LEN];
        code.copy_from_slice(raw);
        Ok(RoomCode::from_bytes(code))
    }

    fn short_str(&mut self) -> Result<String, ProtocolError> {
        let len = usize::from(self.u8()?);
        utf8(self.bytes(len)?)
    }

    fn rest(&mut self) -> &'a [u8] {
        std::mem::take(&mut self.buf)
    }

    fn finish(self) -> Result<(), ProtocolError> {
        if self.buf.is_empty() {
            Ok(())
        } else {
            Err(ProtocolError::TrailingBytes {
                kind: self.kind,
                extra: self.buf.len(),
            })
        }
    }
}

// ============================================================================
// Client messages
// ============================================================================

impl ClientMsg {
    pub fn kind(&self) -> MsgType {
        match self {
            ClientMsg::Host => MsgType::Host,
            ClientMsg::Join { .. } => MsgType::Join,
            ClientMsg::Leave => MsgType::Leave,
            ClientMsg::Start => MsgType::Start,
            ClientMsg::SwitchTeam => MsgType::SwitchTeam,
            ClientMsg::Move(_) => MsgType::Move,
            ClientMsg::Shoot => MsgType::Shoot,
            ClientMsg::Chat { .. } => MsgType::Chat,
            ClientMsg::WeaponDown(_) => MsgType::WeaponDown,
            ClientMsg::WeaponUpdate(_) => MsgType::WeaponUpdate,
            ClientMsg::WeaponUp(_) => MsgType::WeaponUp,
        }
    }

    /// Decode one inbound frame
    pub fn decode(frame: &[u8]) -> Result<Self, ProtocolError> {
        let (kind, payload) = split_tag(frame)?;
        match kind {
            MsgType::Host | MsgType::Leave | MsgType::Start | MsgType::SwitchTeam | MsgType::Shoot => {
                expect_len(kind, payload, 0)?;
                Ok(match kind {
                    MsgType::Host => ClientMsg::Host,
                    MsgType::Leave => ClientMsg::Leave,
                    MsgType::Start => ClientMsg::Start,
                    MsgType::SwitchTeam => ClientMsg::SwitchTeam,
                    _ => ClientMsg::Shoot,
                })
            }
            MsgType::Join => {
                expect_len(kind, payload, ROOM_CODE_LEN)?;
                let room = Reader::new(kind, payload).room()?;
                Ok(ClientMsg::Join { room })
            }
            MsgType::Move => {
                expect_len(kind, payload, 1)?;
                Ok(ClientMsg::Move(MoveFlags::from_bits(payload[0])))
            }
            MsgType::Chat => {
                let declared = payload.first().map_or(0, |len| usize::from(*len));
                if declared == 0 {
                    return Err(ProtocolError::Truncated(kind));
                }
                expect_len(kind, payload, 1 + declared)?;
                Ok(ClientMsg::Chat {
                    message: utf8(&payload[1..])?,
                })
            }
            MsgType::WeaponDown | MsgType::WeaponUpdate | MsgType::WeaponUp => {
                let (&weapon_id, args) =
                    payload.split_first().ok_or(ProtocolError::Truncated(kind))?;
                let frame = WeaponFrame {
                    weapon_id,
                    args: Bytes::copy_from_slice(args),
                };
                Ok(match kind {
                    MsgType::WeaponDown => ClientMsg::WeaponDown(frame),
                    MsgType::WeaponUpdate => ClientMsg::WeaponUpdate(frame),
                    _ => ClientMsg::WeaponUp(frame),
                })
            }
            other => Err(ProtocolError::Unexpected(other)),
        }
    }

    /// Encode as a client would send it
    pub fn encode(&self) -> Result<Bytes, ProtocolError> {
        let mut buf = BytesMut::with_capacity(8);
        buf.put_u8(self.kind() as u8);
        match self {
            ClientMsg::Host
            | ClientMsg::Leave
            | ClientMsg::Start
            | ClientMsg::SwitchTeam
            | ClientMsg::Shoot => {}
            ClientMsg::Join { room } => buf.put_slice(room.as_bytes()),
            ClientMsg::Move(flags) => buf.put_u8(flags.bits()),
            ClientMsg::Chat { message } => put_short_str(&mut buf, message)?,
            ClientMsg::WeaponDown(frame)
            | ClientMsg::WeaponUpdate(frame)
            | ClientMsg::WeaponUp(frame) => {
                buf.put_u8(frame.weapon_id);
                buf.put_slice(&frame.args);
            }
        }
        Ok(buf.freeze())
    }
}

// ============================================================================
// Server messages
// ============================================================================

impl ServerMsg {
    pub fn kind(&self) -> MsgType {
        match self {
            ServerMsg::Connected { .. } => MsgType::Connected,
            ServerMsg::Hosted { .. } => MsgType::Hosted,
            ServerMsg::Joined { .. } => MsgType::Joined,
            ServerMsg::Left => MsgType::Left,
            ServerMsg::Shot(_) => MsgType::Shot,
            ServerMsg::Chatted { .. } => MsgType::Chatted,
            ServerMsg::Map(_) => MsgType::Map,
            ServerMsg::State(_) => MsgType::State,
            ServerMsg::System { .. } => MsgType::System,
            ServerMsg::Error { .. } => MsgType::Error,
            ServerMsg::WeaponPressed(_) => MsgType::WeaponPressed,
            ServerMsg::WeaponUpdated(_) => MsgType::WeaponUpdated,
            ServerMsg::WeaponReleased(_) => MsgType::WeaponReleased,
        }
    }

    /// Encode to a single outbound frame
    pub fn encode(&self) -> Result<Bytes, ProtocolError> {
        let mut buf = BytesMut::with_capacity(32);
        buf.put_u8(self.kind() as u8);
        match self {
            ServerMsg::Connected { user_id, username } => {
                buf.put_i16_le(user_id.0);
                buf.put_slice(username.as_bytes());
            }
            ServerMsg::Hosted { room } | ServerMsg::Joined { room } => {
                buf.put_slice(room.as_bytes());
            }
            ServerMsg::Left => {}
            ServerMsg::Shot(cell) => {
                buf.put_i32_le(cell.x);
                buf.put_i32_le(cell.y);
                buf.put_u8(cell.tile as u8);
            }
            ServerMsg::Chatted { from, message } => {
                buf.put_i16_le(from.0);
                put_short_str(&mut buf, message)?;
            }
            ServerMsg::Map(map) => {
                buf.reserve(8 + map.tiles().len());
                buf.put_i32_le(map.width() as i32);
                buf.put_i32_le(map.height() as i32);
                buf.extend(map.tiles().iter().map(|t| *t as u8));
            }
            ServerMsg::State(state) => encode_state(&mut buf, state)?,
            ServerMsg::System { kind, message } => {
                buf.put_u8(*kind as u8);
                put_short_str(&mut buf, message)?;
            }
            ServerMsg::Error { message } => put_short_str(&mut buf, message)?,
            ServerMsg::WeaponPressed(event)
            | ServerMsg::WeaponUpdated(event)
            | ServerMsg::WeaponReleased(event) => {
                let len = u8::try_from(event.payload.len())
                    .map_err(|_| ProtocolError::StringTooLong(event.payload.len()))?;
                buf.put_u8(event.weapon_id);
                buf.put_i16_le(event.user_id.0);
                buf.put_u8(len);
                buf.put_slice(&event.payload);
            }
        }
        Ok(buf.freeze())
    }

    /// Decode one outbound frame, as a client would
    pub fn decode(frame: &[u8]) -> Result<Self, ProtocolError> {
        let (kind, payload) = split_tag(frame)?;
        let mut r = Reader::new(kind, payload);
        let msg = match kind {
            MsgType::Connected => {
                let user_id = UserId(r.i16()?);
                let username = utf8(r.rest())?;
                ServerMsg::Connected { user_id, username }
            }
            MsgType::Hosted => {
                expect_len(kind, payload, ROOM_CODE_LEN)?;
                ServerMsg::Hosted { room: r.room()? }
            }
            MsgType::Joined => {
                expect_len(kind, payload, ROOM_CODE_LEN)?;
                ServerMsg::Joined { room: r.room()? }
            }
            MsgType::Left => {
                expect_len(kind, payload, 0)?;
                ServerMsg::Left
            }
            MsgType::Shot => {
                expect_len(kind, payload, 9)?;
                let x = r.i32()?;
                let y = r.i32()?;
                let raw = r.u8()?;
                let tile = Tile::try_from(raw).map_err(|v| ProtocolError::InvalidValue {
                    field: "tile",
                    value: i64::from(v),
                })?;
                ServerMsg::Shot(CellPaint { x, y, tile })
            }
            MsgType::Chatted => {
                let from = UserId(r.i16()?);
                let message = r.short_str()?;
                ServerMsg::Chatted { from, message }
            }
            MsgType::Map => ServerMsg::Map(decode_map(&mut r)?),
            MsgType::State => ServerMsg::State(decode_state(&mut r)?),
            MsgType::System => {
                let raw = r.u8()?;
                let kind = match raw {
                    0 => SystemKind::Info,
                    other => {
                        return Err(ProtocolError::InvalidValue {
                            field: "system kind",
                            value: i64::from(other),
                        })
                    }
                };
                ServerMsg::System {
                    kind,
                    message: r.short_str()?,
                }
            }
            MsgType::Error => ServerMsg::Error {
                message: r.short_str()?,
            },
            MsgType::WeaponPressed | MsgType::WeaponUpdated | MsgType::WeaponReleased => {
                let weapon_id = r.u8()?;
                let user_id = UserId(r.i16()?);
                let len = usize::from(r.u8()?);
                let event = WeaponEvent {
                    weapon_id,
                    user_id,
                    payload: Bytes::copy_from_slice(r.bytes(len)?),
                };
                match kind {
                    MsgType::WeaponPressed => ServerMsg::WeaponPressed(event),
                    MsgType::WeaponUpdated => ServerMsg::WeaponUpdated(event),
                    _ => ServerMsg::WeaponReleased(event),
                }
            }
            other => return Err(ProtocolError::Unexpected(other)),
        };
        r.finish()?;
        Ok(msg)
    }
}

fn encode_state(buf: &mut BytesMut, state: &StateSnapshot) -> Result<(), ProtocolError> {
    let count =
        u8::try_from(state.players.len()).map_err(|_| ProtocolError::TooManyEntries(state.players.len()))?;

    buf.put_i16_le(state.host.0);
    buf.put_slice(state.room.as_bytes());
    buf.put_u8(u8::from(state.started));
    buf.put_i32_le(state.started_at);
    buf.put_i32_le(state.team_a_color);
    buf.put_i32_le(state.team_b_color);
    buf.put_i32_le(state.score_a);
    buf.put_i32_le(state.score_b);
    buf.put_u8(state.phase as u8);
    buf.put_u8(count);

    for player in &state.players {
        buf.put_i16_le(player.user_id.0);
        buf.put_u8(player.team as u8);
        buf.put_f64_le(player.x);
        buf.put_f64_le(player.y);
        buf.put_i32_le(player.vx);
        buf.put_i32_le(player.vy);
        put_short_str(buf, &player.name)?;
    }
    Ok(())
}

fn decode_state(r: &mut Reader<'_>) -> Result<StateSnapshot, ProtocolError> {
    let host = UserId(r.i16()?);
    let room = r.room()?;
    let started = match r.u8()? {
        0 => false,
        1 => true,
        other => {
            return Err(ProtocolError::InvalidValue {
                field: "started",
                value: i64::from(other),
            })
        }
    };
    let started_at = r.i32()?;
    let team_a_color = r.i32()?;
    let team_b_color = r.i32()?;
    let score_a = r.i32()?;
    let score_b = r.i32()?;
    let phase_raw = r.u8()?;
    let phase = GamePhase::try_from(phase_raw).map_err(|v| ProtocolError::InvalidValue {
        field: "phase",
        value: i64::from(v),
    })?;
    let count = r.u8()?;

    let mut players = Vec::with_capacity(usize::from(count));
    for _ in 0..count {
        let user_id = UserId(r.i16()?);
        let team_raw = r.u8()?;
        let team = TeamId::try_from(team_raw).map_err(|v| ProtocolError::InvalidValue {
            field: "team",
            value: i64::from(v),
        })?;
        players.push(PlayerSnapshot {
            user_id,
            team,
            x: r.f64()?,
            y: r.f64()?,
            vx: r.i32()?,
            vy: r.i32()?,
            name: r.short_str()?,
        });
    }

    Ok(StateSnapshot {
        host,
        room,
        started,
        started_at,
        team_a_color,
        team_b_color,
        score_a,
        score_b,
        phase,
        players,
    })
}

fn decode_map(r: &mut Reader<'_>) -> Result<Map, ProtocolError> {
    let width = r.i32()?;
    let height = r.i32()?;
    let (Ok(w), Ok(h)) = (usize::try_from(width), usize::try_from(height)) else {
        return Err(ProtocolError::InvalidValue {
            field: "map size",
            value: i64::from(width.min(height)),
        });
    };

    let cells = w.checked_mul(h).ok_or(ProtocolError::Truncated(MsgType::Map))?;
    let tiles = r
        .bytes(cells)?
        .iter()
        .map(|raw| {
            Tile::try_from(*raw).map_err(|v| ProtocolError::InvalidValue {
                field: "tile",
                value: i64::from(v),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Map::from_tiles(w, h, tiles).ok_or(ProtocolError::Truncated(MsgType::Map))
}
