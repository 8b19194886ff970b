//! Weapon capability shared by every player-held weapon

use std::fmt;
use std::time::Duration;

use bytes::{BufMut, Bytes, BytesMut};

use crate::app::users::UserId;
use crate::ws::protocol::{MsgType, ProtocolError};

use super::grenade::Grenade;
use super::state::{CellPaint, GameState, TeamId};
use super::GameError;

/// Stable numeric weapon id, as carried on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum WeaponId {
    Grenade = 0,
}

impl TryFrom<u8> for WeaponId {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(WeaponId::Grenade),
            other => Err(other),
        }
    }
}

impl WeaponId {
    /// Fresh weapon instance for a newly joined player
    pub fn equip(self) -> Box<dyn Weapon> {
        match self {
            WeaponId::Grenade => Box::new(Grenade::new()),
        }
    }
}

/// Decoded weapon arguments
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WeaponArgs {
    /// Aim direction in radians
    Aim { angle: f64 },
    /// Release point in grid units
    Target { x: f64, y: f64 },
}

impl WeaponArgs {
    pub const AIM_LEN: usize = 8;
    pub const TARGET_LEN: usize = 16;

    /// Raw argument bytes, relayed to other clients behind a length prefix
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(Self::TARGET_LEN);
        match self {
            WeaponArgs::Aim { angle } => buf.put_f64_le(*angle),
            WeaponArgs::Target { x, y } => {
                buf.put_f64_le(*x);
                buf.put_f64_le(*y);
            }
        }
        buf.freeze()
    }

    pub fn decode_aim(kind: MsgType, args: &[u8]) -> Result<Self, ProtocolError> {
        let raw: [u8; Self::AIM_LEN] = args.try_into().map_err(|_| ProtocolError::BadLength {
            kind,
            expected: Self::AIM_LEN,
            actual: args.len(),
        })?;
        Ok(WeaponArgs::Aim {
            angle: f64::from_le_bytes(raw),
        })
    }

    pub fn decode_target(kind: MsgType, args: &[u8]) -> Result<Self, ProtocolError> {
        if args.len() != Self::TARGET_LEN {
            return Err(ProtocolError::BadLength {
                kind,
                expected: Self::TARGET_LEN,
                actual: args.len(),
            });
        }
        let (x, y) = args.split_at(8);
        let read = |half: &[u8]| {
            let mut raw = [0u8; 8];
            raw.copy_from_slice(half);
            f64::from_le_bytes(raw)
        };
        Ok(WeaponArgs::Target {
            x: read(x),
            y: read(y),
        })
    }
}

/// The player operating a weapon, as seen by the weapon
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Wielder {
    pub user_id: UserId,
    pub team: TeamId,
    pub x: f64,
    pub y: f64,
}

/// Outcome of a release: where the effect landed and every cell it painted
#[derive(Debug, Clone, PartialEq)]
pub struct Detonation {
    pub x: f64,
    pub y: f64,
    pub painted: Vec<CellPaint>,
}

/// A charge-and-release weapon. One instance per player, dispatched by id.
pub trait Weapon: Send + fmt::Debug {
    fn id(&self) -> WeaponId;

    fn name(&self) -> &'static str;

    /// Minimum time between releases
    fn cooldown(&self) -> Duration;

    /// Seconds since the last release, `None` if never released
    fn cooldown_elapsed(&self) -> Option<f64>;

    fn is_charging(&self) -> bool;

    /// Start charging
    fn on_down(&mut self, wielder: &Wielder, args: &WeaponArgs) -> Result<(), GameError>;

    /// Per-tick aim update while charging
    fn on_update(&mut self, wielder: &Wielder, args: &WeaponArgs) -> Result<(), GameError>;

    /// Release, painting into `state`
    fn on_up(
        &mut self,
        state: &mut GameState,
        wielder: &Wielder,
        args: &WeaponArgs,
    ) -> Result<Detonation, GameError>;

    /// Forget any charge or cooldown, for a new round
    fn reset(&mut self);

    fn parse_down_args(&self, args: &[u8]) -> Result<WeaponArgs, ProtocolError>;

    fn parse_update_args(&self, args: &[u8]) -> Result<WeaponArgs, ProtocolError>;

    fn parse_up_args(&self, args: &[u8]) -> Result<WeaponArgs, ProtocolError>;

    /// Whether the cooldown still blocks use. A weapon never released is ready.
    fn cooling_down(&self) -> bool {
        self.cooldown_elapsed()
            .is_some_and(|elapsed| elapsed < self.cooldown().as_secs_f64())
    }
}
