//! Per-connection inbound throttling, metered by message kind

use std::num::NonZeroU32;

use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};

use crate::ws::protocol::ClientMsg;

type Limiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Aim updates per second; a client sends one per pointer move while charging
pub const AIM_UPDATES_PER_SEC: u32 = 60;
/// Paint shots per second, one per simulation tick
pub const SHOTS_PER_SEC: u32 = 30;
/// Chat lines per second
pub const CHAT_PER_SEC: u32 = 4;

fn limiter(per_second: u32) -> Limiter {
    RateLimiter::direct(Quota::per_second(
        NonZeroU32::new(per_second).unwrap_or(NonZeroU32::MIN),
    ))
}

/// Drops excess high-frequency frames from one connection.
///
/// Key presses and releases (`Move`, `WeaponDown`, `WeaponUp`) and the
/// lifecycle commands are never metered: losing a release would leave a
/// player moving or charging until the next press.
pub struct InboundThrottle {
    aim: Limiter,
    shots: Limiter,
    chat: Limiter,
}

impl InboundThrottle {
    pub fn new() -> Self {
        Self {
            aim: limiter(AIM_UPDATES_PER_SEC),
            shots: limiter(SHOTS_PER_SEC),
            chat: limiter(CHAT_PER_SEC),
        }
    }

    /// True if `msg` should reach the dispatcher
    pub fn admit(&self, msg: &ClientMsg) -> bool {
        let quota = match msg {
            ClientMsg::WeaponUpdate(_) => &self.aim,
            ClientMsg::Shoot => &self.shots,
            ClientMsg::Chat { .. } => &self.chat,
            ClientMsg::Host
            | ClientMsg::Join { .. }
            | ClientMsg::Leave
            | ClientMsg::Start
            | ClientMsg::SwitchTeam
            | ClientMsg::Move(_)
            | ClientMsg::WeaponDown(_)
            | ClientMsg::WeaponUp(_) => return true,
        };
        quota.check().is_ok()
    }
}

impl Default for InboundThrottle {
    fn default() -> Self {
        Self::new()
    }
}
