//! Charge-and-release area weapon

use std::time::{Duration, Instant};

use crate::util::time::secs_since;
use crate::ws::protocol::{MsgType, ProtocolError};

use super::state::GameState;
use super::weapon::{Detonation, Weapon, WeaponArgs, WeaponId, Wielder};
use super::GameError;

/// Range gained per second of charge
pub const RANGE_PER_SEC: f64 = 1.0;
/// Range with no charge at all
pub const BASE_RANGE: f64 = 2.0;
pub const MAX_RANGE: f64 = 5.0;
/// Side of the painted square, in cells
pub const HIT_BOX: i32 = 3;
pub const COOLDOWN: Duration = Duration::from_secs(8);

/// Effective throw range after charging for `charge_secs`
pub fn throw_range(charge_secs: f64) -> f64 {
    (RANGE_PER_SEC * charge_secs + BASE_RANGE).min(MAX_RANGE)
}

/// Pull `target` back onto the circle of radius `range` around `origin`,
/// keeping its bearing. Targets already in range are returned as is.
pub fn resolve_target(origin: (f64, f64), target: (f64, f64), range: f64) -> (f64, f64) {
    let (ox, oy) = origin;
    let (tx, ty) = target;
    if (tx - ox).hypot(ty - oy) <= range {
        return target;
    }
    let theta = (ty - oy).atan2(tx - ox);
    (ox + range * theta.cos(), oy + range * theta.sin())
}

/// Move a point outside `[0, width] x [0, height]` back onto the edge it
/// crossed, sliding along the line from `origin`. X is resolved first, then Y.
/// `origin` must lie inside the map.
pub fn clamp_into_map(origin: (f64, f64), target: (f64, f64), width: f64, height: f64) -> (f64, f64) {
    let (ox, oy) = origin;
    let (mut x, mut y) = target;

    if x < 0.0 || x > width {
        let edge = if x < 0.0 { 0.0 } else { width };
        y = oy + (y - oy) * ((edge - ox) / (x - ox));
        x = edge;
    }
    if y < 0.0 || y > height {
        let edge = if y < 0.0 { 0.0 } else { height };
        x = ox + (x - ox) * ((edge - oy) / (y - oy));
        y = edge;
    }

    (x, y)
}

#[derive(Debug, Default)]
pub struct Grenade {
    charge_started_at: Option<Instant>,
    cooldown_started_at: Option<Instant>,
}

impl Grenade {
    pub fn new() -> Self {
        Self::default()
    }

    fn charge_secs(&self) -> f64 {
        // a release without a prior press counts as fully charged
        secs_since(self.charge_started_at).unwrap_or(f64::INFINITY)
    }
}

impl Weapon for Grenade {
    fn id(&self) -> WeaponId {
        WeaponId::Grenade
    }

    fn name(&self) -> &'static str {
        "Grenade"
    }

    fn cooldown(&self) -> Duration {
        COOLDOWN
    }

    fn cooldown_elapsed(&self) -> Option<f64> {
        secs_since(self.cooldown_started_at)
    }

    fn is_charging(&self) -> bool {
        self.charge_started_at.is_some()
    }

    fn on_down(&mut self, _wielder: &Wielder, _args: &WeaponArgs) -> Result<(), GameError> {
        if self.is_charging() {
            return Err(GameError::AlreadyCharging);
        }
        if self.cooling_down() {
            return Err(GameError::CoolingDown);
        }
        self.charge_started_at = Some(Instant::now());
        Ok(())
    }

    fn on_update(&mut self, _wielder: &Wielder, _args: &WeaponArgs) -> Result<(), GameError> {
        if !self.is_charging() {
            return Err(GameError::NotCharging);
        }
        Ok(())
    }

    fn on_up(
        &mut self,
        state: &mut GameState,
        wielder: &Wielder,
        args: &WeaponArgs,
    ) -> Result<Detonation, GameError> {
        if self.cooling_down() {
            return Err(GameError::CoolingDown);
        }

        let WeaponArgs::Target { x, y } = *args else {
            return Err(GameError::InvalidCoordinates);
        };
        let width = state.map.width() as f64;
        let height = state.map.height() as f64;
        if !x.is_finite() || !y.is_finite() || x > width || y > height {
            return Err(GameError::InvalidCoordinates);
        }

        let origin = (wielder.x + 0.5, wielder.y + 0.5);
        let aimed = resolve_target(origin, (x, y), throw_range(self.charge_secs()));
        let (x, y) = clamp_into_map(origin, aimed, width, height);

        let half = (HIT_BOX - 1) / 2;
        let (cx, cy) = (x.floor() as i32, y.floor() as i32);
        let mut painted = Vec::with_capacity((HIT_BOX * HIT_BOX) as usize);
        for dx in -half..=half {
            for dy in -half..=half {
                // walls and off-grid cells are skipped
                if let Ok(cell) = state.paint(cx + dx, cy + dy, wielder.team) {
                    painted.push(cell);
                }
            }
        }

        self.charge_started_at = None;
        self.cooldown_started_at = Some(Instant::now());

        Ok(Detonation { x, y, painted })
    }

    fn reset(&mut self) {
        self.charge_started_at = None;
        self.cooldown_started_at = None;
    }

    fn parse_down_args(&self, args: &[u8]) -> Result<WeaponArgs, ProtocolError> {
        WeaponArgs::decode_aim(MsgType::WeaponDown, args)
    }

    fn parse_update_args(&self, args: &[u8]) -> Result<WeaponArgs, ProtocolError> {
        WeaponArgs::decode_aim(MsgType::WeaponUpdate, args)
    }

    fn parse_up_args(&self, args: &[u8]) -> Result<WeaponArgs, ProtocolError> {
        WeaponArgs::decode_target(MsgType::WeaponUp, args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::users::UserId;
    use crate::game::grid::{Map, Tile};
    use crate::game::state::TeamId;
    use tokio_test::{assert_err, assert_ok};

    const EPS: f64 = 1e-9;

    fn open_state() -> GameState {
        GameState::with_map(Map::new(48, 27))
    }

    fn wielder(x: f64, y: f64) -> Wielder {
        Wielder {
            user_id: UserId(1),
            team: TeamId::A,
            x,
            y,
        }
    }

    fn aim() -> WeaponArgs {
        WeaponArgs::Aim { angle: 0.0 }
    }

    #[test]
    fn range_grows_with_charge_up_to_max() {
        assert_eq!(throw_range(0.0), BASE_RANGE);
        assert_eq!(throw_range(1.0), 3.0);
        assert_eq!(throw_range(10.0), MAX_RANGE);
        assert_eq!(throw_range(f64::INFINITY), MAX_RANGE);
    }

    #[test]
    fn far_target_keeps_its_bearing() {
        let origin = (10.5, 10.5);
        let (x, y) = resolve_target(origin, (20.5, 20.5), MAX_RANGE);
        assert!(((x - origin.0).hypot(y - origin.1) - MAX_RANGE).abs() < EPS);
        let bearing = (y - origin.1).atan2(x - origin.0);
        assert!((bearing - std::f64::consts::FRAC_PI_4).abs() < EPS);

        assert_eq!(resolve_target(origin, (12.0, 11.0), MAX_RANGE), (12.0, 11.0));
    }

    #[test]
    fn targets_past_an_edge_land_on_it() {
        assert_eq!(clamp_into_map((1.5, 5.5), (-3.5, 5.5), 48.0, 27.0), (0.0, 5.5));

        let (x, y) = clamp_into_map((5.5, 1.5), (7.5, -2.5), 48.0, 27.0);
        assert!((x - 6.25).abs() < EPS);
        assert_eq!(y, 0.0);

        let (x, y) = clamp_into_map((0.5, 0.5), (-3.0, -2.0), 48.0, 27.0);
        assert_eq!(x, 0.0);
        assert!((0.0..=27.0).contains(&y));

        let (x, y) = clamp_into_map((46.5, 25.5), (52.0, 30.0), 48.0, 27.0);
        assert!((0.0..=48.0).contains(&x));
        assert!((0.0..=27.0).contains(&y));
    }

    #[test]
    fn release_paints_a_square_at_max_range() {
        let mut state = open_state();
        let mut grenade = Grenade::new();

        let blast = assert_ok!(grenade.on_up(
            &mut state,
            &wielder(10.0, 10.0),
            &WeaponArgs::Target { x: 30.5, y: 10.5 }
        ));

        assert!((blast.x - 15.5).abs() < EPS);
        assert!((blast.y - 10.5).abs() < EPS);
        assert_eq!(blast.painted.len(), 9);
        assert_eq!(state.score_a, 9);
        for x in 14..=16 {
            for y in 9..=11 {
                assert_eq!(state.map.get(x, y), Tile::TeamA);
            }
        }
        assert!(!grenade.is_charging());
        assert!(grenade.cooling_down());
    }

    #[test]
    fn release_near_edge_skips_off_grid_and_walls() {
        let mut state = open_state();
        state.map.set(0, 5, Tile::Wall);
        let mut grenade = Grenade::new();

        let blast = assert_ok!(grenade.on_up(
            &mut state,
            &wielder(1.0, 5.0),
            &WeaponArgs::Target { x: -10.0, y: 5.5 }
        ));

        assert_eq!(blast.x, 0.0);
        assert!((blast.y - 5.5).abs() < EPS);
        // column -1 is off-grid, (0, 5) is a wall
        assert_eq!(blast.painted.len(), 5);
        assert_eq!(state.map.get(0, 5), Tile::Wall);
        assert_eq!(state.score_a, 5);
    }

    #[test]
    fn release_rejects_targets_beyond_the_far_edges() {
        let mut state = open_state();
        let mut grenade = Grenade::new();
        let who = wielder(5.0, 5.0);

        for (x, y) in [(48.5, 3.0), (3.0, 27.5), (f64::NAN, 1.0), (1.0, f64::INFINITY)] {
            assert_eq!(
                grenade.on_up(&mut state, &who, &WeaponArgs::Target { x, y }),
                Err(GameError::InvalidCoordinates)
            );
        }
        assert_eq!(state.score_a, 0);
        assert!(!grenade.cooling_down());
    }

    #[test]
    fn charge_then_cooldown_gate() {
        let mut state = open_state();
        let mut grenade = Grenade::new();
        let who = wielder(5.0, 5.0);

        assert_eq!(grenade.on_update(&who, &aim()), Err(GameError::NotCharging));
        assert_ok!(grenade.on_down(&who, &aim()));
        assert_ok!(grenade.on_update(&who, &aim()));
        assert_eq!(grenade.on_down(&who, &aim()), Err(GameError::AlreadyCharging));

        assert_ok!(grenade.on_up(&mut state, &who, &WeaponArgs::Target { x: 6.0, y: 6.0 }));
        assert_eq!(grenade.on_down(&who, &aim()), Err(GameError::CoolingDown));
        assert_err!(grenade.on_up(&mut state, &who, &WeaponArgs::Target { x: 6.0, y: 6.0 }));

        grenade.cooldown_started_at = Instant::now().checked_sub(COOLDOWN + Duration::from_secs(1));
        assert!(!grenade.cooling_down());
        assert_ok!(grenade.on_down(&who, &aim()));
    }

    #[test]
    fn short_charge_limits_range() {
        let mut state = open_state();
        let mut grenade = Grenade::new();
        assert_ok!(grenade.on_down(&wielder(10.0, 10.0), &aim()));

        let blast = assert_ok!(grenade.on_up(
            &mut state,
            &wielder(10.0, 10.0),
            &WeaponArgs::Target { x: 30.5, y: 10.5 }
        ));
        // released almost immediately, so only slightly past the base range
        assert!(blast.x >= 10.5 + BASE_RANGE - EPS);
        assert!(blast.x < 10.5 + BASE_RANGE + 1.0);
    }

    #[test]
    fn reset_clears_charge_and_cooldown() {
        let mut state = open_state();
        let mut grenade = Grenade::new();
        let who = wielder(5.0, 5.0);
        assert_ok!(grenade.on_up(&mut state, &who, &WeaponArgs::Target { x: 6.0, y: 6.0 }));
        assert!(grenade.cooldown_elapsed().is_some());

        grenade.reset();
        assert_eq!(grenade.cooldown_elapsed(), None);
        assert!(!grenade.is_charging());
    }

    #[test]
    fn parsers_check_exact_lengths() {
        let grenade = Grenade::new();
        assert_ok!(grenade.parse_down_args(&0.5f64.to_le_bytes()));
        assert_err!(grenade.parse_update_args(&[]));
        assert_err!(grenade.parse_up_args(&[0u8; 8]));
        assert_ok!(grenade.parse_up_args(&[0u8; 16]));
    }
}
