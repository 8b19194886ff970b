//! Player entity: position, velocity and the weapon it carries

use rand::Rng;

use crate::app::users::UserId;
use crate::ws::protocol::MoveFlags;

use super::grid::Map;
use super::physics::PhysicsSystem;
use super::state::TeamId;
use super::weapon::{Weapon, WeaponId, Wielder};

/// Random draws before falling back to a scan for an open cell
const SPAWN_ATTEMPTS: usize = 4096;

#[derive(Debug)]
pub struct Player {
    pub user_id: UserId,
    pub team: TeamId,
    pub x: f64,
    pub y: f64,
    pub vx: i32,
    pub vy: i32,
    weapon: Box<dyn Weapon>,
}

impl Player {
    pub fn new(user_id: UserId, team: TeamId) -> Self {
        Self {
            user_id,
            team,
            x: 0.0,
            y: 0.0,
            vx: 0,
            vy: 0,
            weapon: WeaponId::Grenade.equip(),
        }
    }

    pub fn weapon(&self) -> &dyn Weapon {
        self.weapon.as_ref()
    }

    pub fn weapon_mut(&mut self) -> &mut dyn Weapon {
        self.weapon.as_mut()
    }

    pub fn wielder(&self) -> Wielder {
        Wielder {
            user_id: self.user_id,
            team: self.team,
            x: self.x,
            y: self.y,
        }
    }

    /// Apply a key press or release for every direction set in `flags`
    pub fn apply_move(&mut self, flags: MoveFlags) {
        let pressed = flags.start;
        if flags.up {
            self.vy = PhysicsSystem::nudge_axis(self.vy, -1, pressed);
        }
        if flags.down {
            self.vy = PhysicsSystem::nudge_axis(self.vy, 1, pressed);
        }
        if flags.left {
            self.vx = PhysicsSystem::nudge_axis(self.vx, -1, pressed);
        }
        if flags.right {
            self.vx = PhysicsSystem::nudge_axis(self.vx, 1, pressed);
        }
    }

    /// Integrate one tick of movement
    pub fn update(&mut self, map: &Map) {
        if self.vx == 0 && self.vy == 0 {
            return;
        }
        (self.x, self.y) = PhysicsSystem::step(map, self.x, self.y, self.vx, self.vy);
    }

    pub fn stop(&mut self) {
        self.vx = 0;
        self.vy = 0;
    }

    /// Cell the player is standing on, rounding to the nearest
    pub fn cell(&self) -> (i32, i32) {
        ((self.x + 0.5).floor() as i32, (self.y + 0.5).floor() as i32)
    }

    /// Place the player on a uniformly random open cell and clear its
    /// velocity and weapon state for a new round
    pub fn spawn<R: Rng + ?Sized>(&mut self, map: &Map, rng: &mut R) {
        let (x, y) = random_open_cell(map, rng);
        self.x = f64::from(x);
        self.y = f64::from(y);
        self.stop();
        self.weapon.reset();
    }
}

fn random_open_cell<R: Rng + ?Sized>(map: &Map, rng: &mut R) -> (i32, i32) {
    let (w, h) = (map.width() as i32, map.height() as i32);
    if w == 0 || h == 0 {
        return (0, 0);
    }
    for _ in 0..SPAWN_ATTEMPTS {
        let (x, y) = (rng.gen_range(0..w), rng.gen_range(0..h));
        if !map.get(x, y).is_wall() {
            return (x, y);
        }
    }
    (0..h)
        .flat_map(|y| (0..w).map(move |x| (x, y)))
        .find(|&(x, y)| !map.get(x, y).is_wall())
        .unwrap_or((0, 0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::grid::Tile;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn pressed(up: bool, down: bool, left: bool, right: bool) -> MoveFlags {
        MoveFlags {
            up,
            down,
            left,
            right,
            start: true,
        }
    }

    #[test]
    fn presses_and_releases_adjust_velocity() {
        let mut player = Player::new(UserId(1), TeamId::A);
        player.apply_move(pressed(false, false, false, true));
        assert_eq!((player.vx, player.vy), (1, 0));

        // repeated press does not overflow
        player.apply_move(pressed(false, false, false, true));
        assert_eq!(player.vx, 1);

        player.apply_move(pressed(true, false, false, false));
        assert_eq!((player.vx, player.vy), (1, -1));

        player.apply_move(MoveFlags {
            right: true,
            ..MoveFlags::default()
        });
        assert_eq!((player.vx, player.vy), (0, -1));
    }

    #[test]
    fn spawn_lands_on_open_cell() {
        let mut map = Map::new(6, 4);
        for y in 0..4 {
            for x in 0..6 {
                if (x, y) != (4, 2) {
                    map.set(x, y, Tile::Wall);
                }
            }
        }
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let mut player = Player::new(UserId(1), TeamId::B);
        player.vx = 1;
        player.spawn(&map, &mut rng);
        assert_eq!((player.x, player.y), (4.0, 2.0));
        assert_eq!((player.vx, player.vy), (0, 0));
    }

    #[test]
    fn cell_rounds_to_nearest() {
        let mut player = Player::new(UserId(1), TeamId::A);
        player.x = 2.49;
        player.y = 2.5;
        assert_eq!(player.cell(), (2, 3));
    }

    #[test]
    fn stationary_player_does_not_move() {
        let map = Map::new(8, 8);
        let mut player = Player::new(UserId(1), TeamId::A);
        player.x = 3.0;
        player.y = 3.0;
        player.update(&map);
        assert_eq!((player.x, player.y), (3.0, 3.0));

        player.vx = 1;
        player.update(&map);
        assert!(player.x > 3.0);
    }
}
