//! Player movement and wall collision

use crate::util::time::tick_delta;

use super::grid::Map;

/// Player speed in tiles per second
pub const PLAYER_SPEED: f64 = 10.0;

/// Physics system for grid-aligned continuous movement
pub struct PhysicsSystem;

impl PhysicsSystem {
    /// Advance one tick of movement for a unit-sized body at (x, y)
    pub fn step(map: &Map, x: f64, y: f64, vx: i32, vy: i32) -> (f64, f64) {
        Self::step_with(map, x, y, vx, vy, PLAYER_SPEED * tick_delta())
    }

    /// Move by `distance` tiles along each non-zero axis, then resolve walls.
    /// Axes resolve independently so a body can slide along a wall.
    pub fn step_with(map: &Map, x: f64, y: f64, vx: i32, vy: i32, distance: f64) -> (f64, f64) {
        let mut new_x = x + f64::from(vx) * distance;
        let mut new_y = y + f64::from(vy) * distance;

        let cell_x = new_x.floor();
        let cell_y = new_y.floor();
        let around = map.around(cell_x as i32, cell_y as i32);
        let straddles_y = new_y - cell_y > 0.0;

        if vx > 0 && (around.right.is_wall() || (straddles_y && around.bottom_right.is_wall())) {
            new_x = cell_x;
        }
        if vx < 0 && (around.tile.is_wall() || (straddles_y && around.bottom.is_wall())) {
            new_x = new_x.ceil();
        }

        // vertical checks sample from the resolved x so a blocked body can still slide
        let resolved_x = new_x.floor();
        let straddles_x = new_x - resolved_x > 0.0;
        let around = map.around(resolved_x as i32, cell_y as i32);
        if vy > 0 && (around.bottom.is_wall() || (straddles_x && around.bottom_right.is_wall())) {
            new_y = cell_y;
        }
        if vy < 0 && (around.tile.is_wall() || (straddles_x && around.right.is_wall())) {
            new_y = new_y.ceil();
        }

        (new_x, new_y)
    }

    /// Apply a key press (`delta` = +1/-1) or its release to one velocity axis
    pub fn nudge_axis(current: i32, delta: i32, pressed: bool) -> i32 {
        let next = if pressed { current + delta } else { current - delta };
        next.clamp(-1, 1)
    }
}
