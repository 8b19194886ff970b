//! Procedural wall layout via recursive binary space partition

use rand::Rng;

use super::grid::{Map, Tile};

/// Number of recursive splits applied to a fresh map
pub const MAP_DIVISIONS: u32 = 6;
/// Cells kept clear between a wall and the edge of its sub-rectangle
pub const ROOM_PADDING: i32 = 2;

/// Inclusive cell rectangle
#[derive(Debug, Clone, Copy)]
struct Region {
    x1: i32,
    y1: i32,
    x2: i32,
    y2: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Axis {
    Horizontal,
    Vertical,
}

/// Recursive wall carver
#[derive(Debug, Clone, Copy)]
pub struct MapGenerator {
    divisions: u32,
    padding: i32,
}

impl MapGenerator {
    pub fn new(divisions: u32, padding: i32) -> Self {
        Self { divisions, padding }
    }

    /// Produce a fresh map of the given size with walls carved in
    pub fn generate<R: Rng + ?Sized>(&self, width: usize, height: usize, rng: &mut R) -> Map {
        let mut map = Map::new(width, height);
        self.carve(&mut map, rng);
        map
    }

    /// Carve walls into an existing map
    pub fn carve<R: Rng + ?Sized>(&self, map: &mut Map, rng: &mut R) {
        let root = Region {
            x1: 0,
            y1: 0,
            x2: map.width() as i32 - 1,
            y2: map.height() as i32 - 1,
        };
        self.split(map, root, self.divisions, rng);
    }

    fn split<R: Rng + ?Sized>(&self, map: &mut Map, region: Region, divisions: u32, rng: &mut R) {
        if divisions == 0 {
            return;
        }

        let min_span = 2 * self.padding + 1;
        if region.x2 - region.x1 < min_span || region.y2 - region.y1 < min_span {
            return;
        }

        let axis = if rng.gen_bool(0.5) {
            Axis::Horizontal
        } else {
            Axis::Vertical
        };

        let p = self.padding;
        match axis {
            Axis::Horizontal => {
                let row = rng.gen_range(region.y1 + p..=region.y2 - p);
                for x in region.x1 + p..=region.x2 - p {
                    map.set(x, row, Tile::Wall);
                }
                self.split(map, Region { y2: row - 1, ..region }, divisions - 1, rng);
                self.split(map, Region { y1: row + 1, ..region }, divisions - 1, rng);
            }
            Axis::Vertical => {
                let col = rng.gen_range(region.x1 + p..=region.x2 - p);
                for y in region.y1 + p..=region.y2 - p {
                    map.set(col, y, Tile::Wall);
                }
                self.split(map, Region { x2: col - 1, ..region }, divisions - 1, rng);
                self.split(map, Region { x1: col + 1, ..region }, divisions - 1, rng);
            }
        }
    }
}

impl Default for MapGenerator {
    fn default() -> Self {
        Self::new(MAP_DIVISIONS, ROOM_PADDING)
    }
}
