//! Tile grid - flat row-major storage with out-of-bounds-as-wall reads

/// Map width in tiles
pub const MAP_WIDTH: usize = 48;
/// Map height in tiles
pub const MAP_HEIGHT: usize = 27;

/// State of a single grid cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum Tile {
    #[default]
    Empty = 0,
    TeamA = 1,
    TeamB = 2,
    Wall = 3,
}

impl Tile {
    pub fn is_wall(self) -> bool {
        self == Tile::Wall
    }
}

impl TryFrom<u8> for Tile {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Tile::Empty),
            1 => Ok(Tile::TeamA),
            2 => Ok(Tile::TeamB),
            3 => Ok(Tile::Wall),
            other => Err(other),
        }
    }
}

/// The four cells sampled around a position for collision checks
#[derive(Debug, Clone, Copy)]
pub struct Neighborhood {
    pub tile: Tile,
    pub bottom: Tile,
    pub right: Tile,
    pub bottom_right: Tile,
}

/// Rectangular tile grid. `tiles.len() == width * height` always holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Map {
    width: usize,
    height: usize,
    tiles: Vec<Tile>,
}

impl Map {
    /// Create an all-empty map
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            tiles: vec![Tile::Empty; width * height],
        }
    }

    /// Rebuild a map from raw tiles; `None` if the length does not match
    pub fn from_tiles(width: usize, height: usize, tiles: Vec<Tile>) -> Option<Self> {
        (tiles.len() == width * height).then_some(Self {
            width,
            height,
            tiles,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn tiles(&self) -> &[Tile] {
        &self.tiles
    }

    fn index(&self, x: i32, y: i32) -> Option<usize> {
        if x < 0 || y < 0 {
            return None;
        }
        let (x, y) = (x as usize, y as usize);
        (x < self.width && y < self.height).then(|| y * self.width + x)
    }

    /// Read a cell; anything outside the grid reads as a wall
    pub fn get(&self, x: i32, y: i32) -> Tile {
        self.index(x, y).map_or(Tile::Wall, |i| self.tiles[i])
    }

    /// Write a cell; writes outside the grid are ignored
    pub fn set(&mut self, x: i32, y: i32, tile: Tile) {
        if let Some(i) = self.index(x, y) {
            self.tiles[i] = tile;
        }
    }

    /// Sample the cell at (x, y) plus the cells below, right and diagonal
    pub fn around(&self, x: i32, y: i32) -> Neighborhood {
        Neighborhood {
            tile: self.get(x, y),
            bottom: self.get(x, y + 1),
            right: self.get(x + 1, y),
            bottom_right: self.get(x + 1, y + 1),
        }
    }

    /// Reset every painted cell to empty, leaving walls in place
    pub fn clear(&mut self) {
        for tile in self.tiles.iter_mut().filter(|t| !t.is_wall()) {
            *tile = Tile::Empty;
        }
    }

    pub fn count(&self, tile: Tile) -> usize {
        self.tiles.iter().filter(|t| **t == tile).count()
    }
}

impl Default for Map {
    fn default() -> Self {
        Self::new(MAP_WIDTH, MAP_HEIGHT)
    }
}
