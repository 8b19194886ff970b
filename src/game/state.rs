//! Authoritative round state: map, team colors, scores and phase

use rand::Rng;

use super::grid::{Map, Tile, MAP_HEIGHT, MAP_WIDTH};
use super::mapgen::MapGenerator;
use super::GameError;

/// Display color for team A (0xRRGGBB)
pub const TEAM_A_COLOR: i32 = 0x6C946F;
/// Display color for team B (0xRRGGBB)
pub const TEAM_B_COLOR: i32 = 0xDC0083;

/// Session phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum GamePhase {
    #[default]
    WaitingForPlayers = 0,
    Playing = 1,
    GameOver = 2,
}

impl TryFrom<u8> for GamePhase {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(GamePhase::WaitingForPlayers),
            1 => Ok(GamePhase::Playing),
            2 => Ok(GamePhase::GameOver),
            other => Err(other),
        }
    }
}

/// Team identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TeamId {
    A = 0,
    B = 1,
}

impl TeamId {
    /// The tile a member of this team paints
    pub fn tile(self) -> Tile {
        match self {
            TeamId::A => Tile::TeamA,
            TeamId::B => Tile::TeamB,
        }
    }

    pub fn other(self) -> TeamId {
        match self {
            TeamId::A => TeamId::B,
            TeamId::B => TeamId::A,
        }
    }
}

impl TryFrom<u8> for TeamId {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(TeamId::A),
            1 => Ok(TeamId::B),
            other => Err(other),
        }
    }
}

/// A single painted cell, as pushed to clients in a `Shot` message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellPaint {
    pub x: i32,
    pub y: i32,
    pub tile: Tile,
}

/// Round state owned by a session
#[derive(Debug, Clone)]
pub struct GameState {
    pub map: Map,
    pub team_a_color: i32,
    pub team_b_color: i32,
    pub score_a: i32,
    pub score_b: i32,
    pub phase: GamePhase,
}

impl GameState {
    /// Fresh state around an already generated map
    pub fn with_map(map: Map) -> Self {
        Self {
            map,
            team_a_color: TEAM_A_COLOR,
            team_b_color: TEAM_B_COLOR,
            score_a: 0,
            score_b: 0,
            phase: GamePhase::WaitingForPlayers,
        }
    }

    /// Fresh state with a newly generated standard-size map
    pub fn generate<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self::with_map(MapGenerator::default().generate(MAP_WIDTH, MAP_HEIGHT, rng))
    }

    /// Claim a cell for `team`, moving the score from any previous owner.
    /// Walls (including everything off-grid) are rejected untouched.
    pub fn paint(&mut self, x: i32, y: i32, team: TeamId) -> Result<CellPaint, GameError> {
        let current = self.map.get(x, y);
        match current {
            Tile::Wall => return Err(GameError::PaintWall),
            Tile::TeamA => self.score_a -= 1,
            Tile::TeamB => self.score_b -= 1,
            Tile::Empty => {}
        }

        match team {
            TeamId::A => self.score_a += 1,
            TeamId::B => self.score_b += 1,
        }

        let tile = team.tile();
        self.map.set(x, y, tile);
        Ok(CellPaint { x, y, tile })
    }

    /// Invalidate the round: wipe paint and reset scores
    pub fn reset_round(&mut self) {
        self.map.clear();
        self.score_a = 0;
        self.score_b = 0;
        self.phase = GamePhase::WaitingForPlayers;
    }
}

impl Default for GameState {
    fn default() -> Self {
        Self::with_map(Map::default())
    }
}
