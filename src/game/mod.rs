//! Game simulation modules

pub mod grenade;
pub mod grid;
pub mod mapgen;
pub mod physics;
pub mod player;
pub mod registry;
pub mod room;
pub mod scheduler;
pub mod session;
pub mod snapshot;
pub mod state;
pub mod weapon;

pub use registry::SessionRegistry;
pub use session::GameSession;
pub use state::GamePhase;

/// Maximum players in one session
pub const MAX_PLAYERS: usize = 8;

/// Validation rejections surfaced to the requesting client as an `Error` message.
/// The display text is what the client sees.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GameError {
    #[error("game is full")]
    GameFull,

    #[error("game has already started")]
    AlreadyStarted,

    #[error("player not found")]
    PlayerNotFound,

    #[error("only the host can start the game")]
    NotHost,

    #[error("need at least 2 players to start the game")]
    NotEnoughPlayers,

    #[error("need at least one player on each team")]
    UnbalancedTeams,

    #[error("room not found")]
    RoomNotFound,

    #[error("you are already in a game")]
    AlreadyInGame,

    #[error("you are not in a game")]
    NotInGame,

    #[error("cannot paint wall")]
    PaintWall,

    #[error("invalid coordinates")]
    InvalidCoordinates,

    #[error("still cooling down")]
    CoolingDown,

    #[error("already charging")]
    AlreadyCharging,

    #[error("weapon is not charging")]
    NotCharging,
}

/// Failure of a single client command. Game errors are reported back to the
/// client; protocol errors end the connection.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CommandError {
    #[error(transparent)]
    Game(#[from] GameError),

    #[error(transparent)]
    Protocol(#[from] crate::ws::protocol::ProtocolError),
}
