//! Application state and the connected-user table

pub mod state;
pub mod users;

pub use state::AppState;
