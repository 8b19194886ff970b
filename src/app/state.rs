//! Application state shared across routes

use std::sync::Arc;

use crate::config::Config;
use crate::game::SessionRegistry;
use crate::ws::dispatch::Dispatcher;

use super::users::UserDirectory;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub users: Arc<UserDirectory>,
    pub registry: Arc<SessionRegistry>,
    pub dispatcher: Dispatcher,
}

impl AppState {
    pub fn new(config: &Config) -> Self {
        // Connected users, shared by every session for outbound frames
        let users = Arc::new(UserDirectory::new());

        // Session registry (ticked by the scheduler spawned in main)
        let registry = Arc::new(SessionRegistry::new(users.clone(), config.round_duration));

        let dispatcher = Dispatcher::new(registry.clone(), users.clone());

        Self {
            users,
            registry,
            dispatcher,
        }
    }
}
