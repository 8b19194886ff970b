//! Connected users and their outbound frame channels

use std::fmt;
use std::sync::atomic::{AtomicI16, Ordering};

use bytes::Bytes;
use dashmap::DashMap;
use rand::Rng;
use tokio::sync::mpsc;
use tracing::debug;

/// Per-connection user id, sent on the wire as an int16
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UserId(pub i16);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A live connection as seen by the game
#[derive(Debug, Clone)]
pub struct UserHandle {
    pub display_name: String,
    outbound: mpsc::UnboundedSender<Bytes>,
}

/// Table of connected users. Players refer to users by id only and
/// re-resolve on every use, so a disconnected user simply stops resolving.
pub struct UserDirectory {
    users: DashMap<UserId, UserHandle>,
    next_id: AtomicI16,
}

impl UserDirectory {
    pub fn new() -> Self {
        Self {
            users: DashMap::new(),
            next_id: AtomicI16::new(1),
        }
    }

    /// Register a connection; frames queued for it arrive on the returned receiver
    pub fn register(&self, display_name: String) -> (UserId, mpsc::UnboundedReceiver<Bytes>) {
        let (outbound, rx) = mpsc::unbounded_channel();
        loop {
            let id = UserId(self.next_id.fetch_add(1, Ordering::Relaxed));
            if id.0 <= 0 {
                continue;
            }
            if let dashmap::mapref::entry::Entry::Vacant(slot) = self.users.entry(id) {
                slot.insert(UserHandle {
                    display_name,
                    outbound,
                });
                return (id, rx);
            }
        }
    }

    pub fn unregister(&self, id: UserId) -> Option<UserHandle> {
        self.users.remove(&id).map(|(_, handle)| handle)
    }

    pub fn display_name(&self, id: UserId) -> Option<String> {
        self.users.get(&id).map(|u| u.display_name.clone())
    }

    /// Queue a frame for a user. Returns false if the user is gone.
    pub fn send(&self, id: UserId, frame: Bytes) -> bool {
        let Some(user) = self.users.get(&id) else {
            debug!(user_id = %id, "Dropping frame for unknown user");
            return false;
        };
        user.outbound.send(frame).is_ok()
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }
}

impl Default for UserDirectory {
    fn default() -> Self {
        Self::new()
    }
}

const ADJECTIVES: &[&str] = &[
    "Fiery", "Icy", "Electric", "Magnetic", "Toxic", "Radioactive", "Mystic", "Dark", "Light",
    "Wind", "Water", "Earth", "Fire",
];
const BIRDS: &[&str] = &[
    "Chicken", "Duck", "Geese", "Pigeon", "Eagle", "Falcon", "Hawk", "Owl", "Parrot", "Penguin",
    "Robin", "Sparrow", "Swan", "Turkey",
];

/// Generate a display name such as "The Icy Falcon"
pub fn random_display_name<R: Rng + ?Sized>(rng: &mut R) -> String {
    let adjective = ADJECTIVES[rng.gen_range(0..ADJECTIVES.len())];
    let bird = BIRDS[rng.gen_range(0..BIRDS.len())];
    format!("The {adjective} {bird}")
}
