//! Four-letter room codes

use std::fmt;

use rand::Rng;

/// Length of a room code in bytes
pub const ROOM_CODE_LEN: usize = 4;

/// Uppercase ASCII room code, always exactly four bytes on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RoomCode([u8; ROOM_CODE_LEN]);

impl RoomCode {
    /// Draw a random code from `A..=Z`
    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let mut code = [0u8; ROOM_CODE_LEN];
        for byte in &mut code {
            *byte = rng.gen_range(b'A'..=b'Z');
        }
        Self(code)
    }

    /// Code as sent by a client; letters are upper-cased
    pub fn from_client(raw: [u8; ROOM_CODE_LEN]) -> Self {
        Self(raw.map(|b| b.to_ascii_uppercase()))
    }

    pub fn from_bytes(raw: [u8; ROOM_CODE_LEN]) -> Self {
        Self(raw)
    }

    pub fn as_bytes(&self) -> &[u8; ROOM_CODE_LEN] {
        &self.0
    }
}

impl fmt::Display for RoomCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(&self.0))
    }
}
