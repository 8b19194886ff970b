//! WebSocket transport and the binary wire protocol

pub mod dispatch;
pub mod handler;
pub mod protocol;
