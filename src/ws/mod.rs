//! WebSocket layer: live registration feed.
//!
//! The endpoint at `/ws` lets clients subscribe to event ids and receive
//! every committed registration change for those events as it happens.

pub mod connection;
pub mod handler;
pub mod messages;
pub mod subscription;
