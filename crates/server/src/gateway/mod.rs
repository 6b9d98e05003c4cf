//! Per-owner WebSocket fan-out.
//!
//! The [`ConnectionRegistry`] tracks every open socket by owner and runs one
//! event bus subscription per owner while that owner has connections.

mod registry;

pub use registry::{ConnectionId, ConnectionRegistry, RegisteredConnection};
