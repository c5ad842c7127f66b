//! relay-server
//!
//! WebSocket fan-out relay: every message received on `/ws` is
//! rebroadcast to all connected clients.

pub mod config;
pub mod probe;
pub mod server;

// internal, not re-exported
mod client;

pub use config::Config;
pub use server::{start, run, ServerHandle};
