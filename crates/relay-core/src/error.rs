//! Error types for the relay core.
//!
//! None of these are fatal to the process: readers and the dispatcher
//! contain every failure at the connection that produced it.

use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RelayError {
    /// The connection was already closed locally.
    #[error("connection closed")]
    Closed,

    /// The peer sent a close frame.
    #[error("peer closed the connection")]
    PeerClosed,

    /// A read or write did not complete in time.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// Underlying transport failure (I/O, protocol violation, ...).
    #[error("transport error: {0}")]
    Transport(String),

    /// The dispatcher side of the broadcast queue is gone.
    #[error("broadcast queue closed")]
    QueueClosed,
}

impl RelayError {
    pub fn transport<E: std::fmt::Display>(err: E) -> Self {
        RelayError::Transport(err.to_string())
    }
}
