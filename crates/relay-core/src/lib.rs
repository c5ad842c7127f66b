//! relay-core
//!
//! Transport-independent fan-out logic:
//! - messages (opaque text / binary payloads)
//! - connection handles and the `FrameSink` write seam
//! - the connection registry
//! - the broadcast queue (many publishers, one consumer)
//! - the dispatcher loop and the per-connection reader loop

pub mod error;
pub mod message;
pub mod connection;
pub mod registry;
pub mod queue;
pub mod dispatcher;
pub mod reader;

#[cfg(test)]
mod testing;

pub use error::RelayError;
pub use message::{FrameKind, Message};
pub use connection::{Connection, ConnectionHandle, ConnectionId, FrameSink};
pub use registry::Registry;
pub use queue::{BroadcastQueue, Consumer, Publisher};
pub use dispatcher::{DispatchReport, Dispatcher, DEFAULT_WRITE_TIMEOUT};
pub use reader::{run_reader, ReaderExit};
