//! Connection handles.
//!
//! A `Connection` wraps the write side of one peer's transport. The read
//! side is owned by that connection's reader task and never stored here.
//! Both the reader and the dispatcher may close a connection; whoever
//! notices a failure first does it, later calls are no-ops. Closing also
//! wakes anyone waiting in [`Connection::closed`], so a reader blocked on
//! a silent peer exits as soon as the dispatcher gives up on it.

use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{watch, Mutex};
use tracing::debug;

use crate::error::RelayError;
use crate::message::Message;

/// Upper bound on flushing a close frame to a peer that stopped reading.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Counter for assigning unique `ConnectionId`s.
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Identifier for a connection, unique over the lifetime of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

impl ConnectionId {
    pub fn next() -> Self {
        ConnectionId(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Write half of a transport.
#[async_trait]
pub trait FrameSink: Send {
    async fn send(&mut self, msg: Message) -> Result<(), RelayError>;

    /// Send a close frame (if the transport has one) and flush.
    async fn close(&mut self) -> Result<(), RelayError>;
}

pub type ConnectionHandle = Arc<Connection>;

pub struct Connection {
    id: ConnectionId,
    peer: Option<SocketAddr>,
    sink: Mutex<Box<dyn FrameSink>>,
    open: AtomicBool,
    closed_tx: watch::Sender<bool>,
}

impl Connection {
    pub fn new<S>(sink: S, peer: Option<SocketAddr>) -> ConnectionHandle
    where
        S: FrameSink + 'static,
    {
        Arc::new(Connection {
            id: ConnectionId::next(),
            peer,
            sink: Mutex::new(Box::new(sink)),
            open: AtomicBool::new(true),
            closed_tx: watch::channel(false).0,
        })
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// Write one message. Only one write runs at a time per connection.
    pub async fn send(&self, msg: Message) -> Result<(), RelayError> {
        if !self.is_open() {
            return Err(RelayError::Closed);
        }
        let mut sink = self.sink.lock().await;
        // Closed while we waited for the lock.
        if !self.is_open() {
            return Err(RelayError::Closed);
        }
        sink.send(msg).await
    }

    /// Mark the connection closed and send a close frame. Idempotent.
    pub async fn close(&self) {
        if !self.open.swap(false, Ordering::AcqRel) {
            return;
        }
        // Wake waiters before flushing; the flush may take up to CLOSE_TIMEOUT.
        self.closed_tx.send_replace(true);
        let mut sink = self.sink.lock().await;
        match tokio::time::timeout(CLOSE_TIMEOUT, sink.close()).await {
            Ok(Ok(())) => debug!(conn = %self.id, "connection closed"),
            Ok(Err(e)) => debug!(conn = %self.id, error = %e, "close frame not delivered"),
            Err(_) => debug!(conn = %self.id, "close timed out"),
        }
    }

    /// Resolves once the connection has been closed, immediately if it
    /// already is.
    pub async fn closed(&self) {
        let mut rx = self.closed_tx.subscribe();
        // The sender lives as long as `self`, so this cannot fail.
        let _ = rx.wait_for(|closed| *closed).await;
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("peer", &self.peer)
            .field("open", &self.is_open())
            .finish()
    }
}
