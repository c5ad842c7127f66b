//! In-memory `FrameSink` doubles for unit tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::connection::FrameSink;
use crate::error::RelayError;
use crate::message::Message;

/// Forwards every written message into a channel.
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<Message>,
    closed: Arc<AtomicBool>,
}

pub fn channel_sink() -> (ChannelSink, mpsc::UnboundedReceiver<Message>, Arc<AtomicBool>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let closed = Arc::new(AtomicBool::new(false));
    (
        ChannelSink {
            tx,
            closed: Arc::clone(&closed),
        },
        rx,
        closed,
    )
}

#[async_trait]
impl FrameSink for ChannelSink {
    async fn send(&mut self, msg: Message) -> Result<(), RelayError> {
        self.tx.send(msg).map_err(|_| RelayError::transport("receiver dropped"))
    }

    async fn close(&mut self) -> Result<(), RelayError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Every write fails, as if the peer vanished.
pub struct FailingSink;

#[async_trait]
impl FrameSink for FailingSink {
    async fn send(&mut self, _msg: Message) -> Result<(), RelayError> {
        Err(RelayError::transport("broken pipe"))
    }

    async fn close(&mut self) -> Result<(), RelayError> {
        Err(RelayError::transport("broken pipe"))
    }
}

/// Writes never complete, as if the peer stopped reading.
pub struct StalledSink;

#[async_trait]
impl FrameSink for StalledSink {
    async fn send(&mut self, _msg: Message) -> Result<(), RelayError> {
        std::future::pending::<()>().await;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), RelayError> {
        Ok(())
    }
}
