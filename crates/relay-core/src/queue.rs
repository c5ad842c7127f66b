//! Broadcast queue: the single ordered channel between producers
//! (connection readers, the health probe) and the dispatcher.
//!
//! The unbounded queue never blocks a publisher. The bounded queue makes
//! `publish` wait for free capacity, so a slow dispatcher backpressures
//! every reader.

use tokio::sync::mpsc;

use crate::error::RelayError;
use crate::message::Message;

pub struct BroadcastQueue;

impl BroadcastQueue {
    pub fn unbounded() -> (Publisher, Consumer) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Publisher {
                tx: PublisherTx::Unbounded(tx),
            },
            Consumer {
                rx: ConsumerRx::Unbounded(rx),
            },
        )
    }

    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn bounded(capacity: usize) -> (Publisher, Consumer) {
        let (tx, rx) = mpsc::channel(capacity);
        (
            Publisher {
                tx: PublisherTx::Bounded(tx),
            },
            Consumer {
                rx: ConsumerRx::Bounded(rx),
            },
        )
    }
}

#[derive(Clone)]
enum PublisherTx {
    Unbounded(mpsc::UnboundedSender<Message>),
    Bounded(mpsc::Sender<Message>),
}

/// Producer side. Cheap to clone; one per reader.
#[derive(Clone)]
pub struct Publisher {
    tx: PublisherTx,
}

impl Publisher {
    /// Enqueue a message. Once this returns `Ok` the message will be
    /// handed to the consumer.
    pub async fn publish(&self, msg: Message) -> Result<(), RelayError> {
        match &self.tx {
            PublisherTx::Unbounded(tx) => tx.send(msg).map_err(|_| RelayError::QueueClosed),
            PublisherTx::Bounded(tx) => tx.send(msg).await.map_err(|_| RelayError::QueueClosed),
        }
    }

    pub fn is_closed(&self) -> bool {
        match &self.tx {
            PublisherTx::Unbounded(tx) => tx.is_closed(),
            PublisherTx::Bounded(tx) => tx.is_closed(),
        }
    }
}

enum ConsumerRx {
    Unbounded(mpsc::UnboundedReceiver<Message>),
    Bounded(mpsc::Receiver<Message>),
}

/// Consumer side. Not `Clone`: the dispatcher is the only consumer.
pub struct Consumer {
    rx: ConsumerRx,
}

impl Consumer {
    /// Wait for the next message. `None` once every publisher is gone
    /// and the queue is drained.
    pub async fn consume(&mut self) -> Option<Message> {
        match &mut self.rx {
            ConsumerRx::Unbounded(rx) => rx.recv().await,
            ConsumerRx::Bounded(rx) => rx.recv().await,
        }
    }
}
