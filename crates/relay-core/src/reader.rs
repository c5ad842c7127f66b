//! Per-connection reader loop.
//!
//! One reader per connection, for the connection's whole lifetime. It is
//! the only owner of the read side of the transport. It never retries:
//! the first read failure (or end of stream) ends it, and on the way out
//! the connection is deregistered and closed.

use std::sync::Arc;
use std::time::Duration;

use futures::{Stream, StreamExt};
use tracing::{debug, info, warn};

use crate::connection::{ConnectionHandle, ConnectionId};
use crate::error::RelayError;
use crate::message::Message;
use crate::queue::Publisher;
use crate::registry::Registry;

/// Why a reader stopped.
#[derive(Debug)]
pub enum ReaderExit {
    /// The inbound stream ended or the peer sent a close frame.
    PeerClosed,
    /// A read failed (transport or protocol error, or idle timeout).
    ReadFailed(RelayError),
    /// The dispatcher is gone; nothing more can be broadcast.
    QueueClosed,
}

/// Removes the connection from the registry when dropped, so it happens
/// on every exit path, including unwinding.
struct Deregister {
    registry: Arc<Registry>,
    id: ConnectionId,
}

impl Drop for Deregister {
    fn drop(&mut self) {
        self.registry.remove(self.id);
    }
}

/// Read frames until the connection fails, publishing each one.
///
/// `idle_timeout`, when set, bounds the wait for each frame; expiry is
/// handled like any other read failure.
pub async fn run_reader<S>(
    conn: ConnectionHandle,
    mut frames: S,
    registry: Arc<Registry>,
    publisher: Publisher,
    idle_timeout: Option<Duration>,
) -> ReaderExit
where
    S: Stream<Item = Result<Message, RelayError>> + Unpin,
{
    let guard = Deregister {
        registry,
        id: conn.id(),
    };

    let exit = loop {
        // A close from elsewhere (the dispatcher after a failed write) ends
        // the reader even if the peer never sends another frame.
        let next = tokio::select! {
            _ = conn.closed() => Err(RelayError::Closed),
            next = next_frame(&mut frames, idle_timeout) => next,
        };

        match next {
            Ok(Some(Ok(msg))) => {
                match msg.as_text() {
                    Some(text) => debug!(conn = %conn.id(), "received message: {}", text),
                    None => debug!(conn = %conn.id(), bytes = msg.len(), "received binary message"),
                }
                if publisher.publish(msg).await.is_err() {
                    break ReaderExit::QueueClosed;
                }
            }
            Ok(Some(Err(RelayError::PeerClosed))) | Ok(None) => break ReaderExit::PeerClosed,
            Ok(Some(Err(e))) | Err(e) => break ReaderExit::ReadFailed(e),
        }
    };

    match &exit {
        ReaderExit::PeerClosed => info!(conn = %conn.id(), "connection closed by peer"),
        ReaderExit::ReadFailed(RelayError::Closed) => {
            info!(conn = %conn.id(), "connection closed locally")
        }
        ReaderExit::ReadFailed(e) => warn!(conn = %conn.id(), error = %e, "read error"),
        ReaderExit::QueueClosed => warn!(conn = %conn.id(), "broadcast queue closed"),
    }

    drop(guard);
    conn.close().await;
    exit
}

/// Next inbound frame; `Err` only when the idle timeout expires.
async fn next_frame<S>(
    frames: &mut S,
    idle_timeout: Option<Duration>,
) -> Result<Option<Result<Message, RelayError>>, RelayError>
where
    S: Stream<Item = Result<Message, RelayError>> + Unpin,
{
    match idle_timeout {
        Some(limit) => tokio::time::timeout(limit, frames.next())
            .await
            .map_err(|_| RelayError::Timeout(limit)),
        None => Ok(frames.next().await),
    }
}

#[cfg(test)]
mod tests {
    use futures::stream;

    use super::*;
    use crate::connection::Connection;
    use crate::dispatcher::{DispatchReport, Dispatcher};
    use crate::queue::BroadcastQueue;
    use crate::testing::{channel_sink, FailingSink};

    fn registered(registry: &Registry) -> ConnectionHandle {
        let (sink, _rx, _closed) = channel_sink();
        let conn = Connection::new(sink, None);
        registry.add(Arc::clone(&conn));
        conn
    }

    #[tokio::test]
    async fn publishes_frames_then_deregisters_on_end() {
        let registry = Arc::new(Registry::new());
        let (publisher, mut consumer) = BroadcastQueue::unbounded();
        let conn = registered(&registry);

        let frames = stream::iter(vec![
            Ok(Message::text("hello")),
            Ok(Message::binary(vec![7u8, 8])),
        ]);
        let exit = run_reader(Arc::clone(&conn), frames, Arc::clone(&registry), publisher, None).await;

        assert!(matches!(exit, ReaderExit::PeerClosed));
        assert_eq!(consumer.consume().await, Some(Message::text("hello")));
        assert_eq!(consumer.consume().await, Some(Message::binary(vec![7u8, 8])));
        assert!(!registry.contains(conn.id()));
        assert!(!conn.is_open());
    }

    #[tokio::test]
    async fn read_error_stops_without_retry() {
        let registry = Arc::new(Registry::new());
        let (publisher, mut consumer) = BroadcastQueue::unbounded();
        let conn = registered(&registry);

        let frames = stream::iter(vec![
            Ok(Message::text("before")),
            Err(RelayError::transport("connection reset")),
            Ok(Message::text("after")),
        ]);
        let exit = run_reader(Arc::clone(&conn), frames, Arc::clone(&registry), publisher, None).await;

        assert!(matches!(exit, ReaderExit::ReadFailed(RelayError::Transport(_))));
        assert_eq!(consumer.consume().await, Some(Message::text("before")));
        assert_eq!(consumer.consume().await, None, "nothing read after the failure");
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn close_frame_ends_reader() {
        let registry = Arc::new(Registry::new());
        let (publisher, _consumer) = BroadcastQueue::unbounded();
        let conn = registered(&registry);

        let frames = stream::iter(vec![Err(RelayError::PeerClosed)]);
        let exit = run_reader(conn, frames, Arc::clone(&registry), publisher, None).await;

        assert!(matches!(exit, ReaderExit::PeerClosed));
        assert!(registry.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn idle_timeout_counts_as_read_failure() {
        let registry = Arc::new(Registry::new());
        let (publisher, _consumer) = BroadcastQueue::unbounded();
        let conn = registered(&registry);

        let frames = stream::pending::<Result<Message, RelayError>>();
        let exit = run_reader(
            Arc::clone(&conn),
            frames,
            Arc::clone(&registry),
            publisher,
            Some(Duration::from_secs(30)),
        )
        .await;

        assert!(matches!(exit, ReaderExit::ReadFailed(RelayError::Timeout(_))));
        assert!(!registry.contains(conn.id()));
    }

    #[tokio::test]
    async fn closed_queue_ends_reader() {
        let registry = Arc::new(Registry::new());
        let (publisher, consumer) = BroadcastQueue::unbounded();
        drop(consumer);
        let conn = registered(&registry);

        let frames = stream::iter(vec![Ok(Message::text("orphan"))]);
        let exit = run_reader(conn, frames, Arc::clone(&registry), publisher, None).await;

        assert!(matches!(exit, ReaderExit::QueueClosed));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn failed_dispatch_ends_reader_of_silent_peer() {
        let registry = Arc::new(Registry::new());
        let (publisher, consumer) = BroadcastQueue::unbounded();
        let conn = Connection::new(FailingSink, None);
        registry.add(Arc::clone(&conn));

        // The peer never sends anything and there is no idle timeout.
        let reader = tokio::spawn(run_reader(
            Arc::clone(&conn),
            stream::pending::<Result<Message, RelayError>>(),
            Arc::clone(&registry),
            publisher,
            None,
        ));

        let dispatcher = Dispatcher::new(consumer, Arc::clone(&registry));
        let report = dispatcher.dispatch(&Message::text("x")).await;
        assert_eq!(report, DispatchReport { delivered: 0, failed: 1 });

        let exit = tokio::time::timeout(Duration::from_secs(2), reader)
            .await
            .expect("reader still running after its connection was closed")
            .unwrap();
        assert!(matches!(exit, ReaderExit::ReadFailed(RelayError::Closed)));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn reader_of_already_closed_connection_exits() {
        let registry = Arc::new(Registry::new());
        let (publisher, _consumer) = BroadcastQueue::unbounded();
        let conn = registered(&registry);
        conn.close().await;

        let exit = run_reader(
            Arc::clone(&conn),
            stream::pending::<Result<Message, RelayError>>(),
            Arc::clone(&registry),
            publisher,
            None,
        )
        .await;

        assert!(matches!(exit, ReaderExit::ReadFailed(RelayError::Closed)));
        assert!(!registry.contains(conn.id()));
    }
}
