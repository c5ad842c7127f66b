//! Per-connection handling for upgraded WebSocket sockets.
//!
//! Splits the socket: the write half becomes the connection's
//! `FrameSink` (used by the dispatcher), the read half feeds the
//! connection's reader loop, which runs on the upgrade task itself.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::ws::{Message as WsMessage, Utf8Bytes, WebSocket};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, Stream, StreamExt};
use relay_core::{run_reader, Connection, FrameKind, FrameSink, Message, RelayError};
use tracing::{info, warn};

use crate::server::AppState;

/// Write half of an axum WebSocket.
struct WsSink(SplitSink<WebSocket, WsMessage>);

#[async_trait]
impl FrameSink for WsSink {
    async fn send(&mut self, msg: Message) -> Result<(), RelayError> {
        self.0.send(to_ws_frame(msg)).await.map_err(RelayError::transport)
    }

    async fn close(&mut self) -> Result<(), RelayError> {
        self.0.close().await.map_err(RelayError::transport)
    }
}

/// Outbound frame kind follows the message kind. The frame shares the
/// message's buffer; nothing is copied per recipient.
fn to_ws_frame(msg: Message) -> WsMessage {
    match msg.kind() {
        FrameKind::Text => match Utf8Bytes::try_from(msg.payload().clone()) {
            Ok(text) => WsMessage::Text(text),
            Err(_) => WsMessage::Binary(msg.into_payload()),
        },
        FrameKind::Binary => WsMessage::Binary(msg.into_payload()),
    }
}

/// Map inbound WebSocket frames to relay messages. Ping/pong are
/// answered by the transport and never published.
fn inbound_frames(
    stream: SplitStream<WebSocket>,
) -> impl Stream<Item = Result<Message, RelayError>> + Unpin {
    Box::pin(stream.filter_map(|frame| async move {
        match frame {
            Ok(WsMessage::Text(text)) => Some(Ok(Message::text(text.as_str()))),
            Ok(WsMessage::Binary(data)) => Some(Ok(Message::binary(data))),
            Ok(WsMessage::Ping(_)) | Ok(WsMessage::Pong(_)) => None,
            Ok(WsMessage::Close(_)) => Some(Err(RelayError::PeerClosed)),
            Err(e) => Some(Err(RelayError::transport(e))),
        }
    }))
}

/// Register an upgraded socket and read from it until it fails.
pub async fn handle_socket(socket: WebSocket, peer: SocketAddr, state: AppState) {
    let (ws_tx, ws_rx) = socket.split();
    let conn = Connection::new(WsSink(ws_tx), Some(peer));

    if !state.registry.try_add(Arc::clone(&conn), state.max_clients) {
        warn!(
            %peer,
            max_clients = state.max_clients,
            "Rejecting connection: max_clients reached"
        );
        conn.close().await;
        return;
    }
    info!(conn = %conn.id(), %peer, "WebSocket connection established");

    let exit = run_reader(
        Arc::clone(&conn),
        inbound_frames(ws_rx),
        Arc::clone(&state.registry),
        state.publisher.clone(),
        state.idle_timeout,
    )
    .await;

    info!(conn = %conn.id(), reason = ?exit, "WebSocket connection closed");
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;

    #[test]
    fn text_message_becomes_text_frame() {
        match to_ws_frame(Message::text("hello")) {
            WsMessage::Text(text) => assert_eq!(text.as_str(), "hello"),
            other => panic!("unexpected frame {other:?}"),
        }
    }

    #[test]
    fn text_frame_shares_message_buffer() {
        let msg = Message::text("fan me out");
        let payload_ptr = msg.payload().as_ptr();

        for _ in 0..3 {
            match to_ws_frame(msg.clone()) {
                WsMessage::Text(text) => assert_eq!(text.as_str().as_ptr(), payload_ptr),
                other => panic!("unexpected frame {other:?}"),
            }
        }
    }

    #[test]
    fn binary_message_becomes_binary_frame() {
        match to_ws_frame(Message::binary(Bytes::from_static(&[0, 159, 146, 150]))) {
            WsMessage::Binary(data) => assert_eq!(data.as_ref(), &[0, 159, 146, 150]),
            other => panic!("unexpected frame {other:?}"),
        }
    }
}
