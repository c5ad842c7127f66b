//! Status messages originated by the relay.
//!
//! Wire shape (JSON, text frame):
//!
//! ```text
//! {"type":"network_info","data":{"networkStatus":"connected","connections":1}}
//! ```

use relay_core::Message;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("message is not a text frame")]
    NotText,

    #[error("invalid status payload: {0}")]
    Json(#[from] serde_json::Error),
}

/// Reachability of the external dependency the probe watches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkStatus {
    Connected,
    Disconnected,
}

impl NetworkStatus {
    pub fn from_reachable(reachable: bool) -> Self {
        if reachable {
            NetworkStatus::Connected
        } else {
            NetworkStatus::Disconnected
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkInfo {
    pub network_status: NetworkStatus,
    /// Registry size when the report was built.
    pub connections: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum StatusMessage {
    NetworkInfo(NetworkInfo),
}

/// Serialize a status message into a text `Message`.
pub fn encode_status(status: &StatusMessage) -> Result<Message, ProtocolError> {
    Ok(Message::text(serde_json::to_string(status)?))
}

/// Parse a text `Message` as a status message.
pub fn decode_status(msg: &Message) -> Result<StatusMessage, ProtocolError> {
    let text = msg.as_text().ok_or(ProtocolError::NotText)?;
    Ok(serde_json::from_str(text)?)
}
