//! Broadcast message type.
//!
//! The relay imposes no structure on payloads. A `Message` is just the
//! producer's bytes plus the frame kind they arrived in, so every
//! recipient gets an exact copy in the same kind of frame.

use bytes::Bytes;

/// Which kind of frame a payload travels in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameKind {
    Text,
    Binary,
}

/// An immutable payload. Cloning shares the underlying buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    kind: FrameKind,
    payload: Bytes,
}

impl Message {
    /// A text message. The payload is valid UTF-8 by construction.
    pub fn text(text: impl Into<String>) -> Self {
        Message {
            kind: FrameKind::Text,
            payload: Bytes::from(text.into()),
        }
    }

    pub fn binary(payload: impl Into<Bytes>) -> Self {
        Message {
            kind: FrameKind::Binary,
            payload: payload.into(),
        }
    }

    pub fn kind(&self) -> FrameKind {
        self.kind
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Borrow the payload as text, if this is a text message.
    pub fn as_text(&self) -> Option<&str> {
        match self.kind {
            FrameKind::Text => std::str::from_utf8(&self.payload).ok(),
            FrameKind::Binary => None,
        }
    }

    pub fn into_payload(self) -> Bytes {
        self.payload
    }
}
