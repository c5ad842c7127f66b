//! relay-protocol
//!
//! Every broadcast payload is opaque to the relay except the status
//! messages it originates itself. This crate defines those and turns
//! them into core `Message`s and back.
//!
//! - [`status`] : `network_info` health reports

pub mod status;

pub use status::{
    decode_status,
    encode_status,
    NetworkInfo,
    NetworkStatus,
    ProtocolError,
    StatusMessage,
};
