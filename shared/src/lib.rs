//! Restodash Shared Link Types
//!
//! This crate provides the connection state machine, the events posted to the
//! consumer, and the error taxonomy used by every role of the link manager.

pub mod state_machine;

use bytes::Bytes;
use std::fmt;
use thiserror::Error;

pub use state_machine::{accepts_inbound, next_state, ConnectionState, LinkTrigger};

/// Service record advertised by the listening endpoint
pub mod service {
    /// Name for the SDP record when creating the server endpoint
    pub const SERVICE_NAME: &str = "";

    /// UUID identifying this application's service
    pub const SERVICE_UUID: &str = "688c1706-fcb4-4856-be4b-f7d6f8465b6f";

    /// Default RFCOMM channel
    pub const DEFAULT_CHANNEL: u8 = 1;

    /// Size of the data pump's read buffer
    pub const READ_BUFFER_SIZE: usize = 1024;

    /// Message posted when an outbound connection attempt fails
    pub const DIAL_FAILED_MESSAGE: &str = "Unable to connect to device.";

    /// Message posted when an established connection drops
    pub const LINK_LOST_MESSAGE: &str = "Device connection was lost.";
}

/// Address and display name of a remote endpoint
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PeerIdentity {
    /// Transport address (Bluetooth MAC or socket address)
    pub address: String,
    /// Human-readable device name
    pub name: String,
}

impl PeerIdentity {
    pub fn new(address: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            name: name.into(),
        }
    }

    /// Identity for a peer whose name is unknown; the address doubles as name
    pub fn unnamed(address: impl Into<String>) -> Self {
        let address = address.into();
        Self {
            name: address.clone(),
            address,
        }
    }
}

impl fmt::Display for PeerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.name == self.address {
            write!(f, "{}", self.address)
        } else {
            write!(f, "{} ({})", self.name, self.address)
        }
    }
}

/// Notifications posted by the link manager to its consumer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// A peer is now connected
    DeviceName { name: String },
    /// A chunk arrived from the peer. Only the first `len` bytes are valid.
    DataReceived { data: Bytes, len: usize },
    /// Local echo of bytes written to the peer
    DataSent { data: Bytes },
    /// Something went wrong; the manager has already gone back to listening
    TransientError { message: String },
}

/// Failures caught at the role boundary
#[derive(Error, Debug)]
pub enum LinkError {
    #[error("Listening endpoint could not be created: {0}")]
    Bind(String),

    #[error("Accept failed: {0}")]
    Accept(String),

    #[error("Outbound connection to {peer} failed: {reason}")]
    Dial { peer: String, reason: String },

    #[error("Link lost: {0}")]
    LinkLost(String),

    #[error("Write failed: {0}")]
    Write(String),
}

impl LinkError {
    /// Message shown to the consumer for failures that reach it
    pub fn user_message(&self) -> &'static str {
        match self {
            LinkError::Dial { .. } => service::DIAL_FAILED_MESSAGE,
            LinkError::LinkLost(_) => service::LINK_LOST_MESSAGE,
            LinkError::Bind(_) | LinkError::Accept(_) | LinkError::Write(_) => {
                "Bluetooth link error."
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peer_display() {
        let peer = PeerIdentity::new("00:11:22:33:44:55", "Dash");
        assert_eq!(peer.to_string(), "Dash (00:11:22:33:44:55)");

        let unnamed = PeerIdentity::unnamed("127.0.0.1:9000");
        assert_eq!(unnamed.name, "127.0.0.1:9000");
        assert_eq!(unnamed.to_string(), "127.0.0.1:9000");
    }

    #[test]
    fn test_user_messages() {
        let dial = LinkError::Dial {
            peer: "Dash".into(),
            reason: "refused".into(),
        };
        assert_eq!(dial.user_message(), "Unable to connect to device.");
        assert_eq!(
            LinkError::LinkLost("eof".into()).user_message(),
            "Device connection was lost."
        );
        assert!(dial.to_string().contains("refused"));
    }
}
