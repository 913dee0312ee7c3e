//! Connection State Machine
//!
//! Defines the link states and the transition taken for each trigger.

use std::fmt;

/// Current state of the link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// Nothing happening
    #[default]
    None,
    /// Listening for an incoming connection
    Listening,
    /// Initiating an outgoing connection
    Connecting,
    /// Connected to a remote device
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "None"),
            Self::Listening => write!(f, "Listening"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Connected => write!(f, "Connected"),
        }
    }
}

/// Triggers that move the link between states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkTrigger {
    /// Caller asked the manager to listen
    Start,
    /// Caller asked the manager to dial a peer
    Connect,
    /// The listener obtained an inbound socket
    Accepted,
    /// The dialer's outbound connect completed
    DialSucceeded,
    /// The dialer's outbound connect failed
    DialFailed,
    /// The data pump observed a read failure or end of stream
    LinkLost,
    /// Caller asked the manager to stop everything
    Stop,
}

/// Whether an inbound socket obtained in `state` may be promoted.
///
/// Sockets accepted while idle or already connected are closed instead.
pub fn accepts_inbound(state: ConnectionState) -> bool {
    matches!(
        state,
        ConnectionState::Listening | ConnectionState::Connecting
    )
}

/// State reached from `current` when `trigger` fires
pub fn next_state(current: ConnectionState, trigger: LinkTrigger) -> ConnectionState {
    use ConnectionState::*;
    use LinkTrigger::*;

    match trigger {
        Start => Listening,
        Connect => Connecting,

        // Inbound sockets are only promoted while listening or dialing
        Accepted if accepts_inbound(current) => Connected,
        Accepted => current,

        // A completed dial is always promoted
        DialSucceeded => Connected,

        // Failures drop to None; the manager re-arms listening right after
        DialFailed | LinkLost => None,

        Stop => None,
    }
}
