//! The connection state machine, as a pure function.
//!
//! Nothing in here touches channels, tasks or observers. The orchestrator
//! asks [`transition`] what the next state is and does the side effects
//! itself, so every rule below can be tested without a runtime.
//!
//! ```text
//!                     Listen                 Adopt
//!   NotConnected ────────────→ Listening ──────────────→ Pending
//!      ↑  ↑  │                    │                     │   │   │
//!      │  │  │ Dial               │ Dial       Accept   │   │   │ Reject
//!      │  │  ↓                    ↓                     ↓   │   ↓
//!      │  │  Connecting ←─────────┘                Connected│  Rejected
//!      │  │   │  │ Adopt ───────────────→ Pending        │   │   │
//!      │  └───┘  DialFailed                            │   │   │ Listen
//!      └───────────────── Drop ────────────────────────┴───┘   ↓
//!                                                          Listening
//!   Reset: any state → NotConnected
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// ConnectionState
// ---------------------------------------------------------------------------

/// Where the session is in its connection lifecycle.
///
/// - **NotConnected**: no task is running, or the session is between
///   teardown and the next listen.
/// - **Listening**: the listener task waits for inbound channels.
/// - **Connecting**: one outbound dial is in flight.
/// - **Pending**: a channel is adopted; the handshake is not complete.
/// - **Connected**: the handshake completed; payload may flow.
/// - **Rejected**: the handshake was refused. Transient: the session moves
///   on to `Listening` in the same critical section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConnectionState {
    NotConnected,
    Listening,
    Connecting,
    Pending,
    Connected,
    Rejected,
}

impl ConnectionState {
    pub const ALL: [ConnectionState; 6] = [
        Self::NotConnected,
        Self::Listening,
        Self::Connecting,
        Self::Pending,
        Self::Connected,
        Self::Rejected,
    ];

    /// Returns `true` while a channel is adopted.
    pub fn has_channel(self) -> bool {
        matches!(self, Self::Pending | Self::Connected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NotConnected => "NotConnected",
            Self::Listening => "Listening",
            Self::Connecting => "Connecting",
            Self::Pending => "Pending",
            Self::Connected => "Connected",
            Self::Rejected => "Rejected",
        };
        f.write_str(name)
    }
}

/// Which side opened the adopted channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConnectionRole {
    /// The peer dialed us; our listener accepted.
    Incoming,
    /// We dialed the peer.
    Outgoing,
}

// ---------------------------------------------------------------------------
// Trigger / transition
// ---------------------------------------------------------------------------

/// Something that may move the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Trigger {
    /// Start listening (service start, or after a teardown).
    Listen,
    /// Explicit outbound connect.
    Dial,
    /// A channel was accepted or dialed and is being adopted.
    Adopt,
    /// The outbound dial failed.
    DialFailed,
    /// Handshake accepted (by the peer, or by the local user).
    Accept,
    /// Handshake rejected (by the peer, or by the local user).
    Reject,
    /// The adopted channel went away.
    Drop,
    /// Explicit stop or disconnect.
    Reset,
}

impl Trigger {
    pub const ALL: [Trigger; 8] = [
        Self::Listen,
        Self::Dial,
        Self::Adopt,
        Self::DialFailed,
        Self::Accept,
        Self::Reject,
        Self::Drop,
        Self::Reset,
    ];
}

/// Returns the state `trigger` leads to from `state`, or `None` if the pair
/// is not a valid transition. `None` means "leave the state alone".
pub fn transition(
    state: ConnectionState,
    trigger: Trigger,
) -> Option<ConnectionState> {
    use ConnectionState::*;

    match (state, trigger) {
        (NotConnected | Rejected, Trigger::Listen) => Some(Listening),
        (NotConnected | Listening | Connecting, Trigger::Dial) => {
            Some(Connecting)
        }
        (Listening | Connecting, Trigger::Adopt) => Some(Pending),
        (Connecting, Trigger::DialFailed) => Some(NotConnected),
        (Pending, Trigger::Accept) => Some(Connected),
        (Pending, Trigger::Reject) => Some(Rejected),
        (Connected | Pending, Trigger::Drop) => Some(NotConnected),
        (_, Trigger::Reset) => Some(NotConnected),
        _ => None,
    }
}
