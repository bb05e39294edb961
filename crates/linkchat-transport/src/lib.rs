//! Transport abstraction layer for linkchat.
//!
//! The session core never talks to a radio stack directly. It only needs a
//! connection-oriented, duplex byte channel to exactly one peer, which this
//! crate describes with three traits:
//!
//! - [`Transport`]: opens a passive endpoint ([`Transport::listen`]) and
//!   performs outbound connection attempts ([`Transport::dial`]).
//! - [`Listener`]: the passive endpoint; [`Listener::accept`] blocks until
//!   a peer connects.
//! - [`Channel`]: one established duplex stream, split into a reader and a
//!   writer half so that reading and writing can run on separate tasks.
//!
//! # Closing
//!
//! There is no explicit `close()`. Dropping a [`Listener`] closes the
//! passive endpoint, and dropping both halves of a [`Channel`] closes the
//! stream. Any task blocked on the resource sees an error or end-of-stream,
//! which is the one cancellation primitive the session layer relies on.
//!
//! # Feature Flags
//!
//! - `tcp` (default): [`TcpTransport`], a channel over TCP sockets
//! - `memory` (default): [`MemoryNetwork`], in-process channels for tests
//!   and demos

mod error;
#[cfg(feature = "memory")]
mod memory;
#[cfg(feature = "tcp")]
mod tcp;

pub use error::TransportError;
#[cfg(feature = "memory")]
pub use memory::{MemoryChannel, MemoryListener, MemoryNetwork, MemoryTransport};
#[cfg(feature = "tcp")]
pub use tcp::{TcpChannel, TcpChannelListener, TcpTransport};

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::io::{AsyncRead, AsyncWrite};

/// Counter for generating unique channel IDs.
static NEXT_CHANNEL_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque identifier for an established channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelId(u64);

impl ChannelId {
    /// Creates a new `ChannelId` from a raw `u64`.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Allocates the next process-wide unique id.
    pub fn next() -> Self {
        Self(NEXT_CHANNEL_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ch-{}", self.0)
    }
}

/// The transport-level address of a peer (a hardware address for radio
/// links, `host:port` for TCP).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerAddress(String);

impl PeerAddress {
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PeerAddress {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for PeerAddress {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// What the transport knows about the remote end of a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerInfo {
    /// Address the channel is connected to.
    pub address: PeerAddress,
    /// Device name reported by the transport, if it has one.
    pub name: Option<String>,
}

impl PeerInfo {
    pub fn new(address: impl Into<PeerAddress>, name: Option<String>) -> Self {
        Self {
            address: address.into(),
            name,
        }
    }

    /// The device name, or `"?"` when the transport did not report one.
    pub fn device_name(&self) -> &str {
        self.name.as_deref().unwrap_or("?")
    }
}

/// Opens passive endpoints and dials peers.
///
/// The methods return `impl Future + Send` rather than using `async fn`
/// so that generic callers can drive them from `tokio::spawn`ed tasks.
pub trait Transport: Send + Sync + 'static {
    /// The passive endpoint produced by [`listen`](Self::listen).
    type Listener: Listener<Channel = Self::Channel>;
    /// The channel type produced by this transport.
    type Channel: Channel;

    /// Opens the passive endpoint. Called once per listener task.
    fn listen(
        &self,
    ) -> impl Future<Output = Result<Self::Listener, TransportError>> + Send;

    /// Performs one outbound connection attempt.
    fn dial(
        &self,
        peer: &PeerAddress,
    ) -> impl Future<Output = Result<Self::Channel, TransportError>> + Send;
}

/// A passive endpoint waiting for inbound channels.
///
/// Dropping the listener closes the endpoint.
pub trait Listener: Send + 'static {
    /// The channel type produced by this listener.
    type Channel: Channel;

    /// Waits for and accepts the next inbound channel.
    fn accept(
        &mut self,
    ) -> impl Future<Output = Result<Self::Channel, TransportError>> + Send;
}

/// One established duplex byte stream to exactly one peer.
pub trait Channel: Send + 'static {
    /// Read half, owned by the engine's read loop.
    type Reader: AsyncRead + Send + Unpin + 'static;
    /// Write half, owned by the engine's writer.
    type Writer: AsyncWrite + Send + Unpin + 'static;

    /// Returns the unique identifier for this channel.
    fn id(&self) -> ChannelId;

    /// Returns what the transport knows about the remote end.
    fn peer(&self) -> &PeerInfo;

    /// Splits the channel into independently owned halves.
    fn into_split(self) -> (Self::Reader, Self::Writer);
}
