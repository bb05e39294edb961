//! In-process transport built on `tokio::io::duplex`.
//!
//! A [`MemoryNetwork`] is a shared registry of listening addresses. Each
//! [`MemoryTransport`] is one "device" on that network: listening registers
//! its address, dialing another address hands the listener one end of a
//! fresh duplex pipe and returns the other end.
//!
//! ```text
//!   MemoryTransport("A")           MemoryNetwork          MemoryTransport("B")
//!        dial("B") ──────────→ registry["B"].send(pipe) ──→ accept()
//!            ↑                                                  │
//!            └──────────────── duplex pipe ─────────────────────┘
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::io::{DuplexStream, ReadHalf, WriteHalf};
use tokio::sync::mpsc;

use crate::{
    Channel, ChannelId, Listener, PeerAddress, PeerInfo, Transport,
    TransportError,
};

/// Default in-flight capacity of each pipe direction.
const DEFAULT_PIPE_CAPACITY: usize = 64 * 1024;

/// Inbound channels queued per listener before `dial` starts to wait.
const ACCEPT_BACKLOG: usize = 8;

/// One end of a pipe on its way to a listener.
struct Incoming {
    from: PeerInfo,
    stream: DuplexStream,
}

struct Registration {
    info: PeerInfo,
    sender: mpsc::Sender<Incoming>,
}

type Registry = Arc<Mutex<HashMap<PeerAddress, Registration>>>;

/// A shared, in-process "air" that [`MemoryTransport`]s connect through.
#[derive(Clone, Default)]
pub struct MemoryNetwork {
    registry: Registry,
}

impl MemoryNetwork {
    /// Creates an empty network.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a device on this network with the given address and name.
    pub fn transport(
        &self,
        address: impl Into<PeerAddress>,
        name: impl Into<String>,
    ) -> MemoryTransport {
        MemoryTransport {
            local: PeerInfo::new(address, Some(name.into())),
            registry: Arc::clone(&self.registry),
            capacity: DEFAULT_PIPE_CAPACITY,
        }
    }

    /// Returns `true` if a listener is currently registered at `address`.
    pub fn is_listening(&self, address: &PeerAddress) -> bool {
        self.registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(address)
            .is_some_and(|reg| !reg.sender.is_closed())
    }
}

/// One device on a [`MemoryNetwork`].
#[derive(Clone)]
pub struct MemoryTransport {
    local: PeerInfo,
    registry: Registry,
    capacity: usize,
}

impl MemoryTransport {
    /// Sets the per-direction buffer size of pipes this device dials.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    /// The address and name other devices see.
    pub fn local(&self) -> &PeerInfo {
        &self.local
    }
}

impl Transport for MemoryTransport {
    type Listener = MemoryListener;
    type Channel = MemoryChannel;

    async fn listen(&self) -> Result<Self::Listener, TransportError> {
        let (sender, receiver) = mpsc::channel(ACCEPT_BACKLOG);
        let registration = Registration {
            info: self.local.clone(),
            sender: sender.clone(),
        };
        self.registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(self.local.address.clone(), registration);
        tracing::debug!(address = %self.local.address, "memory listener registered");

        Ok(MemoryListener {
            address: self.local.address.clone(),
            sender,
            receiver,
            registry: Arc::clone(&self.registry),
        })
    }

    async fn dial(
        &self,
        peer: &PeerAddress,
    ) -> Result<Self::Channel, TransportError> {
        // Clone the sender out so the lock is not held across `.await`.
        let (info, sender) = {
            let registry = self
                .registry
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            let reg = registry
                .get(peer)
                .ok_or_else(|| TransportError::Unreachable(peer.clone()))?;
            (reg.info.clone(), reg.sender.clone())
        };

        let (local_end, remote_end) = tokio::io::duplex(self.capacity);
        sender
            .send(Incoming {
                from: self.local.clone(),
                stream: remote_end,
            })
            .await
            .map_err(|_| TransportError::Unreachable(peer.clone()))?;

        let id = ChannelId::next();
        tracing::debug!(%id, %peer, "dialed memory channel");
        Ok(MemoryChannel {
            id,
            peer: info,
            stream: local_end,
        })
    }
}

/// The passive endpoint of a [`MemoryTransport`].
///
/// Dropping it unregisters the address; pipes still queued are dropped,
/// which the dialing side observes as end-of-stream.
pub struct MemoryListener {
    address: PeerAddress,
    sender: mpsc::Sender<Incoming>,
    receiver: mpsc::Receiver<Incoming>,
    registry: Registry,
}

impl Listener for MemoryListener {
    type Channel = MemoryChannel;

    async fn accept(&mut self) -> Result<Self::Channel, TransportError> {
        let incoming =
            self.receiver.recv().await.ok_or(TransportError::Shutdown)?;
        let id = ChannelId::next();
        tracing::debug!(%id, from = %incoming.from.address, "accepted memory channel");
        Ok(MemoryChannel {
            id,
            peer: incoming.from,
            stream: incoming.stream,
        })
    }
}

impl Drop for MemoryListener {
    fn drop(&mut self) {
        let mut registry =
            self.registry.lock().unwrap_or_else(PoisonError::into_inner);
        // A newer listener for the same address may have replaced us.
        let ours = registry
            .get(&self.address)
            .is_some_and(|reg| reg.sender.same_channel(&self.sender));
        if ours {
            registry.remove(&self.address);
        }
    }
}

/// One end of an in-process duplex pipe.
pub struct MemoryChannel {
    id: ChannelId,
    peer: PeerInfo,
    stream: DuplexStream,
}

impl Channel for MemoryChannel {
    type Reader = ReadHalf<DuplexStream>;
    type Writer = WriteHalf<DuplexStream>;

    fn id(&self) -> ChannelId {
        self.id
    }

    fn peer(&self) -> &PeerInfo {
        &self.peer
    }

    fn into_split(self) -> (Self::Reader, Self::Writer) {
        tokio::io::split(self.stream)
    }
}
