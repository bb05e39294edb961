//! TCP transport: a stand-in for the radio link on desktop hosts.

use std::net::SocketAddr;

use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};

use crate::{
    Channel, ChannelId, Listener, PeerAddress, PeerInfo, Transport,
    TransportError,
};

/// A [`Transport`] that listens on and dials TCP addresses.
///
/// Peer addresses are `host:port` strings.
#[derive(Debug, Clone)]
pub struct TcpTransport {
    bind_addr: String,
}

impl TcpTransport {
    /// Creates a transport whose listener binds to `bind_addr`.
    pub fn new(bind_addr: impl Into<String>) -> Self {
        Self {
            bind_addr: bind_addr.into(),
        }
    }
}

impl Transport for TcpTransport {
    type Listener = TcpChannelListener;
    type Channel = TcpChannel;

    async fn listen(&self) -> Result<Self::Listener, TransportError> {
        let listener = TcpListener::bind(&self.bind_addr)
            .await
            .map_err(TransportError::ListenFailed)?;
        tracing::info!(addr = %self.bind_addr, "TCP transport listening");
        Ok(TcpChannelListener { listener })
    }

    async fn dial(
        &self,
        peer: &PeerAddress,
    ) -> Result<Self::Channel, TransportError> {
        let stream =
            TcpStream::connect(peer.as_str()).await.map_err(|source| {
                TransportError::DialFailed {
                    peer: peer.clone(),
                    source,
                }
            })?;
        let _ = stream.set_nodelay(true);

        let id = ChannelId::next();
        tracing::debug!(%id, %peer, "dialed TCP channel");
        Ok(TcpChannel {
            id,
            peer: PeerInfo::new(peer.clone(), None),
            stream,
        })
    }
}

/// The passive TCP endpoint. Dropping it closes the socket.
pub struct TcpChannelListener {
    listener: TcpListener,
}

impl TcpChannelListener {
    /// Returns the local address the endpoint is bound to.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }
}

impl Listener for TcpChannelListener {
    type Channel = TcpChannel;

    async fn accept(&mut self) -> Result<Self::Channel, TransportError> {
        let (stream, addr) = self
            .listener
            .accept()
            .await
            .map_err(TransportError::AcceptFailed)?;
        let _ = stream.set_nodelay(true);

        let id = ChannelId::next();
        tracing::debug!(%id, %addr, "accepted TCP channel");
        Ok(TcpChannel {
            id,
            peer: PeerInfo::new(addr.to_string(), None),
            stream,
        })
    }
}

/// A single TCP channel.
pub struct TcpChannel {
    id: ChannelId,
    peer: PeerInfo,
    stream: TcpStream,
}

impl Channel for TcpChannel {
    type Reader = OwnedReadHalf;
    type Writer = OwnedWriteHalf;

    fn id(&self) -> ChannelId {
        self.id
    }

    fn peer(&self) -> &PeerInfo {
        &self.peer
    }

    fn into_split(self) -> (Self::Reader, Self::Writer) {
        self.stream.into_split()
    }
}
