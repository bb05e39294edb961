use crate::PeerAddress;

/// Errors from opening endpoints and establishing channels.
///
/// Reads and writes on an established channel are plain
/// `std::io::Result`s; the transfer engine owns those failures.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Opening the passive endpoint failed.
    #[error("listen failed: {0}")]
    ListenFailed(#[source] std::io::Error),

    /// Accepting an inbound channel failed.
    #[error("accept failed: {0}")]
    AcceptFailed(#[source] std::io::Error),

    /// The outbound connection attempt failed.
    #[error("dial {peer} failed: {source}")]
    DialFailed {
        peer: PeerAddress,
        #[source]
        source: std::io::Error,
    },

    /// Nobody is listening at the given address.
    #[error("peer {0} is unreachable")]
    Unreachable(PeerAddress),

    /// The endpoint was shut down.
    #[error("transport shut down")]
    Shutdown,
}
