//! # linkchat
//!
//! Point-to-point chat and file transfer between two devices.
//!
//! linkchat keeps one session alive over any duplex byte-channel
//! transport: it listens for the peer by default, dials on request, runs a
//! profile handshake, and then carries text messages, receipts and files
//! over the same channel. Applications observe the session through
//! events and plug in their own message store and notifications.
//!
//! ```text
//!   linkchat (this crate)   ← builder, unified error, prelude
//!       │
//!   linkchat-session        ← state machine, orchestrator, observers
//!       │
//!   linkchat-transfer       ← reader / writer engine, file chunks
//!       │
//!   linkchat-protocol       ← frames, JSON lines, handshake contract
//!       │
//!   linkchat-transport      ← TCP / in-memory channels
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use linkchat::prelude::*;
//!
//! # async fn run() -> Result<(), LinkChatError> {
//! let session = LinkChat::builder()
//!     .display_name("Alice")
//!     .color(0x3366FF)
//!     .build(TcpTransport::new("0.0.0.0:7070"));
//!
//! let (tx, mut events) = tokio::sync::mpsc::unbounded_channel();
//! session.subscribe_connection(tx.clone());
//! session.subscribe_messages(tx);
//! session.start().await;
//!
//! session.connect("192.168.1.20:7070".into()).await?;
//! while let Some(event) = events.recv().await {
//!     println!("{event:?}");
//! }
//! # Ok(())
//! # }
//! ```

mod builder;
mod error;

pub use builder::{LinkChat, LinkChatBuilder};
pub use error::LinkChatError;

pub use linkchat_protocol as protocol;
pub use linkchat_session as session;
pub use linkchat_transfer as transfer;
pub use linkchat_transport as transport;

/// Installs a `tracing` fmt subscriber filtered by `RUST_LOG`.
///
/// Defaults to `info` when `RUST_LOG` is unset or invalid. Calling it a
/// second time does nothing.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// Everything an application usually needs.
pub mod prelude {
    pub use crate::{LinkChat, LinkChatBuilder, LinkChatError, init_tracing};
    pub use linkchat_protocol::{Frame, FrameType, PayloadKind, Uid};
    pub use linkchat_session::{
        ChatMessage, Collaborators, ConnectionEvent, ConnectionObserver,
        ConnectionRole, ConnectionState, Conversation, FileEvent,
        FileObserver, MessageEvent, MessageObserver, MessageStore,
        Notification, NotificationKey, NotificationSink, Preferences,
        Presence, Session, SessionConfig, SessionError, SessionEvent,
        ShortcutSink, SubscriptionId,
    };
    pub use linkchat_transfer::{TransferDirection, TransferringFile};
    pub use linkchat_transport::{
        MemoryNetwork, MemoryTransport, PeerAddress, PeerInfo, TcpTransport,
        Transport,
    };
}
