//! Connection lifecycle and session orchestration for linkchat.
//!
//! A [`Session`] keeps one point-to-point chat session alive over a
//! [`Transport`](linkchat_transport::Transport): it listens by default,
//! dials on request, runs the handshake, and turns everything that
//! happens on the channel into events for its observers and calls to its
//! collaborators.
//!
//! # How it fits in the stack
//!
//! ```text
//! Application (above)   ← observers, collaborators, commands
//!     ↕
//! Session Layer (this crate)  ← state machine, listener / connector tasks
//!     ↕
//! Transfer Layer (below)  ← one engine per adopted channel
//!     ↕
//! Protocol + Transport  ← frames, contract, byte channels
//! ```
//!
//! # Key types
//!
//! - [`Session`]: the orchestrator and its commands
//! - [`ConnectionState`] / [`transition`]: the pure state machine
//! - [`ConnectionEvent`], [`MessageEvent`], [`FileEvent`]: what observers see
//! - [`Collaborators`]: store, notifications, preferences, shortcuts, presence

mod collaborators;
mod config;
mod dispatcher;
mod error;
mod event;
mod machine;
mod model;
mod observer;
mod session;
mod tasks;

pub use collaborators::{
    CollaboratorError, Collaborators, MessageStore, Noop, Notification,
    NotificationKey, NotificationSink, Preferences, Presence, ShortcutSink,
};
pub use config::SessionConfig;
pub use error::SessionError;
pub use event::{ConnectionEvent, FileEvent, MessageEvent, SessionEvent};
pub use machine::{ConnectionRole, ConnectionState, Trigger, transition};
pub use model::{ChatMessage, Conversation};
pub use observer::{
    ConnectionObserver, FileObserver, MessageObserver, SubscriptionId,
};
pub use session::Session;
