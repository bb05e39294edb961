//! The services a session calls out to but does not own.
//!
//! ```text
//!                       ┌──────────────┐
//!                  ┌───→│ MessageStore │  insert_message / insert_conversation
//!                  │    ├──────────────┤
//!   dispatcher ────┼───→│ Notification │  show / dismiss, keyed
//!     task         │    ├──────────────┤
//!                  ├───→│ Preferences  │  sound on?
//!                  │    ├──────────────┤
//!                  ├───→│ ShortcutSink │  refresh conversation shortcut
//!                  │    ├──────────────┤
//!                  └───→│ Presence     │  which screen is in front?
//!                       └──────────────┘
//! ```
//!
//! Every collaborator is called from the dispatcher task only. Store calls
//! are blocking and run on the blocking pool; their errors are logged and
//! otherwise ignored.

use std::fmt;
use std::sync::Arc;

use linkchat_protocol::Uid;
use linkchat_transport::PeerAddress;

use crate::{ChatMessage, Conversation};

/// Error type collaborators report. The session only logs it.
pub type CollaboratorError = Box<dyn std::error::Error + Send + Sync>;

// ---------------------------------------------------------------------------
// MessageStore
// ---------------------------------------------------------------------------

/// Persistent storage for chat items and conversations.
pub trait MessageStore: Send + Sync + 'static {
    fn insert_message(&self, message: &ChatMessage) -> Result<(), CollaboratorError>;

    fn insert_conversation(
        &self,
        conversation: &Conversation,
    ) -> Result<(), CollaboratorError>;
}

// ---------------------------------------------------------------------------
// NotificationSink
// ---------------------------------------------------------------------------

/// Which notification a call is about. Showing a key that is already
/// shown replaces it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NotificationKey {
    /// The ongoing "ready to connect" / "connected to" status.
    Service,
    /// An unanswered inbound connection request.
    ConnectionRequest,
    /// New items from one peer.
    Message(PeerAddress),
    /// A file transfer in flight.
    Transfer(Uid),
}

/// What a notification says.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub title: String,
    pub text: String,
    /// Play the notification sound.
    pub sound: bool,
    /// Show without interrupting the user at all.
    pub silent: bool,
    /// Transfer progress as `(done, total)`.
    pub progress: Option<(u64, u64)>,
}

impl Notification {
    pub fn new(title: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            text: text.into(),
            sound: false,
            silent: false,
            progress: None,
        }
    }

    pub fn with_sound(mut self, sound: bool) -> Self {
        self.sound = sound;
        self
    }

    pub fn silent(mut self, silent: bool) -> Self {
        self.silent = silent;
        self
    }

    pub fn with_progress(mut self, done: u64, total: u64) -> Self {
        self.progress = Some((done, total));
        self
    }
}

/// Shows and dismisses user-facing notifications.
pub trait NotificationSink: Send + Sync + 'static {
    fn show(&self, key: NotificationKey, notification: Notification);

    fn dismiss(&self, key: &NotificationKey);
}

// ---------------------------------------------------------------------------
// Preferences / ShortcutSink / Presence
// ---------------------------------------------------------------------------

/// User preferences the session consults.
pub trait Preferences: Send + Sync + 'static {
    fn is_sound_enabled(&self) -> bool;
}

/// Keeps launcher shortcuts for recent conversations.
pub trait ShortcutSink: Send + Sync + 'static {
    /// `color` is the peer's announced color tag.
    fn add_conversation_shortcut(
        &self,
        peer: &PeerAddress,
        display_name: &str,
        color: i32,
    );
}

/// What the user is looking at right now.
///
/// Decides whether an event deserves a notification: a message from the
/// peer whose chat is open is simply marked as seen.
pub trait Presence: Send + Sync + 'static {
    /// The peer whose chat screen is in the foreground, if any.
    fn current_chat(&self) -> Option<PeerAddress>;

    /// Whether the conversation list is in the foreground.
    fn is_conversations_open(&self) -> bool;
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

/// Collaborator that does nothing: stores nothing, shows nothing, and
/// reports that no screen is in front.
#[derive(Debug, Clone, Copy, Default)]
pub struct Noop;

impl MessageStore for Noop {
    fn insert_message(&self, _message: &ChatMessage) -> Result<(), CollaboratorError> {
        Ok(())
    }

    fn insert_conversation(
        &self,
        _conversation: &Conversation,
    ) -> Result<(), CollaboratorError> {
        Ok(())
    }
}

impl NotificationSink for Noop {
    fn show(&self, _key: NotificationKey, _notification: Notification) {}

    fn dismiss(&self, _key: &NotificationKey) {}
}

impl Preferences for Noop {
    fn is_sound_enabled(&self) -> bool {
        false
    }
}

impl ShortcutSink for Noop {
    fn add_conversation_shortcut(
        &self,
        _peer: &PeerAddress,
        _display_name: &str,
        _color: i32,
    ) {
    }
}

impl Presence for Noop {
    fn current_chat(&self) -> Option<PeerAddress> {
        None
    }

    fn is_conversations_open(&self) -> bool {
        false
    }
}

/// The full set of collaborators a session is built with.
#[derive(Clone)]
pub struct Collaborators {
    pub store: Arc<dyn MessageStore>,
    pub notifications: Arc<dyn NotificationSink>,
    pub preferences: Arc<dyn Preferences>,
    pub shortcuts: Arc<dyn ShortcutSink>,
    pub presence: Arc<dyn Presence>,
}

impl Default for Collaborators {
    fn default() -> Self {
        Self {
            store: Arc::new(Noop),
            notifications: Arc::new(Noop),
            preferences: Arc::new(Noop),
            shortcuts: Arc::new(Noop),
            presence: Arc::new(Noop),
        }
    }
}

impl Collaborators {
    pub fn with_store(mut self, store: impl MessageStore) -> Self {
        self.store = Arc::new(store);
        self
    }

    pub fn with_notifications(mut self, sink: impl NotificationSink) -> Self {
        self.notifications = Arc::new(sink);
        self
    }

    pub fn with_preferences(mut self, preferences: impl Preferences) -> Self {
        self.preferences = Arc::new(preferences);
        self
    }

    pub fn with_shortcuts(mut self, shortcuts: impl ShortcutSink) -> Self {
        self.shortcuts = Arc::new(shortcuts);
        self
    }

    pub fn with_presence(mut self, presence: impl Presence) -> Self {
        self.presence = Arc::new(presence);
        self
    }

    /// Whether the user is looking at the chat with `peer`.
    pub(crate) fn is_chat_open(&self, peer: &PeerAddress) -> bool {
        self.presence.current_chat().as_ref() == Some(peer)
    }
}

impl fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}
