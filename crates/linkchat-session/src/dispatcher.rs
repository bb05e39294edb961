//! The dispatcher task: where observers and collaborators are called.
//!
//! The orchestrator never calls out while holding its critical section.
//! It queues a [`Job`] instead, and one task works through the queue in
//! order:
//!
//! ```text
//!   orchestrator ──Job──→ ┌─────────────────┐ ──→ observers
//!   pump tasks   ──Job──→ │ dispatcher task │ ──→ notifications, shortcuts
//!                         └─────────────────┘ ──→ store (blocking pool)
//! ```
//!
//! Store calls are awaited before the matching event is published, so an
//! observer that reads the store after `MessageEvent::Received` finds the
//! message there.

use std::sync::Arc;

use linkchat_transfer::TransferDirection;
use linkchat_transport::PeerAddress;
use tokio::sync::mpsc;

use crate::collaborators::{Collaborators, Notification, NotificationKey};
use crate::observer::Observers;
use crate::{
    ChatMessage, ConnectionEvent, Conversation, FileEvent, MessageEvent,
};

/// One unit of work for the dispatcher.
#[derive(Debug)]
pub(crate) enum Job {
    Connection(ConnectionEvent),
    Message(MessageEvent),
    Notify(NotificationKey, Notification),
    Dismiss(NotificationKey),
    /// Persist the conversation of a completed handshake.
    StoreConversation(Conversation),
    /// The peer asked to connect: publish the request and notify the user
    /// unless they are already looking.
    ConnectionRequest(Conversation),
    MessageReceived {
        message: ChatMessage,
        conversation: Option<Conversation>,
    },
    MessageSent {
        message: ChatMessage,
        conversation: Option<Conversation>,
    },
    File {
        event: FileEvent,
        peer: PeerAddress,
        conversation: Option<Conversation>,
    },
}

/// Handle to the dispatcher task. The task ends once every handle is gone.
#[derive(Debug, Clone)]
pub(crate) struct Dispatcher {
    jobs: mpsc::UnboundedSender<Job>,
}

impl Dispatcher {
    /// Starts the dispatcher task. Must be called from within a Tokio
    /// runtime.
    pub(crate) fn spawn(
        observers: Arc<Observers>,
        collaborators: Collaborators,
    ) -> Self {
        let (jobs, queue) = mpsc::unbounded_channel();
        let worker = Worker {
            observers,
            collaborators,
        };
        tokio::spawn(worker.run(queue));
        Self { jobs }
    }

    pub(crate) fn send(&self, job: Job) {
        if self.jobs.send(job).is_err() {
            tracing::debug!("dispatcher gone, job dropped");
        }
    }

    pub(crate) fn connection(&self, event: ConnectionEvent) {
        self.send(Job::Connection(event));
    }
}

// ---------------------------------------------------------------------------
// Worker
// ---------------------------------------------------------------------------

struct Worker {
    observers: Arc<Observers>,
    collaborators: Collaborators,
}

impl Worker {
    async fn run(self, mut queue: mpsc::UnboundedReceiver<Job>) {
        while let Some(job) = queue.recv().await {
            self.handle(job).await;
        }
        tracing::debug!("dispatcher stopped");
    }

    async fn handle(&self, job: Job) {
        match job {
            Job::Connection(event) => self.observers.notify_connection(&event),
            Job::Message(event) => self.observers.notify_message(&event),
            Job::Notify(key, notification) => {
                self.collaborators.notifications.show(key, notification);
            }
            Job::Dismiss(key) => self.collaborators.notifications.dismiss(&key),
            Job::StoreConversation(conversation) => {
                self.store_conversation(conversation).await;
            }
            Job::ConnectionRequest(conversation) => {
                self.connection_request(conversation);
            }
            Job::MessageReceived {
                message,
                conversation,
            } => self.message_received(message, conversation.as_ref()).await,
            Job::MessageSent {
                message,
                conversation,
            } => self.message_sent(message, conversation.as_ref()).await,
            Job::File {
                event,
                peer,
                conversation,
            } => self.file(event, peer, conversation.as_ref()).await,
        }
    }

    fn connection_request(&self, conversation: Conversation) {
        let presence = &self.collaborators.presence;
        let looking = presence.is_conversations_open()
            || self.collaborators.is_chat_open(&conversation.peer_address);
        if !looking {
            let notification = Notification::new(
                REQUEST_TITLE,
                format!(
                    "{} ({})",
                    conversation.display_name, conversation.device_name
                ),
            )
            .with_sound(self.sound());
            self.collaborators
                .notifications
                .show(NotificationKey::ConnectionRequest, notification);
        }
        self.observers
            .notify_connection(&ConnectionEvent::ConnectedIncoming(conversation));
    }

    async fn message_received(
        &self,
        mut message: ChatMessage,
        conversation: Option<&Conversation>,
    ) {
        self.notify_or_mark_seen(&mut message, conversation);
        self.store_message(message.clone()).await;
        self.observers
            .notify_message(&MessageEvent::Received(message));
        self.add_shortcut(conversation);
    }

    async fn message_sent(
        &self,
        mut message: ChatMessage,
        conversation: Option<&Conversation>,
    ) {
        message.seen_here = true;
        self.store_message(message.clone()).await;
        self.observers.notify_message(&MessageEvent::Sent(message));
        self.add_shortcut(conversation);
    }

    async fn file(
        &self,
        event: FileEvent,
        peer: PeerAddress,
        conversation: Option<&Conversation>,
    ) {
        self.observers.notify_file(&event);

        let key = NotificationKey::Transfer(event.uid());
        match event {
            FileEvent::SendingStarted(file) | FileEvent::ReceivingStarted(file) => {
                let verb = match file.direction {
                    TransferDirection::Outbound => "Sending",
                    TransferDirection::Inbound => "Receiving",
                };
                let notification =
                    Notification::new(title(conversation, &peer), format!("{verb} {}", file.name))
                        .silent(self.collaborators.is_chat_open(&peer))
                        .with_progress(0, file.size);
                self.collaborators.notifications.show(key, notification);
            }
            FileEvent::SendingProgress { sent: done, size, .. }
            | FileEvent::ReceivingProgress {
                received: done,
                size,
                ..
            } => {
                let notification =
                    Notification::new(title(conversation, &peer), "")
                        .silent(true)
                        .with_progress(done, size);
                self.collaborators.notifications.show(key, notification);
            }
            FileEvent::SendingFinished(file) => {
                self.collaborators.notifications.dismiss(&key);
                let message = ChatMessage::file(peer, true, &file);
                self.message_sent(message, conversation).await;
            }
            FileEvent::ReceivingFinished(file) => {
                self.collaborators.notifications.dismiss(&key);
                // Replaced by the notification for the file itself.
                self.collaborators
                    .notifications
                    .dismiss(&NotificationKey::Message(peer.clone()));
                let message = ChatMessage::file(peer, false, &file);
                self.message_received(message, conversation).await;
            }
            FileEvent::SendingFailed { .. }
            | FileEvent::ReceivingFailed { .. }
            | FileEvent::Canceled { .. } => {
                self.collaborators.notifications.dismiss(&key);
            }
        }
    }

    /// Shows a new-item notification unless the user is reading that
    /// peer's chat, in which case the item is already seen.
    fn notify_or_mark_seen(
        &self,
        message: &mut ChatMessage,
        conversation: Option<&Conversation>,
    ) {
        let peer = &message.peer_address;
        if self.observers.has_message_observers()
            && self.collaborators.is_chat_open(peer)
        {
            message.seen_here = true;
            return;
        }
        let notification =
            Notification::new(title(conversation, peer), message.preview())
                .with_sound(self.sound());
        self.collaborators
            .notifications
            .show(NotificationKey::Message(peer.clone()), notification);
    }

    fn sound(&self) -> bool {
        self.collaborators.preferences.is_sound_enabled()
    }

    fn add_shortcut(&self, conversation: Option<&Conversation>) {
        if let Some(conversation) = conversation {
            self.collaborators.shortcuts.add_conversation_shortcut(
                &conversation.peer_address,
                &conversation.display_name,
                conversation.color,
            );
        }
    }

    async fn store_message(&self, message: ChatMessage) {
        let store = Arc::clone(&self.collaborators.store);
        let uid = message.uid;
        let result =
            tokio::task::spawn_blocking(move || store.insert_message(&message))
                .await;
        match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!(%uid, error = %e, "storing message failed"),
            Err(e) => tracing::warn!(%uid, error = %e, "store task failed"),
        }
    }

    async fn store_conversation(&self, conversation: Conversation) {
        let store = Arc::clone(&self.collaborators.store);
        let peer = conversation.peer_address.clone();
        let result = tokio::task::spawn_blocking(move || {
            store.insert_conversation(&conversation)
        })
        .await;
        match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::warn!(%peer, error = %e, "storing conversation failed");
            }
            Err(e) => tracing::warn!(%peer, error = %e, "store task failed"),
        }
    }
}

const REQUEST_TITLE: &str = "Connection request";

/// Notification title for a peer: its announced name once known.
fn title(conversation: Option<&Conversation>, peer: &PeerAddress) -> String {
    conversation
        .map(|c| c.display_name.clone())
        .unwrap_or_else(|| peer.to_string())
}
