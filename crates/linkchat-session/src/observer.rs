//! Observer traits and the subscription registry.
//!
//! Any number of observers may subscribe to each event family. Callbacks
//! run on the session's dispatcher task, one at a time and in the order
//! the events happened, so an observer never sees two callbacks at once
//! from the same session.
//!
//! An `mpsc::UnboundedSender<SessionEvent>` is an observer of all three
//! families, which turns a session into a stream:
//!
//! ```text
//! let (tx, mut rx) = mpsc::unbounded_channel();
//! session.subscribe_connection(tx.clone());
//! session.subscribe_messages(tx.clone());
//! session.subscribe_files(tx);
//! while let Some(event) = rx.recv().await { ... }
//! ```

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::mpsc;

use crate::{ConnectionEvent, FileEvent, MessageEvent, SessionEvent};

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Receives connection lifecycle events.
pub trait ConnectionObserver: Send + Sync + 'static {
    fn on_connection_event(&self, event: &ConnectionEvent);
}

/// Receives message and receipt events.
pub trait MessageObserver: Send + Sync + 'static {
    fn on_message_event(&self, event: &MessageEvent);
}

/// Receives file transfer events.
pub trait FileObserver: Send + Sync + 'static {
    fn on_file_event(&self, event: &FileEvent);
}

impl ConnectionObserver for mpsc::UnboundedSender<SessionEvent> {
    fn on_connection_event(&self, event: &ConnectionEvent) {
        let _ = self.send(event.clone().into());
    }
}

impl MessageObserver for mpsc::UnboundedSender<SessionEvent> {
    fn on_message_event(&self, event: &MessageEvent) {
        let _ = self.send(event.clone().into());
    }
}

impl FileObserver for mpsc::UnboundedSender<SessionEvent> {
    fn on_file_event(&self, event: &FileEvent) {
        let _ = self.send(event.clone().into());
    }
}

// ---------------------------------------------------------------------------
// SubscriptionId
// ---------------------------------------------------------------------------

/// Handle returned by `subscribe_*`, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Observers
// ---------------------------------------------------------------------------

type Slots<T> = Mutex<Vec<(SubscriptionId, Arc<T>)>>;

/// Every subscribed observer, per family.
///
/// Dispatch snapshots the list before calling out, so an observer may
/// subscribe or unsubscribe from inside a callback.
#[derive(Default)]
pub(crate) struct Observers {
    next_id: AtomicU64,
    connection: Slots<dyn ConnectionObserver>,
    message: Slots<dyn MessageObserver>,
    file: Slots<dyn FileObserver>,
}

impl Observers {
    fn next_id(&self) -> SubscriptionId {
        SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1)
    }

    pub(crate) fn add_connection(
        &self,
        observer: Arc<dyn ConnectionObserver>,
    ) -> SubscriptionId {
        let id = self.next_id();
        lock(&self.connection).push((id, observer));
        id
    }

    pub(crate) fn add_message(
        &self,
        observer: Arc<dyn MessageObserver>,
    ) -> SubscriptionId {
        let id = self.next_id();
        lock(&self.message).push((id, observer));
        id
    }

    pub(crate) fn add_file(&self, observer: Arc<dyn FileObserver>) -> SubscriptionId {
        let id = self.next_id();
        lock(&self.file).push((id, observer));
        id
    }

    /// Removes the subscription from whichever family holds it.
    pub(crate) fn remove(&self, id: SubscriptionId) -> bool {
        remove_from(&self.connection, id)
            || remove_from(&self.message, id)
            || remove_from(&self.file, id)
    }

    /// Whether anyone is listening for messages. Used to decide between a
    /// notification and marking a received message as seen.
    pub(crate) fn has_message_observers(&self) -> bool {
        !lock(&self.message).is_empty()
    }

    pub(crate) fn notify_connection(&self, event: &ConnectionEvent) {
        for observer in snapshot(&self.connection) {
            observer.on_connection_event(event);
        }
    }

    pub(crate) fn notify_message(&self, event: &MessageEvent) {
        for observer in snapshot(&self.message) {
            observer.on_message_event(event);
        }
    }

    pub(crate) fn notify_file(&self, event: &FileEvent) {
        for observer in snapshot(&self.file) {
            observer.on_file_event(event);
        }
    }
}

fn lock<T: ?Sized>(
    slots: &Slots<T>,
) -> std::sync::MutexGuard<'_, Vec<(SubscriptionId, Arc<T>)>> {
    slots.lock().unwrap_or_else(PoisonError::into_inner)
}

fn snapshot<T: ?Sized>(slots: &Slots<T>) -> Vec<Arc<T>> {
    lock(slots).iter().map(|(_, o)| Arc::clone(o)).collect()
}

fn remove_from<T: ?Sized>(slots: &Slots<T>, id: SubscriptionId) -> bool {
    let mut slots = lock(slots);
    let before = slots.len();
    slots.retain(|(sub, _)| *sub != id);
    slots.len() != before
}
