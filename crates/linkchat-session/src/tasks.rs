//! The tasks a session runs: listener, connector and engine pump.
//!
//! Each task holds a `Weak` reference back to the session and the
//! generation it was started under. Every callback re-enters the session's
//! critical section, where a generation mismatch means the task has been
//! replaced and whatever it brings is dropped.
//!
//! ```text
//!   listener  ── accept() ──→ adopt(gen, channel, Incoming)
//!   connector ── dial()   ──→ adopt(gen, channel, Outgoing) | dial_failed(gen)
//!   pump      ── events   ──→ on_engine_event(gen, event)
//! ```
//!
//! Cancelling a task is dropping its [`TaskHandle`]: the task is aborted,
//! and with it the endpoint, dial future or event queue it was blocked on.

use std::future::Future;
use std::sync::{Arc, Weak};

use linkchat_transfer::EngineEvents;
use linkchat_transport::{Listener, PeerAddress, Transport};
use tokio::task::JoinHandle;

use crate::ConnectionRole;
use crate::session::Inner;

// ---------------------------------------------------------------------------
// TaskHandle
// ---------------------------------------------------------------------------

/// Owns a spawned task and aborts it when dropped.
#[derive(Debug)]
pub(crate) struct TaskHandle(Option<JoinHandle<()>>);

impl TaskHandle {
    pub(crate) fn spawn<F>(future: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        Self(Some(tokio::spawn(future)))
    }

    /// Aborts the task and hands back its join handle, so a successor can
    /// wait until the task (and the resources it held) are really gone.
    pub(crate) fn retire(mut self) -> Option<JoinHandle<()>> {
        let handle = self.0.take()?;
        handle.abort();
        Some(handle)
    }
}

impl Drop for TaskHandle {
    fn drop(&mut self) {
        if let Some(handle) = &self.0 {
            handle.abort();
        }
    }
}

// ---------------------------------------------------------------------------
// Tasks
// ---------------------------------------------------------------------------

/// Opens the passive endpoint and accepts until cancelled.
///
/// `previous` is the last listener's join handle. Its endpoint must be
/// closed before a new one can be opened on the same address.
pub(crate) async fn listen<T: Transport>(
    session: Weak<Inner<T>>,
    transport: Arc<T>,
    generation: u64,
    previous: Option<JoinHandle<()>>,
) {
    if let Some(previous) = previous {
        let _ = previous.await;
    }

    let mut listener = match transport.listen().await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::warn!(generation, error = %e, "cannot open listening endpoint");
            return;
        }
    };
    tracing::debug!(generation, "listener ready");

    loop {
        let channel = match listener.accept().await {
            Ok(channel) => channel,
            Err(e) => {
                tracing::warn!(generation, error = %e, "accept failed, listener stopped");
                return;
            }
        };
        let Some(session) = session.upgrade() else {
            return;
        };
        session
            .adopt(generation, channel, ConnectionRole::Incoming)
            .await;
    }
}

/// One outbound connection attempt.
pub(crate) async fn dial<T: Transport>(
    session: Weak<Inner<T>>,
    transport: Arc<T>,
    generation: u64,
    peer: PeerAddress,
) {
    let result = transport.dial(&peer).await;
    let Some(session) = session.upgrade() else {
        return;
    };
    match result {
        Ok(channel) => {
            session
                .adopt(generation, channel, ConnectionRole::Outgoing)
                .await;
        }
        Err(e) => session.dial_failed(generation, &peer, e).await,
    }
}

/// Feeds one engine's events into the session, in order.
pub(crate) async fn pump<T: Transport>(
    session: Weak<Inner<T>>,
    generation: u64,
    mut events: EngineEvents,
) {
    while let Some(event) = events.recv().await {
        let Some(session) = session.upgrade() else {
            return;
        };
        session.on_engine_event(generation, event).await;
    }
    tracing::debug!(generation, "engine events drained");
}
