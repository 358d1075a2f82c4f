//! Session-loss notifications.
//!
//! Any 401/403 seen by the client is fanned out to every subscriber so the
//! UI can force a fresh login instead of reporting a per-call failure.

use std::sync::Mutex;

use crossbeam_channel::{Receiver, Sender, unbounded};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthEvent {
    /// The server rejected the session with the given status.
    Unauthorized { code: u16 },
}

#[derive(Default)]
pub(crate) struct AuthBroadcast {
    subscribers: Mutex<Vec<Sender<AuthEvent>>>,
}

impl AuthBroadcast {
    pub(crate) fn subscribe(&self) -> Receiver<AuthEvent> {
        let (tx, rx) = unbounded();
        self.lock().push(tx);
        rx
    }

    /// Deliver to live subscribers, dropping those whose receiver is gone.
    pub(crate) fn emit(&self, event: AuthEvent) {
        let mut subs = self.lock();
        subs.retain(|tx| tx.send(event).is_ok());
        tracing::debug!(?event, subscribers = subs.len(), "auth event broadcast");
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Sender<AuthEvent>>> {
        self.subscribers.lock().unwrap_or_else(|e| e.into_inner())
    }
}
