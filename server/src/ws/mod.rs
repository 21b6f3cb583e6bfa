//! Live book updates over WebSocket.
//!
//! Every connected client is a [`ClientHandle`] in the [`ConnectionRegistry`].
//! Producers publish [`protocol::BookEvent`]s through a [`broadcast::Notifier`];
//! a single delivery loop fans each event out to every registered client.

pub mod actor;
pub mod broadcast;
pub mod handler;
pub mod protocol;
pub mod registry;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use axum::extract::ws::Message;
use tokio::sync::mpsc;

pub use registry::ConnectionRegistry;

/// Type alias for the sender half of a WebSocket connection's outbox.
/// The connection's writer task owns the receiving half.
pub type ConnectionSender = mpsc::UnboundedSender<Message>;

/// Process-unique identity of one accepted connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Returned when a client's writer task has already terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientGone;

/// Handle to one connected peer. Clones share the same identity.
#[derive(Debug, Clone)]
pub struct ClientHandle {
    id: ConnectionId,
    sender: ConnectionSender,
}

impl ClientHandle {
    pub fn new(sender: ConnectionSender) -> Self {
        Self {
            id: ConnectionId::next(),
            sender,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Queue a frame for the writer task. Fails once the connection is gone.
    pub fn send(&self, msg: Message) -> Result<(), ClientGone> {
        self.sender.send(msg).map_err(|_| ClientGone)
    }
}
