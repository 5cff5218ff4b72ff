//! Live connection handles
//!
//! A connection is the gateway's view of one open transport: who it belongs
//! to and the queue its writer task drains.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;

use crate::backend::auth::UserIdentity;
use crate::shared::ServerEvent;

/// Process-unique identifier of one live connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Hands out increasing connection IDs, starting at 1
#[derive(Debug, Default)]
pub struct ConnectionIdGenerator {
    next: AtomicU64,
}

impl ConnectionIdGenerator {
    pub fn next_id(&self) -> ConnectionId {
        ConnectionId(self.next.fetch_add(1, Ordering::Relaxed) + 1)
    }
}

/// Default number of events a connection may have queued before it is
/// treated as a slow consumer
pub const DEFAULT_QUEUE_CAPACITY: usize = 1000;

/// Outbound queue of one connection
pub type EventSender = mpsc::Sender<ServerEvent>;
pub type EventReceiver = mpsc::Receiver<ServerEvent>;

/// Result of queueing one event on a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Queued,
    /// The client stopped reading and the queue is at capacity
    Full,
    /// The writer side is gone
    Closed,
}

/// What the gateway keeps per `Active` connection
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    pub id: ConnectionId,
    pub user: UserIdentity,
    sender: EventSender,
}

impl ConnectionHandle {
    pub fn new(id: ConnectionId, user: UserIdentity, sender: EventSender) -> Self {
        Self { id, user, sender }
    }

    /// Queue an event without waiting. A full or closed queue drops the
    /// event; the caller decides whether that warrants a disconnect.
    pub fn send(&self, event: ServerEvent) -> Delivery {
        match self.sender.try_send(event) {
            Ok(()) => Delivery::Queued,
            Err(mpsc::error::TrySendError::Full(_)) => Delivery::Full,
            Err(mpsc::error::TrySendError::Closed(_)) => Delivery::Closed,
        }
    }
}
