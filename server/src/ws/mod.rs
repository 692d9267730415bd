pub mod actor;
pub mod broadcast;
pub mod handler;
pub mod protocol;
pub mod registry;

use tokio::sync::mpsc;
use uuid::Uuid;

pub use registry::{ConnectionRegistry, Membership};

/// Type alias for the sender half of a WebSocket connection's channel.
/// Other parts of the system can clone this to push messages to a specific client.
pub type ConnectionSender = mpsc::UnboundedSender<axum::extract::ws::Message>;

/// Identity of one live WebSocket connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Handle to one live bidirectional channel. Clones share the same channel;
/// equality is by connection id.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    sender: ConnectionSender,
}

impl ConnectionHandle {
    pub fn new(sender: ConnectionSender) -> Self {
        Self {
            id: ConnectionId::new(),
            sender,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Push a frame. Returns false if the connection's writer is gone.
    pub fn push(&self, msg: axum::extract::ws::Message) -> bool {
        self.sender.send(msg).is_ok()
    }
}

impl PartialEq for ConnectionHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ConnectionHandle {}
