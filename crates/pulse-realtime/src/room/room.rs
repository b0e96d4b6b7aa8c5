//! Single multicast room with member tracking.

use std::collections::HashSet;
use std::fmt;

use pulse_core::types::{ConversationId, UserId};

use crate::connection::handle::ConnectionId;

/// Identifier of a multicast group of channels.
///
/// User rooms are auto-joined on connect and carry presence and call
/// signaling; conversation rooms are joined while a conversation view is
/// open and carry typing, read receipts, and live message delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RoomId {
    /// All of one user's connections.
    User(UserId),
    /// All connections currently viewing one conversation.
    Conversation(ConversationId),
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User(id) => write!(f, "user:{id}"),
            Self::Conversation(id) => write!(f, "conversation:{id}"),
        }
    }
}

/// A single room with a set of member connections.
#[derive(Debug, Clone)]
pub struct Room {
    /// Room identifier.
    pub id: RoomId,
    /// Set of member connection IDs.
    pub members: HashSet<ConnectionId>,
}

impl Room {
    /// Creates a new empty room.
    pub fn new(id: RoomId) -> Self {
        Self {
            id,
            members: HashSet::new(),
        }
    }

    /// Adds a member.
    pub fn join(&mut self, conn_id: ConnectionId) {
        self.members.insert(conn_id);
    }

    /// Removes a member.
    pub fn leave(&mut self, conn_id: ConnectionId) {
        self.members.remove(&conn_id);
    }

    /// Returns member count.
    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    /// Returns whether the room has any members.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Returns all member connection IDs.
    pub fn member_ids(&self) -> Vec<ConnectionId> {
        self.members.iter().copied().collect()
    }
}
