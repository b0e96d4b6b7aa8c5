//! Room dispatcher — the sole fan-out path for server-observed state.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, trace};

use pulse_core::events::ServerEvent;

use crate::connection::handle::ConnectionId;
use crate::connection::pool::ConnectionPool;

use super::membership::MembershipIndex;
use super::room::{Room, RoomId};

/// Routes events to multicast rooms of connections.
///
/// Membership mutation is idempotent in both directions and confined to
/// this component; nothing else touches the room tables. Delivery is
/// at-most-once and best-effort: a connection with a full buffer or a
/// closed receiver simply misses the event, and the next current-state
/// event supersedes it.
#[derive(Debug)]
pub struct RoomDispatcher {
    /// Room ID → room.
    rooms: DashMap<RoomId, Room>,
    /// Reverse index for disconnect cleanup.
    memberships: MembershipIndex,
    /// Pool used to resolve member connection IDs to live handles.
    pool: Arc<ConnectionPool>,
}

impl RoomDispatcher {
    /// Creates a new dispatcher over a connection pool.
    pub fn new(pool: Arc<ConnectionPool>) -> Self {
        Self {
            rooms: DashMap::new(),
            memberships: MembershipIndex::new(),
            pool,
        }
    }

    /// Adds a connection to a room. Joining a room the connection already
    /// belongs to is a no-op.
    pub fn join(&self, room: RoomId, conn_id: ConnectionId) {
        self.rooms
            .entry(room)
            .or_insert_with(|| Room::new(room))
            .join(conn_id);
        self.memberships.add(conn_id, room);
        trace!(room = %room, conn_id = %conn_id, "Joined room");
    }

    /// Removes a connection from a room. Leaving a room it does not belong
    /// to is a no-op, never an error.
    pub fn leave(&self, room: RoomId, conn_id: ConnectionId) {
        if let Some(mut entry) = self.rooms.get_mut(&room) {
            entry.leave(conn_id);
            if entry.is_empty() {
                drop(entry);
                self.rooms.remove(&room);
            }
        }
        self.memberships.remove(conn_id, &room);
    }

    /// Removes a connection from every room it belongs to (disconnect path).
    pub fn leave_all(&self, conn_id: ConnectionId) {
        let rooms = self.memberships.remove_all(conn_id);
        for room in &rooms {
            if let Some(mut entry) = self.rooms.get_mut(room) {
                entry.leave(conn_id);
                if entry.is_empty() {
                    drop(entry);
                    self.rooms.remove(room);
                }
            }
        }
        if !rooms.is_empty() {
            debug!(conn_id = %conn_id, count = rooms.len(), "Left all rooms");
        }
    }

    /// Whether a connection is currently a member of a room.
    pub fn is_member(&self, room: &RoomId, conn_id: ConnectionId) -> bool {
        self.rooms
            .get(room)
            .map(|entry| entry.members.contains(&conn_id))
            .unwrap_or(false)
    }

    /// Number of rooms a connection belongs to.
    pub fn membership_count(&self, conn_id: ConnectionId) -> usize {
        self.memberships.count(conn_id)
    }

    /// Delivers an event to every connection bound to a room.
    ///
    /// `exclude` skips the publisher's own channel for broadcast-to-others
    /// semantics; pass `None` to echo to the sender's other devices too.
    /// Returns the number of connections the event was handed to.
    pub fn publish(
        &self,
        room: &RoomId,
        event: &ServerEvent,
        exclude: Option<ConnectionId>,
    ) -> usize {
        let member_ids = match self.rooms.get(room) {
            Some(entry) => entry.member_ids(),
            None => return 0,
        };

        let mut delivered = 0;
        for conn_id in member_ids {
            if Some(conn_id) == exclude {
                continue;
            }
            if let Some(handle) = self.pool.get(&conn_id) {
                if handle.send(event.clone()) {
                    delivered += 1;
                }
            }
        }

        trace!(room = %room, delivered, "Published event");
        delivered
    }

    /// Returns total number of active rooms.
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }
}
