//! # pulse-realtime
//!
//! Real-time engine for Pulse. Provides:
//!
//! - The presence registry with connection counting and status decay
//! - The room-based event dispatcher (per-user and per-conversation fan-out)
//! - WebSocket connection management with app-level heartbeat
//! - Relay of call signaling between user rooms
//!
//! Persistence and the social graph are reached only through the
//! collaborator traits in `pulse-core`.

pub mod connection;
pub mod directory;
pub mod presence;
pub mod room;
pub mod server;
pub mod socket;

pub use connection::manager::ConnectionManager;
pub use presence::registry::PresenceRegistry;
pub use room::dispatcher::RoomDispatcher;
pub use server::RealtimeEngine;
