//! Room-based event fan-out.

pub mod dispatcher;
pub mod membership;
pub mod room;

pub use dispatcher::RoomDispatcher;
pub use room::{Room, RoomId};
