//! Wire events crossing the dispatcher.
//!
//! These types are the protocol spoken over the persistent per-user event
//! channel: presence fan-out, conversation signals (typing, read receipts,
//! message delivery), and call signaling. Both the server dispatcher and
//! the client runtime depend on this module.

pub mod call;
pub mod conversation;
pub mod envelope;
pub mod presence;

pub use call::{CallEndReason, CallMode, CallSignal, IceCandidate, SessionDescription};
pub use conversation::{MessagePosted, ReadReceipt, TypingUpdate};
pub use envelope::{ClientEvent, ServerEvent};
pub use presence::{PresenceStatus, PresenceUpdate};
