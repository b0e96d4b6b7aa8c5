//! # pulse-client
//!
//! Client runtime for Pulse. Provides:
//!
//! - The supervised persistent event channel with reconnect/backoff
//! - The call-signaling state machine (caller and callee sides)
//! - The ringing/feedback controller
//! - Transport, media, and peer-connection collaborator traits, plus a
//!   tokio-tungstenite transport implementation
//!
//! The state machine never touches the network directly; every signal it
//! emits goes through the channel supervisor's outbound queue.

pub mod call;
pub mod channel;
pub mod ringer;
pub mod transport;

pub use call::machine::CallMachine;
pub use call::manager::CallManager;
pub use call::state::{CallRole, CallState};
pub use channel::{ChannelStatus, ChannelSupervisor};
pub use ringer::RingController;
pub use transport::ws::WsTransport;
