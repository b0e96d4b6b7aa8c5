//! Transport abstraction for the persistent event channel.
//!
//! `connect` hands back a send half and a receive queue, so the supervisor
//! can await inbound frames and write outbound frames concurrently.
//! Reconnect policy lives above this boundary, in
//! [`crate::channel::ChannelSupervisor`].

pub mod ws;

use async_trait::async_trait;
use tokio::sync::mpsc;

use pulse_core::events::{ClientEvent, ServerEvent};
use pulse_core::AppResult;

/// Factory for one persistent connection to the dispatcher.
#[async_trait]
pub trait SignalTransport: Send + Sync + std::fmt::Debug + 'static {
    /// Opens a fresh connection.
    ///
    /// Returns the send half and the inbound frame queue. The queue ends
    /// (`recv` → `None`) when the connection is gone.
    async fn connect(&self) -> AppResult<(Box<dyn TransportSink>, mpsc::Receiver<ServerEvent>)>;
}

/// Send half of one live connection.
#[async_trait]
pub trait TransportSink: Send {
    /// Sends one frame to the dispatcher.
    async fn send(&mut self, event: ClientEvent) -> AppResult<()>;

    /// Closes the connection.
    async fn close(&mut self);
}
