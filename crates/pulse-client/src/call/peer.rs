//! Peer-connection collaborator.

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};

use pulse_core::events::{CallMode, IceCandidate, SessionDescription};
use pulse_core::AppResult;

/// Connectivity of the underlying media transport.
///
/// Convergence to `Connected` is the transport's own signal, not a
/// protocol message; the state machine only observes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// Negotiation has not converged yet.
    New,
    /// A usable path was found.
    Connected,
    /// The link failed and will not recover.
    Failed,
}

/// One session's media peer connection.
#[async_trait]
pub trait PeerConnector: Send + Sync + std::fmt::Debug + 'static {
    /// Generates the local session description for an outgoing call.
    async fn create_offer(&self) -> AppResult<SessionDescription>;

    /// Generates the local session description answering the stored remote
    /// offer.
    async fn create_answer(&self) -> AppResult<SessionDescription>;

    /// Applies the remote side's session description.
    async fn set_remote_description(&self, description: SessionDescription) -> AppResult<()>;

    /// Applies one remote connectivity candidate.
    async fn add_remote_candidate(&self, candidate: IceCandidate) -> AppResult<()>;

    /// Observable connectivity of the link.
    fn connectivity(&self) -> watch::Receiver<LinkState>;

    /// Stream of locally gathered candidates, handed over once to the
    /// owning state machine.
    fn local_candidates(&self) -> mpsc::Receiver<IceCandidate>;

    /// Tears the connection down.
    async fn close(&self);
}

/// Builds one [`PeerConnector`] per call session.
pub trait PeerFactory: Send + Sync + std::fmt::Debug + 'static {
    /// Creates a connector configured for a media mode.
    fn connector(&self, mode: CallMode) -> std::sync::Arc<dyn PeerConnector>;
}
