//! Call lifecycle states.

use serde::{Deserialize, Serialize};

/// Which side of the call this machine is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallRole {
    /// This side initiated the call.
    Caller,
    /// This side received the offer.
    Callee,
}

/// Lifecycle state of one call session.
///
/// Every UI flag (ringing, in-call, call-over) derives from this enum;
/// nothing maintains a parallel boolean.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallState {
    /// No session in progress.
    Idle,
    /// Offer published, waiting for the callee's runtime to acknowledge.
    Dialing,
    /// Caller: offer acknowledged, waiting for an answer.
    /// Callee: offer received, waiting for the user to accept or reject.
    Ringing,
    /// Descriptions exchanged, connectivity negotiation under way.
    Negotiating,
    /// Media session established.
    Connected,
    /// The session is over; see the session's end reason.
    Ended,
}

impl CallState {
    /// Whether the session is past the point of no return.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Ended)
    }

    /// Whether a session is live enough that channel loss must end it.
    pub fn is_active(&self) -> bool {
        !matches!(self, Self::Idle | Self::Ended)
    }
}
