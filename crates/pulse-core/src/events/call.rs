//! Call-signaling wire types.

use serde::{Deserialize, Serialize};

use crate::types::{CallId, ConversationId, UserId};

/// Media mode requested for a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallMode {
    /// Microphone only.
    Audio,
    /// Microphone and camera.
    Video,
}

/// Why a call session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallEndReason {
    /// A party hung up after the call was established.
    Hangup,
    /// The callee declined the incoming call.
    Rejected,
    /// The ring window elapsed with no answer.
    NoAnswer,
    /// The peer's channel dropped mid-session.
    PeerUnreachable,
    /// Local media could not be acquired.
    MediaUnavailable,
}

impl CallEndReason {
    /// Converts to string.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Hangup => "hangup",
            Self::Rejected => "rejected",
            Self::NoAnswer => "no_answer",
            Self::PeerUnreachable => "peer_unreachable",
            Self::MediaUnavailable => "media_unavailable",
        }
    }
}

/// Opaque negotiated-capabilities blob exchanged to set up a media session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionDescription(pub String);

/// One possible network path proposed during connectivity negotiation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IceCandidate(pub String);

/// One step of the offer/answer/candidate exchange between two call
/// machines, relayed through the target user's room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CallSignal {
    /// Caller proposes a session.
    Offer {
        /// The call session being opened.
        call_id: CallId,
        /// The conversation the call belongs to.
        conversation_id: ConversationId,
        /// Initiating user.
        caller_id: UserId,
        /// Target user.
        callee_id: UserId,
        /// Requested media mode.
        mode: CallMode,
        /// Caller's session description.
        sdp: SessionDescription,
    },
    /// Callee's runtime acknowledges the offer reached a live device
    /// (distinct from the callee accepting).
    RingAck {
        /// The call session.
        call_id: CallId,
    },
    /// Callee accepted and answered.
    Answer {
        /// The call session.
        call_id: CallId,
        /// Callee's session description.
        sdp: SessionDescription,
    },
    /// A connectivity candidate from either side.
    Candidate {
        /// The call session.
        call_id: CallId,
        /// The proposed network path.
        candidate: IceCandidate,
    },
    /// Either side tore the session down.
    Terminate {
        /// The call session.
        call_id: CallId,
        /// Why it ended.
        reason: CallEndReason,
    },
}

impl CallSignal {
    /// The session this signal belongs to.
    pub fn call_id(&self) -> CallId {
        match self {
            Self::Offer { call_id, .. }
            | Self::RingAck { call_id }
            | Self::Answer { call_id, .. }
            | Self::Candidate { call_id, .. }
            | Self::Terminate { call_id, .. } => *call_id,
        }
    }
}
