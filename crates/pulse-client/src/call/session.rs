//! Per-session call data.

use std::collections::VecDeque;

use pulse_core::events::{CallEndReason, CallMode, IceCandidate, SessionDescription};
use pulse_core::types::{CallId, ConversationId, UserId};

use super::media::LocalMedia;
use super::state::{CallRole, CallState};

/// The local half of one call session.
///
/// Mutated only by the owning state machine; the remote half is only ever
/// read from inbound signals.
#[derive(Debug)]
pub struct CallSession {
    /// The session.
    pub call_id: CallId,
    /// Conversation the call belongs to.
    pub conversation_id: ConversationId,
    /// Initiating user.
    pub caller_id: UserId,
    /// Receiving user.
    pub callee_id: UserId,
    /// Requested media mode.
    pub mode: CallMode,
    /// Which side this machine is.
    pub role: CallRole,
    /// Lifecycle state.
    pub state: CallState,
    /// Local session description, at most one generation pending.
    pub local_description: Option<SessionDescription>,
    /// Remote session description, as received.
    pub remote_description: Option<SessionDescription>,
    /// Whether the remote description has been applied to the peer
    /// connection; candidates queue until it has.
    pub remote_applied: bool,
    /// Candidates received before the remote description existed, in
    /// arrival order. Drained exactly once when the description is set and
    /// never re-queued afterwards.
    pub pending_candidates: VecDeque<IceCandidate>,
    /// Acquired local capture, present from acquisition until `Ended`.
    pub local_media: Option<LocalMedia>,
    /// Why the session ended, set exactly once.
    pub end_reason: Option<CallEndReason>,
}

impl CallSession {
    /// Creates the caller-side session for an outgoing call.
    pub fn outgoing(
        call_id: CallId,
        conversation_id: ConversationId,
        caller_id: UserId,
        callee_id: UserId,
        mode: CallMode,
    ) -> Self {
        Self {
            call_id,
            conversation_id,
            caller_id,
            callee_id,
            mode,
            role: CallRole::Caller,
            state: CallState::Idle,
            local_description: None,
            remote_description: None,
            remote_applied: false,
            pending_candidates: VecDeque::new(),
            local_media: None,
            end_reason: None,
        }
    }

    /// Creates the callee-side session from a received offer.
    pub fn incoming(
        call_id: CallId,
        conversation_id: ConversationId,
        caller_id: UserId,
        callee_id: UserId,
        mode: CallMode,
        offer: SessionDescription,
    ) -> Self {
        Self {
            call_id,
            conversation_id,
            caller_id,
            callee_id,
            mode,
            role: CallRole::Callee,
            state: CallState::Idle,
            local_description: None,
            remote_description: Some(offer),
            remote_applied: false,
            pending_candidates: VecDeque::new(),
            local_media: None,
            end_reason: None,
        }
    }

    /// The user on the other end of this session.
    pub fn peer_id(&self) -> UserId {
        match self.role {
            CallRole::Caller => self.callee_id,
            CallRole::Callee => self.caller_id,
        }
    }
}
