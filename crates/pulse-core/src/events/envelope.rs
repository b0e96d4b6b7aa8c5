//! Envelopes for frames crossing the persistent event channel.

use serde::{Deserialize, Serialize};

use crate::types::{ConversationId, MessageId, UserId};

use super::call::CallSignal;
use super::conversation::{MessagePosted, ReadReceipt, TypingUpdate};
use super::presence::PresenceUpdate;

/// Frames sent by the client runtime to the dispatcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    /// Start receiving live signals for a conversation being viewed.
    JoinConversation {
        /// The conversation to join.
        conversation_id: ConversationId,
    },
    /// Stop receiving live signals for a conversation.
    LeaveConversation {
        /// The conversation to leave.
        conversation_id: ConversationId,
    },
    /// Typing indicator for a joined conversation.
    Typing {
        /// The conversation being typed in.
        conversation_id: ConversationId,
        /// Whether typing is in progress.
        is_typing: bool,
    },
    /// The user read up to a message.
    MarkRead {
        /// The conversation.
        conversation_id: ConversationId,
        /// Newest message covered by the receipt.
        message_id: MessageId,
    },
    /// Relay a call signal to another user's devices.
    Call {
        /// Target user.
        to: UserId,
        /// The signal to relay.
        signal: CallSignal,
    },
    /// Activity-bearing ping that resets the presence decay clock.
    Activity,
    /// Pong response to a server ping.
    Pong,
}

/// Frames pushed by the dispatcher to a client runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Conversation join confirmed.
    Joined {
        /// The joined conversation.
        conversation_id: ConversationId,
    },
    /// A contact's presence changed.
    Presence(PresenceUpdate),
    /// A participant's typing state changed.
    Typing(TypingUpdate),
    /// A participant read up to a message.
    ReadReceipt(ReadReceipt),
    /// A new message reached a joined conversation.
    Message(MessagePosted),
    /// A call signal addressed to this user.
    Call {
        /// The user whose machine sent it.
        from: UserId,
        /// The signal.
        signal: CallSignal,
    },
    /// Server keepalive; the client must answer with
    /// [`ClientEvent::Pong`].
    Ping,
    /// A request was dropped.
    Error {
        /// Machine-readable code.
        code: String,
        /// Human-readable description.
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::presence::PresenceStatus;

    #[test]
    fn test_client_event_tagged_encoding() {
        let event = ClientEvent::Typing {
            conversation_id: ConversationId::new(),
            is_typing: true,
        };
        let json = serde_json::to_value(&event).expect("serialize");
        assert_eq!(json.get("type").unwrap(), "typing");
    }

    #[test]
    fn test_server_event_roundtrip() {
        let event = ServerEvent::Presence(PresenceUpdate {
            user_id: UserId::new(),
            status: PresenceStatus::Online,
            last_seen_at: chrono::Utc::now(),
        });
        let json = serde_json::to_string(&event).expect("serialize");
        let parsed: ServerEvent = serde_json::from_str(&json).expect("deserialize");
        match parsed {
            ServerEvent::Presence(update) => assert_eq!(update.status, PresenceStatus::Online),
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
