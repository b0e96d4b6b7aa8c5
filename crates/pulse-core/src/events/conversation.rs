//! Conversation-scoped live signals.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{ConversationId, MessageId, UserId};

/// A participant started or stopped typing in a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypingUpdate {
    /// The conversation being typed in.
    pub conversation_id: ConversationId,
    /// The participant typing.
    pub user_id: UserId,
    /// Whether typing is in progress.
    pub is_typing: bool,
}

/// A participant read up to a message in a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadReceipt {
    /// The conversation the receipt belongs to.
    pub conversation_id: ConversationId,
    /// The reader.
    pub user_id: UserId,
    /// The newest message covered by the receipt.
    pub message_id: MessageId,
    /// When the reader saw it.
    pub read_at: DateTime<Utc>,
}

/// A message was persisted by the CRUD layer and should reach live viewers.
///
/// The durable representation of the message is owned by the CRUD layer;
/// this event only carries what a live conversation view needs to render.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagePosted {
    /// The message ID assigned at persistence time.
    pub message_id: MessageId,
    /// The conversation it was posted to.
    pub conversation_id: ConversationId,
    /// The author.
    pub sender_id: UserId,
    /// Rendered message body.
    pub body: String,
    /// Persistence timestamp.
    pub sent_at: DateTime<Utc>,
}
