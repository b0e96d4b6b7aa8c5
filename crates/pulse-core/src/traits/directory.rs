//! Social-graph lookups used to scope event fan-out.

use async_trait::async_trait;

use crate::result::AppResult;
use crate::types::{ConversationId, UserId};

/// Read-only view of the social graph owned by the CRUD layer.
///
/// The registry uses it to scope presence fan-out to accepted contacts;
/// the dispatcher uses it to authorize conversation-room joins.
#[async_trait]
pub trait ContactDirectory: Send + Sync + std::fmt::Debug + 'static {
    /// Users who have an accepted contact relationship with `user_id`.
    async fn accepted_contacts(&self, user_id: UserId) -> AppResult<Vec<UserId>>;

    /// Participants of a conversation.
    async fn conversation_members(&self, conversation_id: ConversationId)
        -> AppResult<Vec<UserId>>;
}
