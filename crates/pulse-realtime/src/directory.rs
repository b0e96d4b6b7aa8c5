//! In-memory collaborator implementations.
//!
//! The server binary and the test suite run against these until the
//! profile/CRUD service is wired in; they expose the same mutation surface
//! that service would drive.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::collections::HashSet;

use pulse_core::traits::{ContactDirectory, PresenceStore};
use pulse_core::types::{ConversationId, UserId};
use pulse_core::AppResult;

/// In-memory social graph.
#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    contacts: DashMap<UserId, HashSet<UserId>>,
    conversations: DashMap<ConversationId, HashSet<UserId>>,
}

impl InMemoryDirectory {
    /// Creates an empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an accepted contact relationship in both directions.
    pub fn add_contact_pair(&self, a: UserId, b: UserId) {
        self.contacts.entry(a).or_default().insert(b);
        self.contacts.entry(b).or_default().insert(a);
    }

    /// Sets the participant list of a conversation.
    pub fn set_conversation(&self, conversation_id: ConversationId, members: &[UserId]) {
        self.conversations
            .insert(conversation_id, members.iter().copied().collect());
    }
}

#[async_trait]
impl ContactDirectory for InMemoryDirectory {
    async fn accepted_contacts(&self, user_id: UserId) -> AppResult<Vec<UserId>> {
        Ok(self
            .contacts
            .get(&user_id)
            .map(|entry| entry.value().iter().copied().collect())
            .unwrap_or_default())
    }

    async fn conversation_members(
        &self,
        conversation_id: ConversationId,
    ) -> AppResult<Vec<UserId>> {
        Ok(self
            .conversations
            .get(&conversation_id)
            .map(|entry| entry.value().iter().copied().collect())
            .unwrap_or_default())
    }
}

/// In-memory presence rows, useful for asserting durable writes in tests.
#[derive(Debug, Default)]
pub struct InMemoryPresenceStore {
    rows: DashMap<UserId, (String, DateTime<Utc>)>,
}

impl InMemoryPresenceStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads back the persisted status for a user.
    pub fn status_row(&self, user_id: &UserId) -> Option<(String, DateTime<Utc>)> {
        self.rows.get(user_id).map(|entry| entry.value().clone())
    }
}

#[async_trait]
impl PresenceStore for InMemoryPresenceStore {
    async fn set_status(
        &self,
        user_id: UserId,
        status: &str,
        last_seen_at: DateTime<Utc>,
    ) -> AppResult<()> {
        self.rows.insert(user_id, (status.to_string(), last_seen_at));
        Ok(())
    }
}
