//! Per-user presence record.

use chrono::{DateTime, Utc};

use pulse_core::events::PresenceStatus;
use pulse_core::types::UserId;

/// One logical user's presence state, owned by the registry.
///
/// Only the registry partition holding the record ever mutates it; all
/// other components observe it through broadcasts.
#[derive(Debug, Clone)]
pub struct PresenceRecord {
    /// The user.
    pub user_id: UserId,
    /// Most recent status transition result.
    pub status: PresenceStatus,
    /// Last activity-bearing event, retained for last-seen display.
    pub last_activity_at: DateTime<Utc>,
    /// When the current status was entered.
    pub status_since: DateTime<Utc>,
    /// Live connections for this user (web + mobile + extra tabs).
    pub connection_count: u32,
}

impl PresenceRecord {
    /// Creates a record for a user's first connection.
    pub fn new(user_id: UserId, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            status: PresenceStatus::Online,
            last_activity_at: now,
            status_since: now,
            connection_count: 1,
        }
    }

    /// Applies a status transition, stamping `status_since`.
    pub fn transition(&mut self, status: PresenceStatus, now: DateTime<Utc>) {
        self.status = status;
        self.status_since = now;
    }
}
