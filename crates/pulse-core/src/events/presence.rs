//! Presence status and fan-out payload.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::UserId;

/// A user's reachability status as observed by the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresenceStatus {
    /// Connected and recently active.
    Online,
    /// Connected but idle past the first decay threshold.
    RecentlyActive,
    /// Connected but idle past the second decay threshold.
    Away,
    /// No live connections.
    Offline,
}

impl PresenceStatus {
    /// Parses from a string with a default fallback.
    pub fn from_str_or_default(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "online" => Self::Online,
            "recently_active" => Self::RecentlyActive,
            "away" => Self::Away,
            "offline" => Self::Offline,
            _ => Self::Offline,
        }
    }

    /// Converts to string.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Online => "online",
            Self::RecentlyActive => "recently_active",
            Self::Away => "away",
            Self::Offline => "offline",
        }
    }
}

/// Presence transition broadcast to a user's accepted contacts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceUpdate {
    /// The user whose status changed.
    pub user_id: UserId,
    /// The new status.
    pub status: PresenceStatus,
    /// When the user was last active, for last-seen display.
    pub last_seen_at: DateTime<Utc>,
}
