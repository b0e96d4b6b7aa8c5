//! Durable presence persistence.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::result::AppResult;
use crate::types::UserId;

/// Fire-and-forget durable write of a presence transition.
///
/// A failure here is logged and never blocks the in-memory broadcast; the
/// durable row only backs last-seen display across restarts.
#[async_trait]
pub trait PresenceStore: Send + Sync + std::fmt::Debug + 'static {
    /// Persist the latest status for a user.
    async fn set_status(
        &self,
        user_id: UserId,
        status: &str,
        last_seen_at: DateTime<Utc>,
    ) -> AppResult<()>;
}
