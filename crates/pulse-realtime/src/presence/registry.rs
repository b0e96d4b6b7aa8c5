//! Presence registry — connection counting, transition rules, and decay.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::{debug, warn};

use pulse_core::config::presence::PresenceConfig;
use pulse_core::events::{PresenceStatus, PresenceUpdate, ServerEvent};
use pulse_core::traits::{ContactDirectory, PresenceStore};
use pulse_core::types::UserId;

use crate::room::dispatcher::RoomDispatcher;
use crate::room::room::RoomId;

use super::record::PresenceRecord;

/// Tracks presence state for all users and owns every status transition.
///
/// Each record is mutated only under its `DashMap` entry lock, so
/// connect/activity/disconnect for one user never race. Fan-out runs after
/// the lock is released and is scoped to the user's accepted contacts.
#[derive(Debug)]
pub struct PresenceRegistry {
    /// User ID → presence record.
    records: DashMap<UserId, PresenceRecord>,
    /// Fan-out path.
    dispatcher: Arc<RoomDispatcher>,
    /// Contact scoping for presence broadcasts.
    directory: Arc<dyn ContactDirectory>,
    /// Durable last-seen persistence (best-effort).
    store: Arc<dyn PresenceStore>,
    /// Decay thresholds.
    config: PresenceConfig,
}

impl PresenceRegistry {
    /// Creates a new presence registry.
    pub fn new(
        config: PresenceConfig,
        dispatcher: Arc<RoomDispatcher>,
        directory: Arc<dyn ContactDirectory>,
        store: Arc<dyn PresenceStore>,
    ) -> Self {
        Self {
            records: DashMap::new(),
            dispatcher,
            directory,
            store,
            config,
        }
    }

    /// Registers one more live connection for a user.
    ///
    /// A 0→1 transition marks the user `Online` and broadcasts to their
    /// accepted contacts.
    pub async fn on_connect(&self, user_id: UserId) {
        let now = Utc::now();
        let update = match self.records.entry(user_id) {
            Entry::Occupied(mut entry) => {
                let record = entry.get_mut();
                record.connection_count += 1;
                record.last_activity_at = now;
                if record.connection_count == 1 {
                    record.transition(PresenceStatus::Online, now);
                    Some(Self::update_of(record))
                } else {
                    None
                }
            }
            Entry::Vacant(vacant) => {
                let record = PresenceRecord::new(user_id, now);
                let update = Self::update_of(&record);
                vacant.insert(record);
                Some(update)
            }
        };

        if let Some(update) = update {
            debug!(user_id = %user_id, "User came online");
            self.broadcast(update).await;
        }
    }

    /// Records an activity-bearing event for a user.
    ///
    /// Resets the decay clock only; the sweeper owns status recomputation
    /// so that the status shown never disagrees with the status broadcast.
    pub fn on_activity(&self, user_id: UserId) {
        if let Some(mut record) = self.records.get_mut(&user_id) {
            record.last_activity_at = Utc::now();
        }
    }

    /// Unregisters one live connection for a user.
    ///
    /// Hitting zero connections broadcasts `Offline` immediately;
    /// `last_activity_at` is retained for last-seen display and the record
    /// itself expires after the grace window.
    pub async fn on_disconnect(&self, user_id: UserId) {
        let now = Utc::now();
        let update = match self.records.get_mut(&user_id) {
            Some(mut record) => {
                record.connection_count = record.connection_count.saturating_sub(1);
                if record.connection_count == 0 && record.status != PresenceStatus::Offline {
                    record.transition(PresenceStatus::Offline, now);
                    Some(Self::update_of(&record))
                } else {
                    None
                }
            }
            None => None,
        };

        if let Some(update) = update {
            debug!(user_id = %user_id, "User went offline");
            self.broadcast(update).await;
        }
    }

    /// A user's current status (`Offline` when unknown).
    pub fn status_of(&self, user_id: &UserId) -> PresenceStatus {
        self.records
            .get(user_id)
            .map(|record| record.status)
            .unwrap_or(PresenceStatus::Offline)
    }

    /// Live connection count for a user.
    pub fn connection_count(&self, user_id: &UserId) -> u32 {
        self.records
            .get(user_id)
            .map(|record| record.connection_count)
            .unwrap_or(0)
    }

    /// Number of tracked records (live or in the offline grace window).
    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    /// Runs one decay sweep at the current time.
    pub async fn sweep(&self) {
        self.sweep_at(Utc::now()).await;
    }

    /// Runs one decay sweep against an explicit clock.
    ///
    /// Connected records decay `Online → RecentlyActive → Away` and never
    /// further; zero-connection records are recomputed to `Offline` and
    /// dropped entirely once the grace window elapses. Every transition is
    /// broadcast exactly like a connect/disconnect transition.
    pub async fn sweep_at(&self, now: DateTime<Utc>) {
        let expire_after = Duration::seconds(self.config.expire_after_seconds as i64);
        let mut transitions = Vec::new();
        let mut expired = Vec::new();

        for mut entry in self.records.iter_mut() {
            let record = entry.value_mut();
            if record.connection_count == 0 {
                if record.status != PresenceStatus::Offline {
                    record.transition(PresenceStatus::Offline, now);
                    transitions.push(Self::update_of(record));
                } else if now - record.status_since >= expire_after {
                    expired.push(record.user_id);
                }
                continue;
            }

            let target = self.decayed_status(record, now);
            if target != record.status {
                record.transition(target, now);
                transitions.push(Self::update_of(record));
            }
        }

        for user_id in &expired {
            self.records.remove(user_id);
        }
        if !expired.is_empty() {
            debug!(count = expired.len(), "Expired offline presence records");
        }

        for update in transitions {
            self.broadcast(update).await;
        }
    }

    /// Target status for a record with at least one live connection.
    fn decayed_status(&self, record: &PresenceRecord, now: DateTime<Utc>) -> PresenceStatus {
        let idle = now - record.last_activity_at;
        if idle < Duration::seconds(self.config.idle_after_seconds as i64) {
            PresenceStatus::Online
        } else if idle < Duration::seconds(self.config.away_after_seconds as i64) {
            PresenceStatus::RecentlyActive
        } else {
            PresenceStatus::Away
        }
    }

    fn update_of(record: &PresenceRecord) -> PresenceUpdate {
        PresenceUpdate {
            user_id: record.user_id,
            status: record.status,
            last_seen_at: record.last_activity_at,
        }
    }

    /// Fans a transition out to the user's accepted contacts and persists
    /// it in the background.
    async fn broadcast(&self, update: PresenceUpdate) {
        let store = self.store.clone();
        let persisted = update.clone();
        tokio::spawn(async move {
            if let Err(e) = store
                .set_status(
                    persisted.user_id,
                    persisted.status.as_str(),
                    persisted.last_seen_at,
                )
                .await
            {
                warn!(user_id = %persisted.user_id, error = %e, "Presence store write failed");
            }
        });

        let contacts = match self.directory.accepted_contacts(update.user_id).await {
            Ok(contacts) => contacts,
            Err(e) => {
                warn!(user_id = %update.user_id, error = %e, "Contact lookup failed, skipping presence fan-out");
                return;
            }
        };

        for contact in contacts {
            self.dispatcher.publish(
                &RoomId::User(contact),
                &ServerEvent::Presence(update.clone()),
                None,
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::handle::ConnectionHandle;
    use crate::connection::pool::ConnectionPool;
    use crate::directory::{InMemoryDirectory, InMemoryPresenceStore};
    use tokio::sync::mpsc;

    struct Fixture {
        registry: PresenceRegistry,
        pool: Arc<ConnectionPool>,
        dispatcher: Arc<RoomDispatcher>,
        directory: Arc<InMemoryDirectory>,
    }

    fn fixture() -> Fixture {
        let pool = Arc::new(ConnectionPool::new());
        let dispatcher = Arc::new(RoomDispatcher::new(pool.clone()));
        let directory = Arc::new(InMemoryDirectory::new());
        let store = Arc::new(InMemoryPresenceStore::new());
        let registry = PresenceRegistry::new(
            PresenceConfig::default(),
            dispatcher.clone(),
            directory.clone(),
            store,
        );
        Fixture {
            registry,
            pool,
            dispatcher,
            directory,
        }
    }

    fn backdate(registry: &PresenceRegistry, user_id: UserId, seconds: i64) {
        let mut record = registry.records.get_mut(&user_id).expect("record");
        record.last_activity_at = record.last_activity_at - Duration::seconds(seconds);
    }

    #[tokio::test]
    async fn test_connection_count_never_negative() {
        let f = fixture();
        let user = UserId::new();

        f.registry.on_disconnect(user).await;
        assert_eq!(f.registry.connection_count(&user), 0);

        f.registry.on_connect(user).await;
        f.registry.on_disconnect(user).await;
        f.registry.on_disconnect(user).await;
        assert_eq!(f.registry.connection_count(&user), 0);
        assert_eq!(f.registry.status_of(&user), PresenceStatus::Offline);
    }

    #[tokio::test]
    async fn test_multi_connection_offline_only_at_zero() {
        let f = fixture();
        let user = UserId::new();

        f.registry.on_connect(user).await;
        f.registry.on_connect(user).await;
        f.registry.on_disconnect(user).await;
        assert_eq!(f.registry.status_of(&user), PresenceStatus::Online);

        f.registry.on_disconnect(user).await;
        assert_eq!(f.registry.status_of(&user), PresenceStatus::Offline);
    }

    #[tokio::test]
    async fn test_decay_steps_but_never_offline_while_connected() {
        let f = fixture();
        let user = UserId::new();
        f.registry.on_connect(user).await;

        backdate(&f.registry, user, 180);
        f.registry.sweep_at(Utc::now()).await;
        assert_eq!(f.registry.status_of(&user), PresenceStatus::RecentlyActive);

        backdate(&f.registry, user, 600);
        f.registry.sweep_at(Utc::now()).await;
        assert_eq!(f.registry.status_of(&user), PresenceStatus::Away);

        // A connected user stays Away forever, never Offline.
        backdate(&f.registry, user, 100_000);
        f.registry.sweep_at(Utc::now()).await;
        assert_eq!(f.registry.status_of(&user), PresenceStatus::Away);
    }

    #[tokio::test]
    async fn test_activity_restores_online_at_next_sweep() {
        let f = fixture();
        let user = UserId::new();
        f.registry.on_connect(user).await;

        backdate(&f.registry, user, 180);
        f.registry.sweep_at(Utc::now()).await;
        assert_eq!(f.registry.status_of(&user), PresenceStatus::RecentlyActive);

        f.registry.on_activity(user);
        f.registry.sweep_at(Utc::now()).await;
        assert_eq!(f.registry.status_of(&user), PresenceStatus::Online);
    }

    #[tokio::test]
    async fn test_offline_record_expires_after_grace() {
        let f = fixture();
        let user = UserId::new();
        f.registry.on_connect(user).await;
        f.registry.on_disconnect(user).await;
        assert_eq!(f.registry.record_count(), 1);

        let config = PresenceConfig::default();
        let later = Utc::now() + Duration::seconds(config.expire_after_seconds as i64 + 1);
        f.registry.sweep_at(later).await;
        assert_eq!(f.registry.record_count(), 0);
    }

    #[tokio::test]
    async fn test_transition_broadcast_reaches_contact() {
        let f = fixture();
        let alice = UserId::new();
        let bob = UserId::new();
        f.directory.add_contact_pair(alice, bob);

        // Bob has a live channel bound to his user room.
        let (tx, mut rx) = mpsc::channel(16);
        let bob_conn = Arc::new(ConnectionHandle::new(bob, tx));
        f.pool.add(bob_conn.clone());
        f.dispatcher.join(RoomId::User(bob), bob_conn.id);

        f.registry.on_connect(alice).await;
        match rx.try_recv() {
            Ok(ServerEvent::Presence(update)) => {
                assert_eq!(update.user_id, alice);
                assert_eq!(update.status, PresenceStatus::Online);
            }
            other => panic!("expected presence event, got {other:?}"),
        }

        f.registry.on_disconnect(alice).await;
        match rx.try_recv() {
            Ok(ServerEvent::Presence(update)) => {
                assert_eq!(update.status, PresenceStatus::Offline);
            }
            other => panic!("expected offline event, got {other:?}"),
        }
    }
}
