//! Top-level real-time engine that ties together all subsystems.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tracing::info;

use pulse_core::config::presence::PresenceConfig;
use pulse_core::config::realtime::RealtimeConfig;
use pulse_core::traits::{ContactDirectory, PresenceStore};

use crate::connection::manager::ConnectionManager;
use crate::connection::pool::ConnectionPool;
use crate::presence::registry::PresenceRegistry;
use crate::room::dispatcher::RoomDispatcher;

/// Central real-time engine that coordinates all dispatcher subsystems.
#[derive(Clone)]
pub struct RealtimeEngine {
    /// Connection manager.
    pub connections: Arc<ConnectionManager>,
    /// Room dispatcher.
    pub dispatcher: Arc<RoomDispatcher>,
    /// Presence registry.
    pub presence: Arc<PresenceRegistry>,
    /// Realtime configuration (shared with socket tasks).
    pub config: RealtimeConfig,
    /// Shutdown signal sender.
    shutdown_tx: broadcast::Sender<()>,
}

impl std::fmt::Debug for RealtimeEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealtimeEngine").finish()
    }
}

impl RealtimeEngine {
    /// Creates a new real-time engine and starts the presence sweeper.
    pub fn new(
        config: RealtimeConfig,
        presence_config: PresenceConfig,
        directory: Arc<dyn ContactDirectory>,
        store: Arc<dyn PresenceStore>,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        let pool = Arc::new(ConnectionPool::new());
        let dispatcher = Arc::new(RoomDispatcher::new(pool.clone()));
        let presence = Arc::new(PresenceRegistry::new(
            presence_config.clone(),
            dispatcher.clone(),
            directory.clone(),
            store,
        ));
        let connections = Arc::new(ConnectionManager::new(
            config.clone(),
            pool,
            dispatcher.clone(),
            presence.clone(),
            directory,
        ));

        Self::spawn_sweeper(
            presence.clone(),
            presence_config.sweep_interval_seconds,
            shutdown_tx.subscribe(),
        );

        info!("Real-time engine initialized");

        Self {
            connections,
            dispatcher,
            presence,
            config,
            shutdown_tx,
        }
    }

    /// Spawns the periodic presence decay sweep.
    fn spawn_sweeper(
        presence: Arc<PresenceRegistry>,
        interval_seconds: u64,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) {
        tokio::spawn(async move {
            // interval() panics on a zero period.
            let period = Duration::from_secs(interval_seconds.max(1));
            let mut interval = tokio::time::interval(period);
            loop {
                tokio::select! {
                    _ = interval.tick() => presence.sweep().await,
                    _ = shutdown_rx.recv() => break,
                }
            }
        });
    }

    /// Returns a shutdown receiver for graceful shutdown coordination.
    pub fn shutdown_receiver(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    /// Initiates a graceful shutdown of the real-time engine.
    pub async fn shutdown(&self) {
        info!("Shutting down real-time engine");
        let _ = self.shutdown_tx.send(());
        self.connections.close_all().await;
        info!("Real-time engine shut down");
    }
}
